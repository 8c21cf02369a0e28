//! Provider and model selection.
//!
//! The requested (or default) provider is tried first; if its API key is
//! not set, the configured fallback is used. Unknown providers and missing
//! credentials fail immediately and are never retried.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use brandlens_shared::{BrandlensError, LlmConfig, Result};

use crate::client::{ChatClient, LlmClient};

/// A provider whose credential was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

/// Resolve provider, model and key, reading keys from the process environment.
pub fn resolve_provider(
    config: &LlmConfig,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<ResolvedProvider> {
    resolve_provider_with(config, provider, model, |var| {
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    })
}

/// Same as [`resolve_provider`] with an injectable key lookup.
pub fn resolve_provider_with(
    config: &LlmConfig,
    provider: Option<&str>,
    model: Option<&str>,
    lookup_key: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedProvider> {
    let primary_name = provider.unwrap_or(&config.default_provider);
    let primary = config
        .providers
        .get(primary_name)
        .ok_or_else(|| BrandlensError::UnknownProvider(primary_name.to_string()))?;
    let primary_model = model.unwrap_or(&config.default_model);

    if let Some(api_key) = lookup_key(&primary.api_key_env) {
        return Ok(ResolvedProvider {
            provider: primary_name.to_string(),
            model: primary_model.to_string(),
            base_url: primary.base_url.clone(),
            api_key,
        });
    }

    let missing = BrandlensError::MissingCredential {
        provider: primary_name.to_string(),
        env_var: primary.api_key_env.clone(),
    };

    let Some(fallback_name) = config
        .fallback_provider
        .as_deref()
        .filter(|name| *name != primary_name)
    else {
        return Err(missing);
    };
    let fallback = config
        .providers
        .get(fallback_name)
        .ok_or_else(|| BrandlensError::UnknownProvider(fallback_name.to_string()))?;

    match lookup_key(&fallback.api_key_env) {
        Some(api_key) => {
            warn!(
                primary = primary_name,
                fallback = fallback_name,
                env_var = %primary.api_key_env,
                "primary provider has no credential, using fallback"
            );
            Ok(ResolvedProvider {
                provider: fallback_name.to_string(),
                model: config.fallback_model.clone(),
                base_url: fallback.base_url.clone(),
                api_key,
            })
        }
        None => Err(missing),
    }
}

/// Build the client for the resolved provider.
pub fn select_client(
    config: &LlmConfig,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LlmClient>> {
    let resolved = resolve_provider(config, provider, model)?;
    info!(provider = %resolved.provider, model = %resolved.model, "llm provider selected");
    let client = ChatClient::new(
        resolved.provider,
        &resolved.base_url,
        resolved.api_key,
        resolved.model,
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(present: &'static [&'static str]) -> impl Fn(&str) -> Option<String> {
        move |var: &str| present.iter().any(|p| *p == var).then(|| format!("key-for-{var}"))
    }

    #[test]
    fn default_provider_with_key() {
        let config = LlmConfig::default();
        let resolved = resolve_provider_with(&config, None, None, keys(&["DEEPSEEK_API_KEY"])).unwrap();
        assert_eq!(resolved.provider, "deepseek");
        assert_eq!(resolved.model, "deepseek-reasoner");
        assert_eq!(resolved.api_key, "key-for-DEEPSEEK_API_KEY");
    }

    #[test]
    fn falls_back_when_primary_key_missing() {
        let config = LlmConfig::default();
        let resolved = resolve_provider_with(&config, None, None, keys(&["OPENROUTER_API_KEY"])).unwrap();
        assert_eq!(resolved.provider, "openrouter");
        assert_eq!(resolved.model, "deepseek/deepseek-r1");
        assert_eq!(resolved.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn explicit_model_is_kept_for_primary() {
        let config = LlmConfig::default();
        let resolved =
            resolve_provider_with(&config, Some("openrouter"), Some("qwen/qwen3"), keys(&["OPENROUTER_API_KEY"]))
                .unwrap();
        assert_eq!(resolved.provider, "openrouter");
        assert_eq!(resolved.model, "qwen/qwen3");
    }

    #[test]
    fn unknown_provider_fails_immediately() {
        let config = LlmConfig::default();
        let err = resolve_provider_with(&config, Some("nope"), None, keys(&["DEEPSEEK_API_KEY"])).unwrap_err();
        assert!(matches!(err, BrandlensError::UnknownProvider(ref p) if p == "nope"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_credential_everywhere() {
        let config = LlmConfig::default();
        let err = resolve_provider_with(&config, None, None, keys(&[])).unwrap_err();
        match err {
            BrandlensError::MissingCredential { provider, env_var } => {
                assert_eq!(provider, "deepseek");
                assert_eq!(env_var, "DEEPSEEK_API_KEY");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_fallback_configured() {
        let config = LlmConfig {
            fallback_provider: None,
            ..LlmConfig::default()
        };
        let err = resolve_provider_with(&config, None, None, keys(&["OPENROUTER_API_KEY"])).unwrap_err();
        assert!(matches!(err, BrandlensError::MissingCredential { .. }));
    }
}
