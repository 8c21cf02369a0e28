//! Application configuration for Brandlens.
//!
//! User config lives at `~/.brandlens/brandlens.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BrandlensError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "brandlens.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".brandlens";

// ---------------------------------------------------------------------------
// Config structs (matching brandlens.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    #[serde(default)]
    pub corrections: CorrectionsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Ask the configured LLM for candidates in addition to the rule sources.
    #[serde(default)]
    pub llm_enabled: bool,

    /// Fold traditional Chinese characters to simplified before matching.
    #[serde(default = "default_true")]
    pub script_conversion: bool,

    /// Shortest candidate kept, in characters.
    #[serde(default = "default_min_candidate_chars")]
    pub min_candidate_chars: usize,

    /// Longest candidate kept, in characters.
    #[serde(default = "default_max_candidate_chars")]
    pub max_candidate_chars: usize,

    /// Extra blacklist entries appended to the built-in descriptor list.
    #[serde(default)]
    pub extra_blacklist: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            llm_enabled: false,
            script_conversion: true,
            min_candidate_chars: default_min_candidate_chars(),
            max_candidate_chars: default_max_candidate_chars(),
            extra_blacklist: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_candidate_chars() -> usize {
    2
}
fn default_max_candidate_chars() -> usize {
    40
}

/// `[clustering]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Minimum similarity ratio for the fuzzy fallback.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.82
}

/// `[consolidation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Similarity at which two mention names in one run merge.
    #[serde(default = "default_merge_similarity")]
    pub merge_similarity_threshold: f64,

    /// Mentions needed before an entity auto-validates.
    #[serde(default = "default_min_mentions")]
    pub min_mention_count_auto_validate: u32,

    /// Brands further than this many characters from a product earn no proximity support.
    #[serde(default = "default_proximity_window")]
    pub proximity_window_chars: usize,

    /// Validated names included as positive prompt examples.
    #[serde(default = "default_positive_examples")]
    pub positive_examples_limit: usize,

    /// Rejected names included as negative prompt examples.
    #[serde(default = "default_negative_examples")]
    pub negative_examples_limit: usize,

    #[serde(default)]
    pub mapping: MappingPolicyConfig,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            merge_similarity_threshold: default_merge_similarity(),
            min_mention_count_auto_validate: default_min_mentions(),
            proximity_window_chars: default_proximity_window(),
            positive_examples_limit: default_positive_examples(),
            negative_examples_limit: default_negative_examples(),
            mapping: MappingPolicyConfig::default(),
        }
    }
}

fn default_merge_similarity() -> f64 {
    0.85
}
fn default_min_mentions() -> u32 {
    3
}
fn default_proximity_window() -> usize {
    60
}
fn default_positive_examples() -> usize {
    20
}
fn default_negative_examples() -> usize {
    100
}

/// `[consolidation.mapping]`: dominance rule for auto-validating a product's brand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MappingPolicyConfig {
    /// Support the leading brand needs before it can auto-validate.
    #[serde(default = "default_min_support")]
    pub min_support: i64,

    /// Share of total support the leading brand needs.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// A runner-up with at least this much support blocks (and revokes) auto-validation.
    #[serde(default = "default_runner_up_max")]
    pub runner_up_max: i64,
}

impl Default for MappingPolicyConfig {
    fn default() -> Self {
        Self {
            min_support: default_min_support(),
            min_confidence: default_min_confidence(),
            runner_up_max: default_runner_up_max(),
        }
    }
}

fn default_min_support() -> i64 {
    10
}
fn default_min_confidence() -> f64 {
    0.9
}
fn default_runner_up_max() -> i64 {
    2
}

/// `[corrections]` section.
///
/// Threshold and level maps are overrides keyed by action name
/// (`reject_brand`, `validate`, ...) and merge onto built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionsConfig {
    /// Items per audit call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,

    #[serde(default)]
    pub min_levels: BTreeMap<String, String>,

    /// Representative answer ids kept per report cluster.
    #[serde(default = "default_cluster_examples")]
    pub cluster_examples: usize,
}

impl Default for CorrectionsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            thresholds: BTreeMap::new(),
            min_levels: BTreeMap::new(),
            cluster_examples: default_cluster_examples(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}
fn default_cluster_examples() -> usize {
    2
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider tried first.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_llm_model")]
    pub default_model: String,

    /// Provider tried when the default has no credential.
    #[serde(default = "default_fallback_provider")]
    pub fallback_provider: Option<String>,

    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Maximum concurrent LLM calls.
    #[serde(default = "default_llm_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Known providers keyed by name.
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_llm_model(),
            fallback_provider: default_fallback_provider(),
            fallback_model: default_fallback_model(),
            concurrency: default_llm_concurrency(),
            timeout_secs: default_llm_timeout(),
            providers: default_providers(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".into()
}
fn default_llm_model() -> String {
    "deepseek-reasoner".into()
}
fn default_fallback_provider() -> Option<String> {
    Some("openrouter".into())
}
fn default_fallback_model() -> String {
    "deepseek/deepseek-r1".into()
}
fn default_llm_concurrency() -> usize {
    4
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_providers() -> BTreeMap<String, ProviderConfig> {
    BTreeMap::from([
        (
            "deepseek".to_string(),
            ProviderConfig {
                base_url: "https://api.deepseek.com/v1".into(),
                api_key_env: "DEEPSEEK_API_KEY".into(),
            },
        ),
        (
            "openrouter".to_string(),
            ProviderConfig {
                base_url: "https://openrouter.ai/api/v1".into(),
                api_key_env: "OPENROUTER_API_KEY".into(),
            },
        ),
    ])
}

/// `[llm.providers.<name>]`: an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name of the env var holding the API key (never store the key itself).
    pub api_key_env: String,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Knowledge database path. Relative paths resolve against the config dir.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Attempts before a busy store surfaces as contention.
    #[serde(default = "default_busy_attempts")]
    pub busy_max_attempts: u32,

    #[serde(default = "default_busy_base_delay")]
    pub busy_base_delay_ms: u64,

    #[serde(default = "default_busy_max_delay")]
    pub busy_max_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_max_attempts: default_busy_attempts(),
            busy_base_delay_ms: default_busy_base_delay(),
            busy_max_delay_ms: default_busy_max_delay(),
        }
    }
}

fn default_database_path() -> String {
    "knowledge.db".into()
}
fn default_busy_attempts() -> u32 {
    5
}
fn default_busy_base_delay() -> u64 {
    10
}
fn default_busy_max_delay() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Retry policy (runtime, derived from [storage])
// ---------------------------------------------------------------------------

/// Bounded backoff for transient store contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles from the base, capped.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(20);
        self.base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for RetryPolicy {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_attempts: config.busy_max_attempts.max(1),
            base_delay_ms: config.busy_base_delay_ms,
            max_delay_ms: config.busy_max_delay_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.brandlens/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BrandlensError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.brandlens/brandlens.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the knowledge database path from config.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    let path = PathBuf::from(&config.storage.database_path);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(config_dir()?.join(path))
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BrandlensError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BrandlensError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BrandlensError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BrandlensError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BrandlensError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("similarity_threshold"));
        assert!(toml_str.contains("DEEPSEEK_API_KEY"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.clustering.similarity_threshold, 0.82);
        assert_eq!(parsed.consolidation.mapping.min_support, 10);
        assert_eq!(parsed.corrections.batch_size, 5);
        assert_eq!(parsed.llm.default_model, "deepseek-reasoner");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[consolidation.mapping]
min_support = 4

[corrections.thresholds]
reject_brand = 0.7

[corrections.min_levels]
validate = "HIGH"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.consolidation.mapping.min_support, 4);
        assert_eq!(config.consolidation.mapping.min_confidence, 0.9);
        assert_eq!(config.corrections.thresholds.get("reject_brand"), Some(&0.7));
        assert_eq!(config.corrections.min_levels.get("validate").map(String::as_str), Some("HIGH"));
        assert_eq!(config.storage.busy_max_attempts, 5);
        assert!(config.llm.providers.contains_key("deepseek"));
    }

    #[test]
    fn retry_policy_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_ms(1), 10);
        assert_eq!(policy.delay_ms(2), 20);
        assert_eq!(policy.delay_ms(4), 80);
        assert_eq!(policy.delay_ms(30), 1000);
    }

    #[test]
    fn absolute_database_path_is_kept() {
        let mut config = AppConfig::default();
        config.storage.database_path = "/tmp/brandlens-test.db".into();
        let path = database_path(&config).expect("resolve");
        assert_eq!(path, PathBuf::from("/tmp/brandlens-test.db"));
    }
}
