//! Error types for Brandlens.
//!
//! Library crates use [`BrandlensError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Brandlens operations.
#[derive(Debug, thiserror::Error)]
pub enum BrandlensError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A spawned task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),

    /// Transport failure talking to an LLM provider.
    #[error("network error: {0}")]
    Network(String),

    /// Input parsing error (answer files, exports, CLI values).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// An LLM response that could not be interpreted.
    ///
    /// Call sites recover from this locally; it never aborts a run.
    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    /// A correction whose evidence quote does not occur in the source text.
    #[error("evidence quote not found in source text: {quote:?}")]
    AmbiguousEvidence { quote: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The store stayed busy through every retry attempt.
    #[error("store contention: {operation} gave up after {attempts} attempts: {message}")]
    StoreContention {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// No LLM backend is registered under the requested name.
    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),

    /// A provider was selected but its credential is not available.
    #[error("missing credential for provider {provider}: set the {env_var} environment variable")]
    MissingCredential { provider: String, env_var: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown entity, invalid enum value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BrandlensError>;

impl BrandlensError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-output error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedModelOutput(msg.into())
    }

    /// Create a store-contention error for an operation that exhausted its retries.
    pub fn contention(operation: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::StoreContention {
            operation: operation.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Missing capabilities are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::StoreContention { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BrandlensError::config("missing [llm] section");
        assert_eq!(err.to_string(), "config error: missing [llm] section");

        let err = BrandlensError::validation("unknown action 'merge'");
        assert!(err.to_string().contains("unknown action"));

        let err = BrandlensError::contention("record_mapping_evidence", 5, "database is locked");
        assert!(err.to_string().contains("after 5 attempts"));
    }

    #[test]
    fn missing_capabilities_are_not_retryable() {
        assert!(!BrandlensError::UnknownProvider("acme".into()).is_retryable());
        let err = BrandlensError::MissingCredential {
            provider: "deepseek".into(),
            env_var: "DEEPSEEK_API_KEY".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
        assert!(BrandlensError::Network("timeout".into()).is_retryable());
    }
}
