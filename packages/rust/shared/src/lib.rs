//! Shared types, error model, and configuration for Brandlens.
//!
//! This crate is the foundation depended on by all other Brandlens crates.
//! It provides:
//! - [`BrandlensError`], the unified error type
//! - Domain types ([`EntityCandidate`], [`MappingSource`], [`ConfidenceLevel`], [`ModelOutput`])
//! - Configuration ([`AppConfig`], [`RetryPolicy`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClusteringConfig, ConsolidationConfig, CorrectionsConfig, ExtractionConfig,
    LlmConfig, MappingPolicyConfig, ProviderConfig, RetryPolicy, StorageConfig, config_dir,
    config_file_path, database_path, init_config, load_config, load_config_from,
};
pub use error::{BrandlensError, Result};
pub use types::{
    AnswerRecord, CandidateSource, ConfidenceLevel, CorrectionAction, DeclaredEntity,
    EntityCandidate, EntityId, EntityType, MappingSource, ModelOutput, ValidationSource,
};
