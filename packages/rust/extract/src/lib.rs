//! Candidate extraction for Brandlens.
//!
//! [`CandidateExtractor`] gathers raw names from seeds, the alias table,
//! optional signal sources, regex families, quoted spans and list leads.
//! [`LlmExtractor`] adds model-suggested names with one shortfall retry.

pub mod blacklist;
pub mod candidates;
pub mod classify;
pub mod llm;
pub mod patterns;
pub mod quality;
pub mod signals;

pub use blacklist::Blacklist;
pub use candidates::CandidateExtractor;
pub use classify::{Classification, classify, is_likely_brand, is_likely_product};
pub use llm::{ExtractionContext, ExtractionPayload, LlmExtraction, LlmExtractor, parse_extraction};
pub use quality::{ExtractionQuality, assess_quality, implied_counts};
pub use signals::{LexiconSignalSource, NoopSignalSource, OptionalSignalSource};
