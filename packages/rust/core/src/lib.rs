//! Run orchestration and domain logic for Brandlens.
//!
//! This crate ties normalization, extraction, canonicalization and the
//! knowledge store together:
//! - [`engine`] turns one answer into brand/product clusters
//! - [`knowledge`] resolves names against what a vertical already knows
//! - [`consolidator`] folds a run of answers into the knowledge store
//! - [`corrections`] audits extractions and gates AI-suggested fixes

pub mod consolidator;
pub mod corrections;
pub mod engine;
pub mod evidence;
pub mod feedback;
pub mod knowledge;
pub mod progress;

pub use consolidator::{ConsolidationSummary, EntityStats, consolidate_run};
pub use engine::{AnswerAnalysis, EngineContext, RunScope, analyze_batch};
pub use knowledge::KnowledgeContext;
pub use progress::{ProgressReporter, SilentProgress};
