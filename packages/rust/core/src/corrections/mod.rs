//! AI-assisted corrections.
//!
//! An auditing model re-reads exported extractions and proposes fixes.
//! Each suggestion either clears the [`policy`] gate and is written as
//! feedback, or lands in a review queue for a human.

pub mod audit;
pub mod execution;
pub mod metrics;
pub mod policy;
pub mod report;
pub mod runner;

pub use audit::{AuditItem, AuditSuggestion, ExportedAnswer, ExportedBrand, build_audit_prompt, parse_audit_response};
pub use execution::{AuditExecution, execute_audit, resolve_review_item};
pub use metrics::{Metrics, compute_metrics};
pub use policy::{CorrectionPolicy, CorrectionThresholds, MinConfidenceLevels, check_evidence, should_auto_apply};
pub use report::{AuditReport, build_report};
pub use runner::{AuditOutput, AuditRunner};
