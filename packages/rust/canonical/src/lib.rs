//! Canonicalization for Brandlens: clustering raw candidates, list-position
//! attribution, and run-level merge planning.

pub mod attribution;
pub mod cluster;
pub mod merge;
pub mod similarity;

pub use attribution::{AttributionResult, ValidatedNames, apply_list_position_filter};
pub use cluster::{Clusterer, Clusters, first_mention_ranks, merge_unsafe};
pub use merge::{
    DeclaredNames, MergeCandidate, PlannedEntity, alias_group_candidates, canonical_score,
    choose_canonical, find_merge_candidates, plan_merges, resolve_merge_chain,
};
pub use similarity::{key_similarity, similarity_ratio};
