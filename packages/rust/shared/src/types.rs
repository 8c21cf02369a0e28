//! Core domain types shared by the extraction, consolidation and audit crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BrandlensError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for knowledge-store identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a new time-sortable identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Entity kinds and candidates
// ---------------------------------------------------------------------------

/// Brand or product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Brand,
    Product,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Product => "product",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = BrandlensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brand" => Ok(Self::Brand),
            "product" => Ok(Self::Product),
            other => Err(BrandlensError::validation(format!(
                "unknown entity type '{other}'"
            ))),
        }
    }
}

/// Where a raw candidate name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Primary name or a declared alias.
    Seed,
    /// The static cross-vertical alias table.
    AliasTable,
    Regex,
    /// Leading phrase of a list item or table row.
    List,
    /// An optional NER backend.
    Ner,
    /// Quoted or bracketed span.
    Quoted,
    Llm,
}

/// An unvalidated surface string with provenance, scoped to one answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub name: String,
    pub source: CandidateSource,
}

impl EntityCandidate {
    pub fn new(name: impl Into<String>, source: CandidateSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Knowledge-store enums
// ---------------------------------------------------------------------------

/// How a knowledge entity became validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    /// Declared by the user when configuring the vertical.
    UserInput,
    /// Human or audit-approved feedback.
    Feedback,
    /// Enough mentions accumulated across runs.
    AutoMention,
}

impl ValidationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInput => "user_input",
            Self::Feedback => "feedback",
            Self::AutoMention => "auto_mention",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_input" => Some(Self::UserInput),
            "feedback" => Some(Self::Feedback),
            "auto_mention" => Some(Self::AutoMention),
            _ => None,
        }
    }
}

/// Provenance of a product→brand mapping row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    AutoListEvidence,
    AutoProximity,
    AutoSupport,
    AutoLlm,
    Feedback,
    UserReject,
}

impl MappingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoListEvidence => "auto_list_evidence",
            Self::AutoProximity => "auto_proximity",
            Self::AutoSupport => "auto_support",
            Self::AutoLlm => "auto_llm",
            Self::Feedback => "feedback",
            Self::UserReject => "user_reject",
        }
    }

    /// Human decisions that automatic writers must never overwrite.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Feedback | Self::UserReject)
    }
}

impl std::str::FromStr for MappingSource {
    type Err = BrandlensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_list_evidence" => Ok(Self::AutoListEvidence),
            "auto_proximity" => Ok(Self::AutoProximity),
            "auto_support" => Ok(Self::AutoSupport),
            "auto_llm" => Ok(Self::AutoLlm),
            "feedback" => Ok(Self::Feedback),
            "user_reject" => Ok(Self::UserReject),
            other => Err(BrandlensError::validation(format!(
                "unknown mapping source '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Correction policy enums
// ---------------------------------------------------------------------------

/// Ordinal confidence attached to an AI-suggested correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::VeryHigh => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::VeryHigh => "VERY_HIGH",
        }
    }

    /// Parse a level from model output. Anything unrecognised is `Low`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "MEDIUM" => Self::Medium,
            "HIGH" => Self::High,
            "VERY_HIGH" => Self::VeryHigh,
            _ => Self::Low,
        }
    }
}

/// Policy action a suggestion is judged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionAction {
    RejectBrand,
    RejectProduct,
    RejectMapping,
    Validate,
    Replace,
    AddMapping,
}

impl CorrectionAction {
    pub const ALL: [CorrectionAction; 6] = [
        Self::RejectBrand,
        Self::RejectProduct,
        Self::RejectMapping,
        Self::Validate,
        Self::Replace,
        Self::AddMapping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RejectBrand => "reject_brand",
            Self::RejectProduct => "reject_product",
            Self::RejectMapping => "reject_mapping",
            Self::Validate => "validate",
            Self::Replace => "replace",
            Self::AddMapping => "add_mapping",
        }
    }

    /// Exact parse of a policy key, as used in configuration overrides.
    pub fn parse_key(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    /// Map a free-form suggestion action onto the policy action that governs it.
    ///
    /// `reject_*` keys are kept, `add_mapping*` and `replace*` collapse onto
    /// their family, and anything else is treated as a validation.
    pub fn from_suggestion(action: &str) -> Self {
        let action = action.trim().to_ascii_lowercase();
        if let Some(exact) = Self::parse_key(&action) {
            return exact;
        }
        if action.starts_with("add_mapping") {
            Self::AddMapping
        } else if action.starts_with("replace") {
            Self::Replace
        } else {
            Self::Validate
        }
    }
}

// ---------------------------------------------------------------------------
// ModelOutput
// ---------------------------------------------------------------------------

/// Result of interpreting an LLM response.
///
/// Every caller handles both arms; `Malformed` is a normal outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput<T> {
    Parsed(T),
    Malformed { reason: String },
}

impl<T> ModelOutput<T> {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// The parsed value, or `None` when malformed.
    pub fn parsed(self) -> Option<T> {
        match self {
            Self::Parsed(v) => Some(v),
            Self::Malformed { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run inputs
// ---------------------------------------------------------------------------

/// One model answer to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer_id: String,
    pub text: String,
}

/// A user-declared brand or product with its aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaredEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}
