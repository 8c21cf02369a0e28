//! Auto-apply gate for AI-suggested corrections.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use brandlens_shared::{BrandlensError, ConfidenceLevel, CorrectionAction, CorrectionsConfig, Result};

/// Minimum confidence score per action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionThresholds(BTreeMap<CorrectionAction, f64>);

impl Default for CorrectionThresholds {
    fn default() -> Self {
        use CorrectionAction::*;
        Self(BTreeMap::from([
            (RejectBrand, 0.85),
            (RejectProduct, 0.85),
            (RejectMapping, 0.85),
            (Validate, 0.95),
            (Replace, 0.95),
            (AddMapping, 0.95),
        ]))
    }
}

impl CorrectionThresholds {
    /// Defaults with `overrides` merged on per key. Unknown keys are ignored.
    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Self {
        let mut thresholds = Self::default();
        for (key, value) in overrides {
            match CorrectionAction::parse_key(key) {
                Some(action) => {
                    thresholds.0.insert(action, *value);
                }
                None => warn!(key = %key, "unknown correction threshold ignored"),
            }
        }
        thresholds
    }

    pub fn get(&self, action: CorrectionAction) -> f64 {
        self.0.get(&action).copied().unwrap_or(1.0)
    }
}

/// Minimum ordinal confidence level per action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinConfidenceLevels(BTreeMap<CorrectionAction, ConfidenceLevel>);

impl Default for MinConfidenceLevels {
    fn default() -> Self {
        use CorrectionAction::*;
        use ConfidenceLevel::*;
        Self(BTreeMap::from([
            (RejectBrand, High),
            (RejectProduct, High),
            (RejectMapping, High),
            (Validate, VeryHigh),
            (Replace, VeryHigh),
            (AddMapping, VeryHigh),
        ]))
    }
}

impl MinConfidenceLevels {
    /// Defaults with `overrides` merged on per key. Unknown keys are ignored;
    /// unknown level names read as `LOW`.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut levels = Self::default();
        for (key, value) in overrides {
            match CorrectionAction::parse_key(key) {
                Some(action) => {
                    levels.0.insert(action, ConfidenceLevel::parse_lenient(value));
                }
                None => warn!(key = %key, "unknown correction level ignored"),
            }
        }
        levels
    }

    pub fn get(&self, action: CorrectionAction) -> ConfidenceLevel {
        self.0.get(&action).copied().unwrap_or(ConfidenceLevel::VeryHigh)
    }
}

/// Thresholds and levels for one audit run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectionPolicy {
    pub thresholds: CorrectionThresholds,
    pub min_levels: MinConfidenceLevels,
}

impl CorrectionPolicy {
    pub fn from_config(config: &CorrectionsConfig) -> Self {
        Self {
            thresholds: CorrectionThresholds::with_overrides(&config.thresholds),
            min_levels: MinConfidenceLevels::with_overrides(&config.min_levels),
        }
    }
}

/// `Ok` when `quote` is non-empty and occurs verbatim in `source_text`.
pub fn check_evidence(quote: &str, source_text: &str) -> Result<()> {
    let quote = quote.trim();
    if quote.is_empty() || !source_text.contains(quote) {
        return Err(BrandlensError::AmbiguousEvidence {
            quote: quote.to_string(),
        });
    }
    Ok(())
}

/// Whether a suggestion may be applied without human review.
pub fn should_auto_apply(
    action: CorrectionAction,
    level: ConfidenceLevel,
    score: f64,
    evidence_quote: &str,
    source_text: &str,
    thresholds: &CorrectionThresholds,
    min_levels: &MinConfidenceLevels,
) -> bool {
    check_evidence(evidence_quote, source_text).is_ok()
        && score >= thresholds.get(action)
        && level.rank() >= min_levels.get(action).rank()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(action: CorrectionAction, level: ConfidenceLevel, score: f64, quote: &str) -> bool {
        should_auto_apply(
            action,
            level,
            score,
            quote,
            "耐克是一个品牌。",
            &CorrectionThresholds::default(),
            &MinConfidenceLevels::default(),
        )
    }

    #[test]
    fn quote_must_occur_verbatim() {
        assert!(gate(CorrectionAction::RejectBrand, ConfidenceLevel::VeryHigh, 0.99, "耐克"));
        assert!(!gate(CorrectionAction::RejectBrand, ConfidenceLevel::VeryHigh, 0.99, "阿迪达斯"));
        assert!(!gate(CorrectionAction::RejectBrand, ConfidenceLevel::VeryHigh, 0.99, "   "));
    }

    #[test]
    fn score_and_level_both_gate() {
        assert!(gate(CorrectionAction::RejectBrand, ConfidenceLevel::High, 0.85, "耐克"));
        assert!(!gate(CorrectionAction::RejectBrand, ConfidenceLevel::High, 0.84, "耐克"));
        assert!(!gate(CorrectionAction::RejectBrand, ConfidenceLevel::Medium, 0.99, "耐克"));
        // Validation needs VERY_HIGH and 0.95.
        assert!(!gate(CorrectionAction::Validate, ConfidenceLevel::High, 0.99, "耐克"));
        assert!(gate(CorrectionAction::Validate, ConfidenceLevel::VeryHigh, 0.95, "耐克"));
    }

    #[test]
    fn overrides_merge_per_key() {
        let config = CorrectionsConfig {
            thresholds: BTreeMap::from([("validate".to_string(), 0.5), ("bogus".to_string(), 0.1)]),
            min_levels: BTreeMap::from([("reject_brand".to_string(), "very high".to_string())]),
            ..CorrectionsConfig::default()
        };
        let policy = CorrectionPolicy::from_config(&config);
        assert_eq!(policy.thresholds.get(CorrectionAction::Validate), 0.5);
        assert_eq!(policy.thresholds.get(CorrectionAction::Replace), 0.95);
        assert_eq!(policy.min_levels.get(CorrectionAction::RejectBrand), ConfidenceLevel::VeryHigh);
        assert_eq!(policy.min_levels.get(CorrectionAction::RejectProduct), ConfidenceLevel::High);
    }

    #[test]
    fn ambiguous_evidence_is_reported() {
        let err = check_evidence("阿迪达斯", "耐克是一个品牌。").unwrap_err();
        assert!(matches!(err, BrandlensError::AmbiguousEvidence { .. }));
    }
}
