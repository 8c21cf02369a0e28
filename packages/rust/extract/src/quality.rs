//! Extraction yield against the item count an answer implies.

use serde::Serialize;

use brandlens_text::{list_item_count, parse_expected_count};

/// How many entities an extraction produced against how many were implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionQuality {
    pub expected_count: Option<usize>,
    pub list_item_count: usize,
    pub extracted_count: usize,
    pub is_sufficient: bool,
    pub warning_message: Option<String>,
}

impl Default for ExtractionQuality {
    fn default() -> Self {
        Self {
            expected_count: None,
            list_item_count: 0,
            extracted_count: 0,
            is_sufficient: true,
            warning_message: None,
        }
    }
}

impl ExtractionQuality {
    /// The count to compare against: the announced count, else a list of two or more items.
    pub fn target(&self) -> Option<usize> {
        self.expected_count
            .or((self.list_item_count >= 2).then_some(self.list_item_count))
    }
}

/// Announced count and list item count for `text`.
pub fn implied_counts(text: &str) -> (Option<usize>, usize) {
    (parse_expected_count(text), list_item_count(text))
}

pub fn assess_quality(
    expected_count: Option<usize>,
    list_item_count: usize,
    extracted_count: usize,
) -> ExtractionQuality {
    let mut quality = ExtractionQuality {
        expected_count,
        list_item_count,
        extracted_count,
        ..ExtractionQuality::default()
    };
    if let Some(target) = quality.target() {
        if extracted_count < target {
            quality.is_sufficient = false;
            quality.warning_message = Some(format!(
                "Extracted {extracted_count} entities but expected at least {target}"
            ));
        }
    }
    quality
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sufficient() {
        let quality = ExtractionQuality::default();
        assert!(quality.is_sufficient);
        assert_eq!(quality.target(), None);
    }

    #[test]
    fn shortfall_against_expected_count() {
        let quality = assess_quality(Some(10), 10, 2);
        assert!(!quality.is_sufficient);
        let warning = quality.warning_message.unwrap();
        assert!(warning.contains('2') && warning.contains("10"));
    }

    #[test]
    fn list_count_is_the_fallback_target() {
        let quality = assess_quality(None, 3, 1);
        assert!(!quality.is_sufficient);
        assert_eq!(quality.target(), Some(3));
        assert!(assess_quality(None, 1, 0).is_sufficient);
    }

    #[test]
    fn over_extraction_is_sufficient() {
        let quality = assess_quality(Some(5), 5, 6);
        assert!(quality.is_sufficient);
        assert_eq!(quality.warning_message, None);
    }

    #[test]
    fn counts_from_text() {
        assert_eq!(implied_counts("TOP 3 SUVs\n1. A\n2. B\n3. C"), (Some(3), 3));
        assert_eq!(implied_counts("plain"), (None, 0));
    }
}
