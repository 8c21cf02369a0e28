//! Wire types for extraction audits: the exported extraction we send to the
//! auditing model and the truth-plus-suggestions it returns.

use serde::{Deserialize, Deserializer, Serialize};

use brandlens_llm::{first_json_value, strip_wrappers};
use brandlens_shared::{BrandlensError, ConfidenceLevel, CorrectionAction, ModelOutput, Result};

use crate::feedback::{
    EntityFeedback, EntityFeedbackAction, FeedbackPayload, MappingFeedback, MappingFeedbackAction,
};

/// Category used when a suggestion carries none.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Answer ids arrive as strings or bare numbers.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Integer(i64),
        Float(f64),
    }
    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(s)) => s,
        Some(Id::Integer(n)) => n.to_string(),
        Some(Id::Float(n)) => n.to_string(),
        None => String::new(),
    })
}

/// One answer as previously extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedAnswer {
    #[serde(default, deserialize_with = "lenient_id")]
    pub llm_answer_id: String,
    #[serde(default, alias = "prompt_response_zh")]
    pub prompt_response: String,
    #[serde(default)]
    pub brands_extracted: Vec<ExportedBrand>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedBrand {
    #[serde(default, alias = "brand_zh")]
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_en: Option<String>,
    #[serde(default, alias = "products_zh")]
    pub products: Vec<String>,
}

impl ExportedBrand {
    /// Primary name, falling back to the English one.
    pub fn name(&self) -> &str {
        let primary = self.brand.trim();
        if primary.is_empty() {
            self.brand_en.as_deref().map(str::trim).unwrap_or_default()
        } else {
            primary
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditResponse {
    #[serde(default)]
    pub items: Vec<AuditItem>,
}

/// The auditor's verdict on one answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub llm_answer_id: String,
    #[serde(default)]
    pub truth: AuditTruth,
    #[serde(default)]
    pub suggestions: Vec<AuditSuggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditTruth {
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub mappings: Vec<TruthMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TruthMapping {
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub brand: String,
}

/// A correction proposed by the auditor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSuggestion {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence_level: Option<String>,
    #[serde(default, alias = "confidence_score_0_1")]
    pub confidence_score: Option<f64>,
    #[serde(default, alias = "evidence_quote_zh")]
    pub evidence_quote: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub wrong_name: Option<String>,
    #[serde(default)]
    pub correct_name: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AuditSuggestion {
    pub fn policy_action(&self) -> CorrectionAction {
        CorrectionAction::from_suggestion(&self.action)
    }

    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::parse_lenient(self.confidence_level.as_deref().unwrap_or_default())
    }

    pub fn score(&self) -> f64 {
        self.confidence_score.unwrap_or(0.0)
    }

    pub fn quote(&self) -> &str {
        self.evidence_quote.as_deref().unwrap_or_default()
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }

    pub fn category(&self) -> &str {
        non_empty(&self.category).unwrap_or(UNCATEGORIZED)
    }

    /// The feedback this suggestion would write if applied. Empty when the
    /// action is unknown or a required name is missing.
    pub fn feedback(&self) -> FeedbackPayload {
        let mut payload = FeedbackPayload::default();
        let action = self.action.trim().to_ascii_lowercase();
        let reason = self.reason().to_string();

        let (kind, name, target) = match action.as_str() {
            "validate_brand" | "reject_brand" | "replace_brand" => {
                ("brand", non_empty(&self.brand_name), &mut payload.brand_feedback)
            }
            "validate_product" | "reject_product" | "replace_product" => {
                ("product", non_empty(&self.product_name), &mut payload.product_feedback)
            }
            "add_mapping" | "validate_mapping" | "reject_mapping" => {
                if let (Some(product), Some(brand)) =
                    (non_empty(&self.product_name), non_empty(&self.brand_name))
                {
                    let action = match action.as_str() {
                        "add_mapping" => MappingFeedbackAction::Add,
                        "validate_mapping" => MappingFeedbackAction::Validate,
                        _ => MappingFeedbackAction::Reject,
                    };
                    payload.mapping_feedback.push(MappingFeedback {
                        action,
                        product_name: product.to_string(),
                        brand_name: brand.to_string(),
                        reason,
                    });
                }
                return payload;
            }
            _ => return payload,
        };

        let entity = if action.starts_with("replace") {
            let correct = non_empty(&self.correct_name);
            let wrong = non_empty(&self.wrong_name).or(name);
            correct.map(|correct| EntityFeedback {
                action: EntityFeedbackAction::Replace,
                name: correct.to_string(),
                wrong_name: wrong.map(str::to_string),
                reason,
            })
        } else {
            let action = if action.starts_with("reject") {
                EntityFeedbackAction::Reject
            } else {
                EntityFeedbackAction::Validate
            };
            name.map(|name| EntityFeedback {
                action,
                name: name.to_string(),
                wrong_name: None,
                reason,
            })
        };
        if let Some(entity) = entity {
            tracing::trace!(kind, name = %entity.name, "suggestion feedback");
            target.push(entity);
        }
        payload
    }
}

/// Prompt asking the auditor to judge one batch of exported answers.
pub fn build_audit_prompt(vertical: &str, items: &[ExportedAnswer]) -> Result<String> {
    let items_json = serde_json::to_string_pretty(items)
        .map_err(|e| BrandlensError::parse(format!("cannot encode audit batch: {e}")))?;
    Ok(format!(
        "You audit brand and product extraction for the \"{vertical}\" vertical.\n\
         For each answer below, read `prompt_response` and decide which brands, \
         products and product-to-brand mappings it truly mentions. Compare with \
         `brands_extracted` and suggest corrections.\n\n\
         Suggestion actions: validate_brand, reject_brand, replace_brand, \
         validate_product, reject_product, replace_product, add_mapping, \
         validate_mapping, reject_mapping.\n\
         Every suggestion needs `evidence_quote` copied verbatim from the answer, \
         `confidence_level` (LOW, MEDIUM, HIGH or VERY_HIGH), `confidence_score` \
         between 0 and 1, a short `category` and a `reason`. Use `brand_name`, \
         `product_name`, `wrong_name` and `correct_name` as the action requires.\n\n\
         Reply with one JSON object only:\n\
         {{\"items\": [{{\"llm_answer_id\": \"...\", \
         \"truth\": {{\"brands\": [], \"products\": [], \"mappings\": [{{\"product\": \"\", \"brand\": \"\"}}]}}, \
         \"suggestions\": []}}]}}\n\n\
         Answers:\n{items_json}\n"
    ))
}

/// Parse the first balanced JSON object of an audit reply.
pub fn parse_audit_response(raw: &str) -> ModelOutput<AuditResponse> {
    let cleaned = strip_wrappers(raw);
    let Some(start) = cleaned.find('{') else {
        return ModelOutput::malformed("no JSON object in audit reply");
    };
    let Some(json) = first_json_value(&cleaned[start..]) else {
        return ModelOutput::malformed("unbalanced JSON in audit reply");
    };
    match serde_json::from_str::<AuditResponse>(json) {
        Ok(response) => ModelOutput::Parsed(response),
        Err(e) => ModelOutput::malformed(format!("audit reply does not match schema: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_accepts_localized_field_names() {
        let json = r#"[{"llm_answer_id": 42, "prompt_response_zh": "推荐丰田RAV4",
            "brands_extracted": [{"brand_zh": "", "brand_en": "Toyota", "products_zh": ["RAV4"]}]}]"#;
        let export: Vec<ExportedAnswer> = serde_json::from_str(json).unwrap();
        assert_eq!(export[0].llm_answer_id, "42");
        assert_eq!(export[0].prompt_response, "推荐丰田RAV4");
        assert_eq!(export[0].brands_extracted[0].name(), "Toyota");
        assert_eq!(export[0].brands_extracted[0].products, vec!["RAV4"]);
    }

    #[test]
    fn reply_is_parsed_through_reasoning_and_fences() {
        let raw = "<think>checking</think>\nHere you go:\n```json\n{\"items\": [{\"llm_answer_id\": \"a1\", \
                   \"truth\": {\"brands\": [\"丰田\"]}, \"suggestions\": [{\"action\": \"reject_brand\", \
                   \"brand_name\": \"SUV\", \"confidence_level\": \"very high\", \"confidence_score_0_1\": 0.9, \
                   \"evidence_quote_zh\": \"SUV\"}]}]}\n```";
        let response = parse_audit_response(raw).parsed().unwrap();
        let item = &response.items[0];
        assert_eq!(item.truth.brands, vec!["丰田"]);
        let suggestion = &item.suggestions[0];
        assert_eq!(suggestion.policy_action(), CorrectionAction::RejectBrand);
        assert_eq!(suggestion.level(), ConfidenceLevel::VeryHigh);
        assert_eq!(suggestion.score(), 0.9);
        assert_eq!(suggestion.quote(), "SUV");
        assert_eq!(suggestion.category(), UNCATEGORIZED);
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(!parse_audit_response("I could not audit these answers.").is_parsed());
        assert!(!parse_audit_response("{\"items\": [").is_parsed());
    }

    #[test]
    fn suggestions_translate_to_feedback() {
        let replace = AuditSuggestion {
            action: "replace_brand".into(),
            wrong_name: Some("丰田汽车".into()),
            correct_name: Some("丰田".into()),
            ..AuditSuggestion::default()
        };
        let payload = replace.feedback();
        assert_eq!(payload.brand_feedback[0].action, EntityFeedbackAction::Replace);
        assert_eq!(payload.brand_feedback[0].name, "丰田");
        assert_eq!(payload.brand_feedback[0].wrong_name.as_deref(), Some("丰田汽车"));

        let mapping = AuditSuggestion {
            action: "reject_mapping".into(),
            product_name: Some("宋PLUS".into()),
            brand_name: Some("丰田".into()),
            ..AuditSuggestion::default()
        };
        assert_eq!(
            mapping.feedback().mapping_feedback[0].action,
            MappingFeedbackAction::Reject
        );

        let incomplete = AuditSuggestion {
            action: "validate_product".into(),
            ..AuditSuggestion::default()
        };
        assert!(incomplete.feedback().is_empty());
    }

    #[test]
    fn prompt_carries_vertical_and_items() {
        let items = vec![ExportedAnswer {
            llm_answer_id: "a1".into(),
            prompt_response: "比亚迪宋PLUS".into(),
            brands_extracted: vec![],
        }];
        let prompt = build_audit_prompt("SUV", &items).unwrap();
        assert!(prompt.contains("\"SUV\" vertical"));
        assert!(prompt.contains("比亚迪宋PLUS"));
    }
}
