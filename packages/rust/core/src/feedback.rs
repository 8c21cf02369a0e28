//! Human-grade feedback: validations, rejections, renames and mapping
//! decisions written to the knowledge store with protected sources.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use brandlens_shared::{EntityType, MappingPolicyConfig, Result, ValidationSource};
use brandlens_storage::Storage;

/// Reason stored for rejections that carry none.
const DEFAULT_REJECT_REASON: &str = "user_rejected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFeedbackAction {
    Validate,
    Reject,
    /// `wrong_name` is really `name`.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFeedback {
    pub action: EntityFeedbackAction,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrong_name: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingFeedbackAction {
    Add,
    Validate,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingFeedback {
    pub action: MappingFeedbackAction,
    pub product_name: String,
    pub brand_name: String,
    #[serde(default)]
    pub reason: String,
}

/// A batch of feedback for one vertical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brand_feedback: Vec<EntityFeedback>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub product_feedback: Vec<EntityFeedback>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapping_feedback: Vec<MappingFeedback>,
}

impl FeedbackPayload {
    pub fn is_empty(&self) -> bool {
        self.brand_feedback.is_empty() && self.product_feedback.is_empty() && self.mapping_feedback.is_empty()
    }

    pub fn extend(&mut self, other: FeedbackPayload) {
        self.brand_feedback.extend(other.brand_feedback);
        self.product_feedback.extend(other.product_feedback);
        self.mapping_feedback.extend(other.mapping_feedback);
    }
}

/// Store writes made by one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedFeedback {
    pub validated: usize,
    pub rejected: usize,
    pub replaced: usize,
    pub mappings: usize,
}

/// Apply `payload` to `vertical_id`.
#[instrument(skip_all, fields(vertical_id = %vertical_id))]
pub async fn apply_feedback(
    storage: &Storage,
    vertical_id: &str,
    payload: &FeedbackPayload,
    policy: &MappingPolicyConfig,
) -> Result<AppliedFeedback> {
    let mut applied = AppliedFeedback::default();

    for (kind, items) in [
        (EntityType::Brand, &payload.brand_feedback),
        (EntityType::Product, &payload.product_feedback),
    ] {
        for item in items {
            apply_entity(storage, vertical_id, kind, item, &mut applied).await?;
        }
    }

    for item in &payload.mapping_feedback {
        let product = storage
            .upsert_entity(vertical_id, EntityType::Product, &item.product_name, 0, false)
            .await?;
        let brand = storage
            .upsert_entity(vertical_id, EntityType::Brand, &item.brand_name, 0, false)
            .await?;
        let accept = item.action != MappingFeedbackAction::Reject;
        storage
            .set_mapping_feedback(vertical_id, &product.id, &brand.id, accept, policy)
            .await?;
        let validated = storage.validated_mapping(&product.id).await?;
        storage
            .set_product_brand(&product.id, validated.as_ref().map(|m| m.brand_id.as_str()))
            .await?;
        debug!(product = %item.product_name, brand = %item.brand_name, accept, "mapping feedback applied");
        applied.mappings += 1;
    }

    Ok(applied)
}

async fn apply_entity(
    storage: &Storage,
    vertical_id: &str,
    kind: EntityType,
    item: &EntityFeedback,
    applied: &mut AppliedFeedback,
) -> Result<()> {
    match item.action {
        EntityFeedbackAction::Reject => {
            let reason = if item.reason.trim().is_empty() {
                DEFAULT_REJECT_REASON
            } else {
                item.reason.trim()
            };
            storage.reject_entity(vertical_id, kind, &item.name, reason).await?;
            applied.rejected += 1;
        }
        EntityFeedbackAction::Validate => {
            let entity = storage.upsert_entity(vertical_id, kind, &item.name, 0, false).await?;
            storage.validate_entity(&entity, ValidationSource::Feedback).await?;
            applied.validated += 1;
        }
        EntityFeedbackAction::Replace => {
            let entity = storage.upsert_entity(vertical_id, kind, &item.name, 0, false).await?;
            storage.validate_entity(&entity, ValidationSource::Feedback).await?;
            if let Some(wrong) = item.wrong_name.as_deref().filter(|w| !w.trim().is_empty()) {
                storage.add_alias(kind, &entity.id, wrong, None).await?;
            }
            applied.replaced += 1;
        }
    }
    debug!(kind = kind.as_str(), name = %item.name, action = ?item.action, "entity feedback applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use brandlens_shared::MappingSource;

    #[tokio::test]
    async fn payload_writes_protected_facts() {
        let storage = test_storage().await;
        let vertical = storage.ensure_vertical("Phones", None).await.unwrap();
        let payload = FeedbackPayload {
            brand_feedback: vec![
                EntityFeedback {
                    action: EntityFeedbackAction::Reject,
                    name: "5G".into(),
                    wrong_name: None,
                    reason: String::new(),
                },
                EntityFeedback {
                    action: EntityFeedbackAction::Replace,
                    name: "Apple".into(),
                    wrong_name: Some("苹果公司".into()),
                    reason: "same company".into(),
                },
            ],
            product_feedback: vec![],
            mapping_feedback: vec![MappingFeedback {
                action: MappingFeedbackAction::Add,
                product_name: "iPhone 15".into(),
                brand_name: "Apple".into(),
                reason: String::new(),
            }],
        };

        let applied = apply_feedback(&storage, &vertical.id, &payload, &MappingPolicyConfig::default())
            .await
            .unwrap();
        assert_eq!(applied, AppliedFeedback { validated: 0, rejected: 1, replaced: 1, mappings: 1 });

        assert!(storage.is_rejected(&vertical.id, EntityType::Brand, "5G").await.unwrap());
        let apple = storage
            .find_entity(&vertical.id, EntityType::Brand, "苹果公司")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(apple.canonical_name, "Apple");
        assert_eq!(apple.validation_source, Some(ValidationSource::Feedback));

        let phone = storage
            .find_entity(&vertical.id, EntityType::Product, "iPhone 15")
            .await
            .unwrap()
            .unwrap();
        let mapping = storage.validated_mapping(&phone.id).await.unwrap().unwrap();
        assert_eq!(mapping.source, MappingSource::Feedback);
        assert_eq!(phone.brand_id.as_deref(), Some(apple.id.as_str()));
    }

    #[test]
    fn payload_json_omits_empty_sections() {
        let payload = FeedbackPayload {
            mapping_feedback: vec![MappingFeedback {
                action: MappingFeedbackAction::Reject,
                product_name: "宋PLUS".into(),
                brand_name: "丰田".into(),
                reason: "wrong brand".into(),
            }],
            ..FeedbackPayload::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("brand_feedback").is_none());
        assert_eq!(json["mapping_feedback"][0]["action"], "reject");
    }
}
