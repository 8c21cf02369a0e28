//! Audit report: extraction quality against audited truth, and suggestions
//! split into auto-applied feedback and a human review queue.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use brandlens_text::entity_key;

use super::audit::{AuditItem, AuditSuggestion, ExportedAnswer};
use super::metrics::{Counts, Metrics};
use super::policy::{CorrectionPolicy, check_evidence, should_auto_apply};
use crate::feedback::FeedbackPayload;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetrics {
    pub brands: Metrics,
    pub products: Metrics,
    pub mappings: Metrics,
}

/// Review-routed suggestions sharing a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionCluster {
    pub category: String,
    pub count: usize,
    /// Representative answer ids.
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReviewItem {
    pub llm_answer_id: String,
    pub category: String,
    pub action: String,
    pub confidence_level: String,
    pub confidence_score: f64,
    pub reason: String,
    pub evidence_quote: String,
    /// Set when the quote does not occur in the answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_problem: Option<String>,
    pub feedback_payload: FeedbackPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub metrics: ReportMetrics,
    pub clusters: Vec<SuggestionCluster>,
    /// Auto-routed suggestions per action.
    pub auto_applied_counts: BTreeMap<String, usize>,
    pub pending_review_items: Vec<PendingReviewItem>,
    pub matched_items: usize,
    pub unmatched_items: usize,
    pub dry_run: bool,
    /// Combined feedback of every auto-routed suggestion.
    #[serde(skip)]
    pub auto_feedback: FeedbackPayload,
}

fn key_set<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(entity_key)
        .filter(|k| !k.is_empty())
        .collect()
}

fn predicted_sets(
    answer: &ExportedAnswer,
) -> (BTreeSet<String>, BTreeSet<String>, BTreeSet<(String, String)>) {
    let brands = key_set(answer.brands_extracted.iter().map(|b| b.name()));
    let products = key_set(
        answer
            .brands_extracted
            .iter()
            .flat_map(|b| b.products.iter().map(String::as_str)),
    );
    let mut mappings = BTreeSet::new();
    for brand in &answer.brands_extracted {
        let brand_key = entity_key(brand.name());
        if brand_key.is_empty() {
            continue;
        }
        for product in &brand.products {
            let product_key = entity_key(product);
            if !product_key.is_empty() {
                mappings.insert((product_key, brand_key.clone()));
            }
        }
    }
    (brands, products, mappings)
}

fn truth_sets(item: &AuditItem) -> (BTreeSet<String>, BTreeSet<String>, BTreeSet<(String, String)>) {
    let truth = &item.truth;
    let mappings = truth
        .mappings
        .iter()
        .map(|m| (entity_key(&m.product), entity_key(&m.brand)))
        .filter(|(p, b)| !p.is_empty() && !b.is_empty())
        .collect();
    (
        key_set(truth.brands.iter().map(String::as_str)),
        key_set(truth.products.iter().map(String::as_str)),
        mappings,
    )
}

fn pending_item(answer_id: &str, source_text: &str, suggestion: &AuditSuggestion) -> PendingReviewItem {
    PendingReviewItem {
        llm_answer_id: answer_id.to_string(),
        category: suggestion.category().to_string(),
        action: suggestion.action.clone(),
        confidence_level: suggestion.level().as_str().to_string(),
        confidence_score: suggestion.score(),
        reason: suggestion.reason().to_string(),
        evidence_quote: suggestion.quote().to_string(),
        evidence_problem: check_evidence(suggestion.quote(), source_text)
            .err()
            .map(|e| e.to_string()),
        feedback_payload: suggestion.feedback(),
    }
}

/// Score `export` against the audited `items` and route every suggestion.
///
/// Audit items whose answer id is not in the export are skipped.
pub fn build_report(
    export: &[ExportedAnswer],
    items: &[AuditItem],
    policy: &CorrectionPolicy,
    cluster_examples: usize,
) -> AuditReport {
    let by_id: HashMap<&str, &ExportedAnswer> = export
        .iter()
        .map(|answer| (answer.llm_answer_id.as_str(), answer))
        .collect();

    let mut brands = Counts::default();
    let mut products = Counts::default();
    let mut mappings = Counts::default();
    let mut clusters: Vec<SuggestionCluster> = Vec::new();
    let mut auto_applied_counts = BTreeMap::new();
    let mut pending_review_items = Vec::new();
    let mut auto_feedback = FeedbackPayload::default();
    let mut matched_items = 0;
    let mut unmatched_items = 0;

    for item in items {
        let Some(answer) = by_id.get(item.llm_answer_id.as_str()) else {
            debug!(answer_id = %item.llm_answer_id, "audit item has no exported answer");
            unmatched_items += 1;
            continue;
        };
        matched_items += 1;

        let (pred_brands, pred_products, pred_mappings) = predicted_sets(answer);
        let (true_brands, true_products, true_mappings) = truth_sets(item);
        brands.add(&true_brands, &pred_brands);
        products.add(&true_products, &pred_products);
        mappings.add(&true_mappings, &pred_mappings);

        for suggestion in &item.suggestions {
            let auto = should_auto_apply(
                suggestion.policy_action(),
                suggestion.level(),
                suggestion.score(),
                suggestion.quote(),
                &answer.prompt_response,
                &policy.thresholds,
                &policy.min_levels,
            );
            if auto {
                *auto_applied_counts
                    .entry(suggestion.action.trim().to_ascii_lowercase())
                    .or_insert(0) += 1;
                auto_feedback.extend(suggestion.feedback());
                continue;
            }

            let category = suggestion.category();
            let cluster = match clusters.iter().position(|c| c.category == category) {
                Some(index) => &mut clusters[index],
                None => {
                    clusters.push(SuggestionCluster {
                        category: category.to_string(),
                        count: 0,
                        examples: Vec::new(),
                    });
                    let last = clusters.len() - 1;
                    &mut clusters[last]
                }
            };
            cluster.count += 1;
            if cluster.examples.len() < cluster_examples
                && !item.llm_answer_id.is_empty()
                && !cluster.examples.contains(&item.llm_answer_id)
            {
                cluster.examples.push(item.llm_answer_id.clone());
            }
            pending_review_items.push(pending_item(&item.llm_answer_id, &answer.prompt_response, suggestion));
        }
    }

    AuditReport {
        metrics: ReportMetrics {
            brands: brands.metrics(),
            products: products.metrics(),
            mappings: mappings.metrics(),
        },
        clusters,
        auto_applied_counts,
        pending_review_items,
        matched_items,
        unmatched_items,
        dry_run: false,
        auto_feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrections::audit::{AuditTruth, ExportedBrand, TruthMapping};

    fn export() -> Vec<ExportedAnswer> {
        vec![ExportedAnswer {
            llm_answer_id: "a1".into(),
            prompt_response: "推荐丰田RAV4和本田CR-V，SUV很适合家庭。".into(),
            brands_extracted: vec![
                ExportedBrand {
                    brand: "丰田".into(),
                    brand_en: Some("Toyota".into()),
                    products: vec!["RAV4".into()],
                },
                ExportedBrand {
                    brand: "SUV".into(),
                    brand_en: None,
                    products: vec!["CR-V".into()],
                },
            ],
        }]
    }

    fn suggestion(action: &str, level: &str, score: f64, quote: &str) -> AuditSuggestion {
        AuditSuggestion {
            action: action.into(),
            category: Some("Generic terms".into()),
            confidence_level: Some(level.into()),
            confidence_score: Some(score),
            evidence_quote: Some(quote.into()),
            brand_name: Some("SUV".into()),
            product_name: Some("CR-V".into()),
            ..AuditSuggestion::default()
        }
    }

    fn audit_items() -> Vec<AuditItem> {
        vec![
            AuditItem {
                llm_answer_id: "a1".into(),
                truth: AuditTruth {
                    brands: vec!["丰田".into(), "本田".into()],
                    products: vec!["RAV4".into(), "CR-V".into()],
                    mappings: vec![
                        TruthMapping { product: "RAV4".into(), brand: "丰田".into() },
                        TruthMapping { product: "CR-V".into(), brand: "本田".into() },
                    ],
                },
                suggestions: vec![
                    suggestion("reject_brand", "HIGH", 0.9, "SUV"),
                    suggestion("reject_mapping", "HIGH", 0.9, "阿迪达斯"),
                    suggestion("add_mapping", "MEDIUM", 0.7, "本田CR-V"),
                ],
            },
            AuditItem {
                llm_answer_id: "missing".into(),
                ..AuditItem::default()
            },
        ]
    }

    #[test]
    fn metrics_compare_keys_per_answer() {
        let report = build_report(&export(), &audit_items(), &CorrectionPolicy::default(), 2);
        assert_eq!(report.matched_items, 1);
        assert_eq!(report.unmatched_items, 1);

        let brands = report.metrics.brands;
        assert_eq!((brands.true_positives, brands.false_positives, brands.false_negatives), (1, 1, 1));
        assert_eq!(report.metrics.products.true_positives, 2);
        let mappings = report.metrics.mappings;
        assert_eq!((mappings.true_positives, mappings.false_positives, mappings.false_negatives), (1, 1, 1));
    }

    #[test]
    fn suggestions_route_to_auto_or_review() {
        let report = build_report(&export(), &audit_items(), &CorrectionPolicy::default(), 1);

        assert_eq!(report.auto_applied_counts.get("reject_brand"), Some(&1));
        assert_eq!(report.auto_feedback.brand_feedback[0].name, "SUV");

        assert_eq!(report.pending_review_items.len(), 2);
        let ambiguous = &report.pending_review_items[0];
        assert_eq!(ambiguous.action, "reject_mapping");
        assert!(ambiguous.evidence_problem.is_some());
        assert!(report.pending_review_items[1].evidence_problem.is_none());

        assert_eq!(
            report.clusters,
            vec![SuggestionCluster {
                category: "Generic terms".into(),
                count: 2,
                examples: vec!["a1".into()],
            }]
        );
    }

    #[test]
    fn cluster_examples_list_each_answer_once() {
        let report = build_report(&export(), &audit_items(), &CorrectionPolicy::default(), 5);
        assert_eq!(report.clusters[0].count, 2);
        assert_eq!(report.clusters[0].examples, vec!["a1".to_string()]);
    }

    #[test]
    fn report_json_hides_auto_feedback() {
        let report = build_report(&export(), &audit_items(), &CorrectionPolicy::default(), 2);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("auto_feedback").is_none());
        assert_eq!(json["metrics"]["brands"]["true_positives"], 1);
        assert_eq!(json["pending_review_items"][1]["feedback_payload"]["mapping_feedback"][0]["action"], "add");
    }
}
