//! Fold one run of analyzed answers into the knowledge store.
//!
//! Mentions are counted per canonical name, merged (alias table, then key
//! similarity, user-declared names always winning), written as entities
//! with aliases, auto-validated once they are mentioned often enough, and
//! finally turned into product→brand mapping evidence.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use brandlens_canonical::{
    DeclaredNames, MergeCandidate, PlannedEntity, alias_group_candidates, find_merge_candidates, plan_merges,
};
use brandlens_shared::{
    BrandlensError, ConsolidationConfig, DeclaredEntity, EntityType, MappingSource, Result, ValidationSource,
};
use brandlens_storage::{Storage, VerticalRecord};
use brandlens_text::{AliasTable, entity_key};

use crate::engine::AnswerAnalysis;
use crate::evidence::collect_evidence;

/// What happened to one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Distinct canonical names seen in the run.
    pub mentioned: usize,
    pub created: usize,
    pub updated: usize,
    pub aliases_added: usize,
    pub auto_validated: usize,
    pub skipped_rejected: usize,
    /// Planned entities whose writes failed; they are left out of the run.
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidationSummary {
    pub vertical: String,
    pub answers: usize,
    pub brands: EntityStats,
    pub products: EntityStats,
    pub merges: Vec<MergeCandidate>,
    /// Products that received mapping evidence.
    pub mapped_products: usize,
    /// Products whose brand is validated after this run.
    pub validated_mappings: usize,
    pub mapping_failures: usize,
}

/// Result of consolidating one kind: stats, merges and name → entity id.
struct KindOutcome {
    stats: EntityStats,
    merges: Vec<MergeCandidate>,
    ids: HashMap<String, String>,
}

/// Consolidate `answers` into `vertical`.
///
/// `user_brands` are the brands the user declared for the run; they are
/// stored as user input and always win a merge.
#[instrument(skip_all, fields(vertical = %vertical.name, answers = answers.len()))]
pub async fn consolidate_run(
    storage: &Storage,
    vertical: &VerticalRecord,
    answers: &[AnswerAnalysis],
    user_brands: &[DeclaredEntity],
    alias_table: &AliasTable,
    config: &ConsolidationConfig,
) -> Result<ConsolidationSummary> {
    let mut summary = ConsolidationSummary {
        vertical: vertical.name.clone(),
        answers: answers.len(),
        ..ConsolidationSummary::default()
    };

    let brands = consolidate_kind(
        storage,
        vertical,
        EntityType::Brand,
        answers.iter().map(|a| &a.brands),
        user_brands,
        alias_table,
        config,
    )
    .await?;
    let products = consolidate_kind(
        storage,
        vertical,
        EntityType::Product,
        answers.iter().map(|a| &a.products),
        &[],
        alias_table,
        config,
    )
    .await?;

    // --- Mapping evidence ---
    let mut support: BTreeMap<String, Vec<(String, MappingSource, i64)>> = BTreeMap::new();
    for answer in answers {
        for hit in collect_evidence(&answer.text, &answer.brands, &answer.products, config.proximity_window_chars) {
            let (Some(product_id), Some(brand_id)) = (products.ids.get(&hit.product), brands.ids.get(&hit.brand))
            else {
                continue;
            };
            let rows = support.entry(product_id.clone()).or_default();
            match rows.iter_mut().find(|(b, s, _)| b == brand_id && *s == hit.source) {
                Some((_, _, count)) => *count += 1,
                None => rows.push((brand_id.clone(), hit.source, 1)),
            }
        }
    }

    for (product_id, rows) in &support {
        summary.mapped_products += 1;
        let outcome = async {
            storage
                .record_mapping_evidence(&vertical.id, product_id, rows, &config.mapping)
                .await?;
            let validated = storage.validated_mapping(product_id).await?;
            storage
                .set_product_brand(product_id, validated.as_ref().map(|m| m.brand_id.as_str()))
                .await?;
            Ok::<_, BrandlensError>(validated.is_some())
        }
        .await;
        match outcome {
            Ok(true) => summary.validated_mappings += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "mapping evidence not recorded");
                summary.mapping_failures += 1;
            }
        }
    }

    summary.brands = brands.stats;
    summary.products = products.stats;
    summary.merges = brands.merges.into_iter().chain(products.merges).collect();

    info!(
        brands = summary.brands.mentioned,
        products = summary.products.mentioned,
        failed = summary.brands.failed + summary.products.failed + summary.mapping_failures,
        merges = summary.merges.len(),
        mapped = summary.mapped_products,
        validated_mappings = summary.validated_mappings,
        "run consolidated"
    );
    Ok(summary)
}

async fn consolidate_kind<'a>(
    storage: &Storage,
    vertical: &VerticalRecord,
    kind: EntityType,
    clusters: impl Iterator<Item = &'a brandlens_canonical::Clusters>,
    declared: &[DeclaredEntity],
    alias_table: &AliasTable,
    config: &ConsolidationConfig,
) -> Result<KindOutcome> {
    // Each canonical name counts once per answer.
    let mut mentions: BTreeMap<String, u32> = BTreeMap::new();
    let mut variants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for answer in clusters {
        for (canonical, surfaces) in answer {
            *mentions.entry(canonical.clone()).or_insert(0) += 1;
            variants.entry(canonical.clone()).or_default().extend(surfaces.iter().cloned());
        }
    }
    for entity in declared {
        let name = entity.name.trim();
        if !name.is_empty() {
            mentions.entry(name.to_string()).or_insert(0);
        }
    }

    let declared_names = DeclaredNames::new(declared.iter().map(|d| d.name.trim()));
    let mut stats = EntityStats {
        mentioned: mentions.len(),
        ..EntityStats::default()
    };

    let mut rejected = Vec::new();
    for name in mentions.keys() {
        if !declared_names.contains(name) && storage.is_rejected(&vertical.id, kind, name).await? {
            rejected.push(name.clone());
        }
    }
    for name in &rejected {
        debug!(kind = kind.as_str(), name = %name, "rejected name skipped");
        mentions.remove(name);
    }
    stats.skipped_rejected = rejected.len();

    // --- Merge planning ---
    let existing: HashSet<String> = storage
        .list_entities(&vertical.id, kind, false)
        .await?
        .into_iter()
        .map(|e| entity_key(&e.canonical_name))
        .collect();
    let names: Vec<String> = mentions.keys().cloned().collect();
    let (mut candidates, grouped) =
        alias_group_candidates(&names, alias_table, &declared_names, |n| existing.contains(&entity_key(n)));

    // Declared aliases override whatever the table or similarity decided.
    let mut declared_aliases = Vec::new();
    for entity in declared {
        let alias_keys: HashSet<String> = entity.aliases.iter().map(|a| entity_key(a)).collect();
        for name in &names {
            if name != entity.name.trim() && alias_keys.contains(&entity_key(name)) {
                declared_aliases.push(MergeCandidate {
                    source: name.clone(),
                    target: entity.name.trim().to_string(),
                    similarity: 1.0,
                });
            }
        }
    }

    let rest: Vec<String> = names
        .iter()
        .filter(|n| !grouped.contains(*n) && !declared_aliases.iter().any(|c| &c.source == *n))
        .cloned()
        .collect();
    candidates.extend(find_merge_candidates(&rest, config.merge_similarity_threshold, &declared_names));
    candidates.extend(declared_aliases);

    let plan = plan_merges(&mentions, &candidates);

    // --- Entities and aliases ---
    let mut ids = HashMap::new();
    for (target, planned) in &plan {
        let written = match write_entity(
            storage,
            vertical,
            kind,
            target,
            planned,
            &variants,
            declared,
            &declared_names,
            config,
        )
        .await
        {
            Ok(written) => written,
            Err(e) => {
                warn!(kind = kind.as_str(), name = %target, error = %e, "entity not written");
                stats.failed += 1;
                continue;
            }
        };
        if written.created {
            stats.created += 1;
        } else {
            stats.updated += 1;
        }
        stats.aliases_added += written.aliases_added;
        if written.auto_validated {
            stats.auto_validated += 1;
        }
        for name in std::iter::once(target).chain(&planned.aliases) {
            ids.insert(name.clone(), written.id.clone());
        }
    }

    Ok(KindOutcome {
        stats,
        merges: candidates,
        ids,
    })
}

/// What writing one planned entity changed.
struct EntityWrite {
    id: String,
    created: bool,
    aliases_added: usize,
    auto_validated: bool,
}

#[allow(clippy::too_many_arguments)]
async fn write_entity(
    storage: &Storage,
    vertical: &VerticalRecord,
    kind: EntityType,
    target: &str,
    planned: &PlannedEntity,
    variants: &BTreeMap<String, BTreeSet<String>>,
    declared: &[DeclaredEntity],
    declared_names: &DeclaredNames,
    config: &ConsolidationConfig,
) -> Result<EntityWrite> {
    let is_user_input = declared_names.contains(target);
    let before = storage.find_entity(&vertical.id, kind, target).await?;
    let entity = storage
        .upsert_entity(&vertical.id, kind, target, i64::from(planned.mention_count), is_user_input)
        .await?;

    let target_key = entity_key(target);
    let mut surfaces: BTreeSet<&str> = BTreeSet::new();
    for name in std::iter::once(target).chain(planned.aliases.iter().map(String::as_str)) {
        surfaces.insert(name);
        if let Some(seen) = variants.get(name) {
            surfaces.extend(seen.iter().map(String::as_str));
        }
    }
    for entity_decl in declared.iter().filter(|d| d.name.trim() == target) {
        surfaces.extend(entity_decl.aliases.iter().map(String::as_str));
    }
    let mut aliases_added = 0;
    for surface in surfaces {
        if entity_key(surface) != target_key && storage.add_alias(kind, &entity.id, surface, None).await? {
            aliases_added += 1;
        }
    }

    let auto_validated = !entity.is_validated
        && entity.mention_count >= i64::from(config.min_mention_count_auto_validate)
        && storage.validate_entity(&entity, ValidationSource::AutoMention).await?;

    Ok(EntityWrite {
        id: entity.id,
        created: before.is_none(),
        aliases_added,
        auto_validated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use brandlens_canonical::Clusters;

    fn analysis(id: &str, text: &str, brands: &[(&str, &[&str])], products: &[(&str, &[&str])]) -> AnswerAnalysis {
        let to_clusters = |entries: &[(&str, &[&str])]| -> Clusters {
            entries
                .iter()
                .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect()
        };
        AnswerAnalysis {
            answer_id: id.into(),
            brands: to_clusters(brands),
            products: to_clusters(products),
            text: text.into(),
            ..AnswerAnalysis::default()
        }
    }

    #[tokio::test]
    async fn user_declared_name_absorbs_discovered_alias() {
        let storage = test_storage().await;
        let vertical = storage.ensure_vertical("Cars", None).await.unwrap();
        let answers = vec![analysis("a1", "Volkswagen is reliable", &[("大众", &["Volkswagen"])], &[])];
        let user = vec![DeclaredEntity {
            name: "VW".into(),
            aliases: vec![],
        }];

        let summary = consolidate_run(
            &storage,
            &vertical,
            &answers,
            &user,
            &AliasTable::builtin(),
            &ConsolidationConfig::default(),
        )
        .await
        .unwrap();

        let brands = storage.list_entities(&vertical.id, EntityType::Brand, false).await.unwrap();
        assert_eq!(brands.len(), 1, "{brands:?}");
        let vw = &brands[0];
        assert_eq!(vw.canonical_name, "VW");
        assert!(vw.is_validated);
        assert_eq!(vw.mention_count, 1);
        let aliases = storage.aliases_for(EntityType::Brand, &vw.id).await.unwrap();
        assert!(aliases.contains(&"Volkswagen".to_string()), "{aliases:?}");
        assert_eq!(
            storage.find_entity(&vertical.id, EntityType::Brand, "volkswagen").await.unwrap().map(|e| e.id),
            Some(vw.id.clone())
        );
        assert!(summary.merges.iter().any(|m| m.source == "大众" && m.target == "VW"));
    }

    #[tokio::test]
    async fn frequent_names_validate_unless_rejected() {
        let storage = test_storage().await;
        let vertical = storage.ensure_vertical("Cars", None).await.unwrap();
        storage
            .reject_entity(&vertical.id, EntityType::Brand, "Autohome", "off_vertical")
            .await
            .unwrap();
        let answers: Vec<AnswerAnalysis> = (0..3)
            .map(|i| {
                analysis(
                    &format!("a{i}"),
                    "Tesla, says Autohome",
                    &[("Tesla", &["Tesla"]), ("Autohome", &["Autohome"])],
                    &[],
                )
            })
            .collect();

        let summary = consolidate_run(
            &storage,
            &vertical,
            &answers,
            &[],
            &AliasTable::new(),
            &ConsolidationConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.brands.auto_validated, 1);
        assert_eq!(summary.brands.skipped_rejected, 1);
        let tesla = storage
            .find_entity(&vertical.id, EntityType::Brand, "Tesla")
            .await
            .unwrap()
            .unwrap();
        assert!(tesla.is_validated);
        assert_eq!(tesla.validation_source, Some(ValidationSource::AutoMention));
        assert!(storage.find_entity(&vertical.id, EntityType::Brand, "Autohome").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_evidence_validates_a_dominant_brand() {
        let storage = test_storage().await;
        let vertical = storage.ensure_vertical("SUV", None).await.unwrap();
        let text = "1. 丰田 RAV4\n2. 本田 CR-V";
        let answers: Vec<AnswerAnalysis> = (0..12)
            .map(|i| {
                analysis(
                    &format!("a{i}"),
                    text,
                    &[("丰田", &["丰田"]), ("本田", &["本田"])],
                    &[("RAV4", &["RAV4"]), ("CR-V", &["CR-V"])],
                )
            })
            .collect();

        let summary = consolidate_run(
            &storage,
            &vertical,
            &answers,
            &[],
            &AliasTable::new(),
            &ConsolidationConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(summary.mapped_products, 2);
        assert_eq!(summary.validated_mappings, 2);
        assert_eq!(summary.mapping_failures, 0);

        let rav4 = storage
            .find_entity(&vertical.id, EntityType::Product, "RAV4")
            .await
            .unwrap()
            .unwrap();
        let mapping = storage.validated_mapping(&rav4.id).await.unwrap().unwrap();
        assert_eq!(mapping.brand_name, "丰田");
        assert_eq!(mapping.support_count, 12);
        assert_eq!(mapping.source, MappingSource::AutoSupport);
        assert_eq!(rav4.brand_id.as_deref(), Some(mapping.brand_id.as_str()));
    }

    #[tokio::test]
    async fn locked_store_fails_entities_without_aborting_the_run() {
        use brandlens_shared::StorageConfig;

        let path = std::env::temp_dir().join(format!("brandlens_core_test_{}.db", uuid::Uuid::now_v7()));
        let storage_config = StorageConfig {
            busy_max_attempts: 2,
            busy_base_delay_ms: 1,
            busy_max_delay_ms: 2,
            ..StorageConfig::default()
        };
        let storage = Storage::open_with(&path, &storage_config).await.unwrap();
        let vertical = storage.ensure_vertical("SUV", None).await.unwrap();
        let answers = vec![analysis("a1", "1. 丰田 RAV4", &[("丰田", &["丰田"])], &[("RAV4", &["RAV4"])])];

        let db = libsql::Builder::new_local(&path).build().await.unwrap();
        let lock = db.connect().unwrap();
        lock.execute_batch("BEGIN IMMEDIATE").await.unwrap();

        let config = ConsolidationConfig::default();
        let summary = consolidate_run(&storage, &vertical, &answers, &[], &AliasTable::new(), &config)
            .await
            .unwrap();
        assert_eq!(summary.brands.failed, 1);
        assert_eq!(summary.products.failed, 1);
        assert_eq!(summary.brands.created, 0);
        assert_eq!(summary.mapped_products, 0);

        lock.execute_batch("ROLLBACK").await.unwrap();
        let summary = consolidate_run(&storage, &vertical, &answers, &[], &AliasTable::new(), &config)
            .await
            .unwrap();
        assert_eq!(summary.brands.failed, 0);
        assert_eq!(summary.brands.created, 1);
        assert!(storage.find_entity(&vertical.id, EntityType::Brand, "丰田").await.unwrap().is_some());
    }
}
