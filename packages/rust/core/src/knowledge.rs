//! What a vertical already knows: validated names and their aliases,
//! rejections, and validated product→brand links.
//!
//! Loaded once per run from [`Storage`] and then read synchronously by the
//! engine, so per-answer work never touches the database.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, instrument};

use brandlens_canonical::Clusters;
use brandlens_extract::ExtractionContext;
use brandlens_shared::{ConsolidationConfig, EntityType, Result};
use brandlens_storage::{Storage, VerticalRecord};
use brandlens_text::{AliasTable, entity_key};

/// Legal-form suffixes dropped from Chinese company names, longest first.
const CJK_BRAND_SUFFIXES: &[&str] = &["有限责任公司", "有限公司", "集团", "公司", "汽车", "控股"];

/// Trailing English tokens that do not change which brand is meant.
const LATIN_BRAND_SUFFIXES: &[&str] = &[
    "auto", "automotive", "group", "inc", "ltd", "co", "company", "corp", "holdings", "limited",
];

/// Name lookups for one entity kind.
#[derive(Debug, Clone, Default)]
struct KindKnowledge {
    /// casefold and `entity_key` of every validated surface → canonical name.
    lookup: HashMap<String, String>,
    /// casefold and `entity_key` of every rejected name.
    rejected: HashSet<String>,
    /// Canonical name → validated surfaces.
    surfaces: BTreeMap<String, Vec<String>>,
    /// Validated canonical names, most mentioned first.
    ranked: Vec<String>,
}

impl KindKnowledge {
    fn add_surface(&mut self, surface: &str, canonical: &str) {
        for key in lookup_keys(surface) {
            self.lookup.entry(key).or_insert_with(|| canonical.to_string());
        }
    }

    fn add_rejected(&mut self, name: &str) {
        self.rejected.extend(lookup_keys(name));
    }

    fn canonical(&self, name: &str) -> Option<&str> {
        lookup_keys(name)
            .into_iter()
            .find_map(|key| self.lookup.get(&key))
            .map(String::as_str)
    }

    fn is_rejected(&self, name: &str) -> bool {
        lookup_keys(name).iter().any(|key| self.rejected.contains(key))
    }
}

fn lookup_keys(name: &str) -> Vec<String> {
    let folded = name.trim().to_lowercase();
    let key = entity_key(name);
    let mut keys = Vec::with_capacity(2);
    if !folded.is_empty() {
        keys.push(folded);
    }
    if !key.is_empty() && !keys.contains(&key) {
        keys.push(key);
    }
    keys
}

/// Read-only snapshot of one vertical's knowledge.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeContext {
    brands: KindKnowledge,
    products: KindKnowledge,
    /// Rejected names with the reason shown to the model, newest first.
    negative_examples: Vec<(String, String)>,
    /// Product canonical → validated brand canonical.
    product_brands: BTreeMap<String, String>,
    positive_limit: usize,
}

impl KnowledgeContext {
    /// Load the knowledge of `vertical_id`.
    #[instrument(skip_all, fields(vertical_id = %vertical_id))]
    pub async fn load(storage: &Storage, vertical_id: &str, config: &ConsolidationConfig) -> Result<Self> {
        let mut ctx = Self {
            positive_limit: config.positive_examples_limit,
            ..Self::default()
        };

        for kind in [EntityType::Brand, EntityType::Product] {
            let knowledge = ctx.kind_mut(kind);
            knowledge.surfaces = storage.validated_surfaces(vertical_id, kind).await?;
            for (canonical, surfaces) in &knowledge.surfaces.clone() {
                knowledge.add_surface(canonical, canonical);
                for surface in surfaces {
                    knowledge.add_surface(surface, canonical);
                }
            }
            knowledge.ranked = storage
                .list_entities(vertical_id, kind, true)
                .await?
                .into_iter()
                .map(|e| e.canonical_name)
                .collect();
        }

        for rejected in storage.list_rejected(vertical_id, None).await? {
            ctx.kind_mut(rejected.entity_type).add_rejected(&rejected.name);
            if ctx.negative_examples.len() < config.negative_examples_limit {
                let reason = simplify_rejection_reason(&rejected.reason);
                ctx.negative_examples.push((rejected.name, reason));
            }
        }

        ctx.product_brands = storage.validated_product_brands(vertical_id).await?;

        debug!(
            brands = ctx.brands.surfaces.len(),
            products = ctx.products.surfaces.len(),
            rejected = ctx.brands.rejected.len() + ctx.products.rejected.len(),
            mappings = ctx.product_brands.len(),
            "knowledge loaded"
        );
        Ok(ctx)
    }

    fn kind(&self, kind: EntityType) -> &KindKnowledge {
        match kind {
            EntityType::Brand => &self.brands,
            EntityType::Product => &self.products,
        }
    }

    fn kind_mut(&mut self, kind: EntityType) -> &mut KindKnowledge {
        match kind {
            EntityType::Brand => &mut self.brands,
            EntityType::Product => &mut self.products,
        }
    }

    pub fn is_rejected(&self, kind: EntityType, name: &str) -> bool {
        self.kind(kind).is_rejected(name)
    }

    /// The validated canonical name `name` resolves to, if any.
    ///
    /// Brands fall back to the name with its legal-form suffix stripped, so
    /// "比亚迪汽车" and "Tesla Inc." resolve like "比亚迪" and "Tesla".
    pub fn canonical(&self, kind: EntityType, name: &str) -> Option<&str> {
        let knowledge = self.kind(kind);
        if let Some(hit) = knowledge.canonical(name) {
            return Some(hit);
        }
        if kind == EntityType::Brand {
            let stripped = strip_brand_suffix(name);
            if stripped != name.trim() {
                return knowledge.canonical(&stripped);
            }
        }
        None
    }

    /// Drop rejected clusters and re-key the rest onto validated names.
    ///
    /// Clusters that resolve to the same validated name are unioned; a
    /// cluster is rejected when its key or any of its variants is.
    pub fn resolve(&self, kind: EntityType, clusters: Clusters) -> Clusters {
        let mut out = Clusters::new();
        for (canonical, variants) in clusters {
            if self.is_rejected(kind, &canonical) || variants.iter().any(|v| self.is_rejected(kind, v)) {
                debug!(kind = kind.as_str(), name = %canonical, "rejected cluster dropped");
                continue;
            }
            let target = std::iter::once(&canonical)
                .chain(&variants)
                .find_map(|name| self.canonical(kind, name))
                .map(str::to_string)
                .unwrap_or_else(|| canonical.clone());
            let merged = out.entry(target).or_default();
            for variant in variants {
                if !merged.contains(&variant) {
                    merged.push(variant);
                }
            }
        }
        out
    }

    /// Every validated surface of one kind.
    pub fn validated_names(&self, kind: EntityType) -> impl Iterator<Item = &str> {
        self.kind(kind)
            .surfaces
            .iter()
            .flat_map(|(canonical, surfaces)| std::iter::once(canonical).chain(surfaces))
            .map(String::as_str)
    }

    pub fn is_validated(&self, kind: EntityType, name: &str) -> bool {
        self.kind(kind).canonical(name).is_some()
    }

    /// `base` extended with every validated surface, brands and products.
    pub fn alias_table(&self, mut base: AliasTable) -> AliasTable {
        for knowledge in [&self.brands, &self.products] {
            for (canonical, surfaces) in &knowledge.surfaces {
                base.insert(canonical, canonical);
                for surface in surfaces {
                    base.insert(surface, canonical);
                }
            }
        }
        base
    }

    /// The validated brand of a product canonical name.
    pub fn brand_for_product(&self, product: &str) -> Option<&str> {
        self.product_brands.get(product).map(String::as_str)
    }

    /// Prompt context for LLM extraction in `vertical`.
    pub fn extraction_context(&self, vertical: &VerticalRecord) -> ExtractionContext {
        let positive = self
            .brands
            .ranked
            .iter()
            .chain(&self.products.ranked)
            .take(self.positive_limit)
            .cloned()
            .collect();
        ExtractionContext {
            vertical: vertical.name.clone(),
            vertical_description: vertical.description.clone().unwrap_or_default(),
            positive_examples: positive,
            negative_examples: self.negative_examples.clone(),
        }
    }
}

/// Drop a legal-form suffix from a brand name.
pub fn strip_brand_suffix(name: &str) -> String {
    let trimmed = name.trim();
    for suffix in CJK_BRAND_SUFFIXES {
        if let Some(stem) = trimmed.strip_suffix(suffix) {
            let stem = stem.trim();
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }

    let spaced = trimmed.replace('.', " ");
    let mut tokens: Vec<&str> = spaced.split_whitespace().collect();
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|t| LATIN_BRAND_SUFFIXES.contains(&t.to_lowercase().trim_end_matches(',')))
    {
        tokens.pop();
    }
    let stripped = tokens.join(" ");
    let stripped = stripped.trim_end_matches(',').trim();
    if stripped.is_empty() || stripped == spaced.split_whitespace().collect::<Vec<_>>().join(" ") {
        trimmed.to_string()
    } else {
        stripped.to_string()
    }
}

/// The short reason shown to the model for a stored rejection reason.
pub fn simplify_rejection_reason(reason: &str) -> String {
    match reason.trim() {
        "light_filter" | "rejected_at_light_filter" => "generic term or too short",
        "rejected_at_normalization" => "not a valid brand",
        "rejected_at_validation" => "not a valid product",
        "rejected_at_list_filter" => "not in primary position",
        "off_vertical" => "off-vertical entity",
        "user_rejected" => "manually rejected",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use brandlens_shared::ValidationSource;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn brand_suffixes_strip() {
        assert_eq!(strip_brand_suffix("比亚迪汽车"), "比亚迪");
        assert_eq!(strip_brand_suffix("华为技术有限公司"), "华为技术");
        assert_eq!(strip_brand_suffix("Tesla Inc."), "Tesla");
        assert_eq!(strip_brand_suffix("Great Wall Motor Co., Ltd."), "Great Wall Motor");
        assert_eq!(strip_brand_suffix("Toyota"), "Toyota");
        // A suffix alone is not stripped to nothing.
        assert_eq!(strip_brand_suffix("Group"), "Group");
    }

    #[test]
    fn rejection_reasons_simplify() {
        assert_eq!(simplify_rejection_reason("rejected_at_list_filter"), "not in primary position");
        assert_eq!(simplify_rejection_reason("user_rejected"), "manually rejected");
        assert_eq!(simplify_rejection_reason("not sold here"), "not sold here");
    }

    #[tokio::test]
    async fn resolves_against_stored_knowledge() {
        let storage = test_storage().await;
        let vertical = storage.ensure_vertical("SUV", Some("sport utility vehicles")).await.unwrap();
        let byd = storage
            .upsert_entity(&vertical.id, EntityType::Brand, "比亚迪", 5, false)
            .await
            .unwrap();
        storage.validate_entity(&byd, ValidationSource::Feedback).await.unwrap();
        storage.add_alias(EntityType::Brand, &byd.id, "BYD", Some("en")).await.unwrap();
        storage
            .reject_entity(&vertical.id, EntityType::Brand, "SUV", "rejected_at_light_filter")
            .await
            .unwrap();

        let ctx = KnowledgeContext::load(&storage, &vertical.id, &ConsolidationConfig::default())
            .await
            .unwrap();

        assert_eq!(ctx.canonical(EntityType::Brand, "byd"), Some("比亚迪"));
        assert_eq!(ctx.canonical(EntityType::Brand, "比亚迪汽车"), Some("比亚迪"));
        assert_eq!(ctx.canonical(EntityType::Product, "BYD"), None);
        assert!(ctx.is_rejected(EntityType::Brand, "suv"));

        let mut clusters = Clusters::new();
        clusters.insert("BYD".into(), strings(&["BYD"]));
        clusters.insert("SUV".into(), strings(&["SUV"]));
        clusters.insert("Tesla".into(), strings(&["Tesla"]));
        let resolved = ctx.resolve(EntityType::Brand, clusters);
        assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["Tesla", "比亚迪"]);
        assert_eq!(resolved["比亚迪"], strings(&["BYD"]));

        let prompt = ctx.extraction_context(&vertical);
        assert_eq!(prompt.vertical, "SUV");
        assert_eq!(prompt.positive_examples, strings(&["比亚迪"]));
        assert_eq!(
            prompt.negative_examples,
            vec![("SUV".to_string(), "generic term or too short".to_string())]
        );
    }

    #[tokio::test]
    async fn alias_table_learns_validated_surfaces() {
        let storage = test_storage().await;
        let vertical = storage.ensure_vertical("Cars", None).await.unwrap();
        let vw = storage
            .upsert_entity(&vertical.id, EntityType::Brand, "VW", 0, true)
            .await
            .unwrap();
        storage.add_alias(EntityType::Brand, &vw.id, "Volkswagen", None).await.unwrap();

        let ctx = KnowledgeContext::load(&storage, &vertical.id, &ConsolidationConfig::default())
            .await
            .unwrap();
        let table = ctx.alias_table(AliasTable::new());
        assert_eq!(table.lookup_exact("volkswagen"), Some("VW"));
        assert!(ctx.is_validated(EntityType::Brand, "Volkswagen"));
        assert!(ctx.validated_names(EntityType::Brand).any(|n| n == "Volkswagen"));
    }
}
