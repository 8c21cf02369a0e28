//! Per-answer recognition: normalize → extract → canonicalize → type →
//! resolve against knowledge → list attribution → first-mention ranks.
//!
//! [`EngineContext`] is built once per run and holds only read-only tables,
//! so answers can be analyzed concurrently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use brandlens_canonical::{
    Clusterer, Clusters, ValidatedNames, apply_list_position_filter, first_mention_ranks,
};
use brandlens_extract::{
    CandidateExtractor, ExtractionContext, ExtractionQuality, LlmExtractor, OptionalSignalSource, classify,
};
use brandlens_llm::{LlmClient, run_bounded};
use brandlens_shared::{AnswerRecord, AppConfig, DeclaredEntity, EntityType, Result};
use brandlens_text::{AliasTable, Normalizer, entity_key};

use crate::knowledge::KnowledgeContext;

/// Everything recognized in one answer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerAnalysis {
    pub answer_id: String,
    pub brands: Clusters,
    pub products: Clusters,
    pub brand_ranks: BTreeMap<String, usize>,
    pub product_ranks: BTreeMap<String, usize>,
    /// Validated brand of each kept product, when known.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub product_brands: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub rejected_brands: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub rejected_products: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<ExtractionQuality>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_error: Option<String>,
    /// Normalized answer text.
    #[serde(skip)]
    pub text: String,
}

/// Per-run inputs shared by every answer.
#[derive(Debug, Clone, Default)]
pub struct RunScope {
    /// The brand the run is about, with its aliases.
    pub seeds: Option<DeclaredEntity>,
    pub knowledge: KnowledgeContext,
    pub prompt: ExtractionContext,
}

/// Read-only recognition pipeline for one run.
pub struct EngineContext {
    extractor: CandidateExtractor,
    clusterer: Clusterer,
    llm: Option<LlmExtractor>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("extractor", &self.extractor)
            .field("llm", &self.llm.is_some())
            .finish()
    }
}

impl EngineContext {
    pub fn new(config: &AppConfig) -> Self {
        let normalizer = Normalizer::with_script_conversion(config.extraction.script_conversion);
        Self {
            extractor: CandidateExtractor::new(&config.extraction),
            clusterer: Clusterer::new(normalizer, &config.clustering),
            llm: None,
        }
    }

    /// Add LLM-suggested names to every answer.
    pub fn with_llm(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(LlmExtractor::new(client));
        self
    }

    /// Teach the extractor and clusterer the vertical's validated surfaces.
    pub fn with_knowledge(mut self, knowledge: &KnowledgeContext) -> Self {
        let table = knowledge.alias_table(self.extractor.alias_table().clone());
        self.extractor = self.extractor.with_alias_table(table);
        self
    }

    pub fn with_signal_source(mut self, source: Box<dyn OptionalSignalSource>) -> Self {
        self.extractor = self.extractor.with_signal_source(source);
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        self.clusterer.normalizer()
    }

    /// Alias table the extractor groups surfaces with.
    pub fn alias_table(&self) -> &AliasTable {
        self.extractor.alias_table()
    }

    /// Recognize brands and products in one answer.
    #[instrument(skip_all, fields(answer_id = %answer.answer_id))]
    pub async fn analyze(&self, answer: &AnswerRecord, scope: &RunScope) -> AnswerAnalysis {
        let normalizer = self.normalizer();
        let text = normalizer.normalize_lines(&answer.text);
        let mut analysis = AnswerAnalysis {
            answer_id: answer.answer_id.clone(),
            ..AnswerAnalysis::default()
        };

        let (primary, aliases) = match &scope.seeds {
            Some(seed) => (
                normalizer.normalize(&seed.name),
                seed.aliases.iter().map(|a| normalizer.normalize(a)).collect(),
            ),
            None => (String::new(), Vec::new()),
        };
        let seed_keys: BTreeSet<String> = std::iter::once(&primary)
            .chain(&aliases)
            .map(|s| entity_key(s))
            .filter(|k| !k.is_empty())
            .collect();

        let mut candidates = self.extractor.extract(&text, &primary, &aliases);

        // LLM typing is a hint; a brand claim wins over a product claim.
        let mut hints: HashMap<String, EntityType> = HashMap::new();
        if let Some(llm) = &self.llm {
            let result = llm.extract(&text, &scope.prompt).await;
            for name in &result.products {
                hints.insert(entity_key(name), EntityType::Product);
            }
            for name in &result.brands {
                hints.insert(entity_key(name), EntityType::Brand);
            }
            let names = result
                .brands
                .iter()
                .chain(&result.products)
                .map(|n| normalizer.normalize(n))
                .collect::<Vec<_>>();
            self.extractor.merge_llm_names(&mut candidates, names);
            if let Some(error) = &result.error {
                warn!(error = %error, "llm extraction incomplete");
            }
            analysis.quality = Some(result.quality);
            analysis.tokens_in = result.tokens_in;
            analysis.tokens_out = result.tokens_out;
            analysis.llm_error = result.error;
        }

        let clusters = self.clusterer.canonicalize(&candidates, self.extractor.alias_table());

        let mut brands = Clusters::new();
        let mut products = Clusters::new();
        for (canonical, variants) in clusters {
            match self.cluster_type(&canonical, &variants, &seed_keys, &hints, &scope.knowledge) {
                Some(EntityType::Brand) => {
                    brands.insert(canonical, variants);
                }
                Some(EntityType::Product) => {
                    products.insert(canonical, variants);
                }
                None => debug!(name = %canonical, "untyped cluster dropped"),
            }
        }
        let brands = scope.knowledge.resolve(EntityType::Brand, brands);
        let products = scope.knowledge.resolve(EntityType::Product, products);

        let validated = ValidatedNames::new(
            scope
                .knowledge
                .validated_names(EntityType::Brand)
                .chain(scope.knowledge.validated_names(EntityType::Product))
                .chain(std::iter::once(primary.as_str()))
                .chain(aliases.iter().map(String::as_str)),
        );
        let attribution = apply_list_position_filter(&text, &surfaces(&brands), &surfaces(&products), &validated);
        let (brands, rejected_brands) = keep_credited(brands, &attribution.kept_brands);
        let (products, rejected_products) = keep_credited(products, &attribution.kept_products);

        analysis.brand_ranks = first_mention_ranks(&brands, &text);
        analysis.product_ranks = first_mention_ranks(&products, &text);
        analysis.product_brands = products
            .keys()
            .filter_map(|p| {
                scope
                    .knowledge
                    .brand_for_product(p)
                    .map(|b| (p.clone(), b.to_string()))
            })
            .collect();
        analysis.brands = brands;
        analysis.products = products;
        analysis.rejected_brands = rejected_brands;
        analysis.rejected_products = rejected_products;
        analysis.text = text;

        debug!(
            brands = analysis.brands.len(),
            products = analysis.products.len(),
            rejected = analysis.rejected_brands.len() + analysis.rejected_products.len(),
            "answer analyzed"
        );
        analysis
    }

    /// Seeds are brands; then stored knowledge, the model's typing and the
    /// heuristics decide, in that order.
    fn cluster_type(
        &self,
        canonical: &str,
        variants: &[String],
        seed_keys: &BTreeSet<String>,
        hints: &HashMap<String, EntityType>,
        knowledge: &KnowledgeContext,
    ) -> Option<EntityType> {
        let names = || std::iter::once(canonical).chain(variants.iter().map(String::as_str));

        if names().any(|n| seed_keys.contains(&entity_key(n))) {
            return Some(EntityType::Brand);
        }
        for kind in [EntityType::Brand, EntityType::Product] {
            if names().any(|n| knowledge.is_validated(kind, n)) {
                return Some(kind);
            }
        }
        if let Some(kind) = names().find_map(|n| hints.get(&entity_key(n)).copied()) {
            return Some(kind);
        }
        names().find_map(|n| classify(n, self.extractor.blacklist()).entity_type())
    }
}

/// Every surface of every cluster, canonical first.
fn surfaces(clusters: &Clusters) -> Vec<String> {
    let mut out = Vec::new();
    for (canonical, variants) in clusters {
        for name in std::iter::once(canonical).chain(variants) {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    out
}

/// Split clusters into those with a credited surface and the canonical
/// names of those without.
fn keep_credited(clusters: Clusters, kept: &BTreeSet<String>) -> (Clusters, BTreeSet<String>) {
    let mut rejected = BTreeSet::new();
    let clusters = clusters
        .into_iter()
        .filter(|(canonical, variants)| {
            let credited = kept.contains(canonical) || variants.iter().any(|v| kept.contains(v));
            if !credited {
                rejected.insert(canonical.clone());
            }
            credited
        })
        .collect();
    (clusters, rejected)
}

/// Analyze many answers, up to `concurrency` at a time.
///
/// Results come back in input order.
pub async fn analyze_batch(
    engine: Arc<EngineContext>,
    answers: Vec<AnswerRecord>,
    scope: Arc<RunScope>,
    concurrency: usize,
) -> Vec<Result<AnswerAnalysis>> {
    run_bounded(answers, concurrency, move |answer| {
        let engine = engine.clone();
        let scope = scope.clone();
        async move { Ok(engine.analyze(&answer, &scope).await) }
    })
    .await
}
