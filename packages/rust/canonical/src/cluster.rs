//! Canonicalization of raw candidates into clusters.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, instrument};

use brandlens_shared::{ClusteringConfig, EntityCandidate};
use brandlens_text::{AliasTable, Normalizer, entity_key, keys_differ_by_variant, variant_signals};

use crate::similarity::similarity_ratio;

/// canonical name → surface variants, in first-seen order.
pub type Clusters = BTreeMap<String, Vec<String>>;

/// True when folding `a` into `b` (or `b` into `a`) would lose a variant
/// distinction: the surface forms carry different variant signals, or one
/// key extends the other with a variant residue ("modelylongrange").
pub fn merge_unsafe(a: &str, b: &str) -> bool {
    variant_signals(a) != variant_signals(b) || keys_differ_by_variant(&entity_key(a), &entity_key(b))
}

/// Groups candidates under canonical names.
///
/// Per candidate, in source priority order: an existing cluster with the
/// same comparison key, an exact alias hit, substring containment against
/// an alias key, the most similar existing cluster at or above the
/// threshold. Otherwise the candidate starts its own cluster. Substring
/// and similarity matches must be merge-safe.
#[derive(Debug, Default)]
pub struct Clusterer {
    normalizer: Normalizer,
    threshold: f64,
}

impl Clusterer {
    pub fn new(normalizer: Normalizer, config: &ClusteringConfig) -> Self {
        Self {
            normalizer,
            threshold: config.similarity_threshold,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub fn canonicalize(&self, candidates: &[EntityCandidate], alias_table: &AliasTable) -> Clusters {
        let mut ordered: Vec<&EntityCandidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| c.source);

        let alias_keys: Vec<(&str, &str)> = alias_table
            .keys()
            .filter(|key| key.chars().count() >= 2)
            .filter_map(|key| alias_table.lookup_exact(key).map(|canonical| (key, canonical)))
            .collect();

        let mut clusters = Clusters::new();
        let mut by_key: HashMap<String, String> = HashMap::new();

        for candidate in ordered {
            let name = candidate.name.trim();
            let key = self.normalizer.comparison_key(name);
            if key.is_empty() {
                continue;
            }
            let canonical = by_key
                .get(&key)
                .cloned()
                .or_else(|| alias_table.lookup_exact(name).map(str::to_string))
                .or_else(|| substring_alias(name, &key, &alias_keys))
                .or_else(|| self.similar_cluster(name, &key, &clusters))
                .unwrap_or_else(|| name.to_string());

            by_key.entry(key).or_insert_with(|| canonical.clone());
            let variants = clusters.entry(canonical).or_default();
            if !variants.iter().any(|v| v == name) {
                variants.push(name.to_string());
            }
        }

        debug!(clusters = clusters.len(), "canonicalized");
        clusters
    }

    /// Canonicalize plain names as if they were all of one source.
    pub fn canonicalize_names(&self, names: &[String], alias_table: &AliasTable) -> Clusters {
        let candidates: Vec<EntityCandidate> = names
            .iter()
            .map(|n| EntityCandidate::new(n.clone(), brandlens_shared::CandidateSource::Regex))
            .collect();
        self.canonicalize(&candidates, alias_table)
    }

    fn similar_cluster(&self, name: &str, key: &str, clusters: &Clusters) -> Option<String> {
        let (best, ratio) = clusters
            .keys()
            .map(|canonical| {
                let ratio = similarity_ratio(key, &self.normalizer.comparison_key(canonical));
                (canonical, ratio)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;
        (ratio >= self.threshold && !merge_unsafe(name, best)).then(|| best.clone())
    }
}

/// Longest alias key contained in `key`, when merge-safe.
///
/// Only a candidate that extends an alias joins it; a parent never folds
/// into a longer alias.
fn substring_alias(name: &str, key: &str, alias_keys: &[(&str, &str)]) -> Option<String> {
    if key.chars().count() < 2 {
        return None;
    }
    alias_keys
        .iter()
        .filter(|(alias_key, _)| key.contains(alias_key))
        .filter(|(alias_key, canonical)| {
            !keys_differ_by_variant(key, alias_key) && !merge_unsafe(name, canonical)
        })
        .max_by_key(|(alias_key, _)| alias_key.chars().count())
        .map(|(_, canonical)| (*canonical).to_string())
}

/// Canonical names ranked by their earliest variant occurrence in `text`,
/// starting at 1. Clusters never found in the text rank last, by name.
pub fn first_mention_ranks(clusters: &Clusters, text: &str) -> BTreeMap<String, usize> {
    let lowered = text.to_lowercase();
    let mut positions: Vec<(usize, &String)> = clusters
        .iter()
        .map(|(canonical, variants)| {
            let first = std::iter::once(canonical)
                .chain(variants.iter())
                .filter_map(|v| lowered.find(&v.to_lowercase()))
                .min()
                .unwrap_or(usize::MAX);
            (first, canonical)
        })
        .collect();
    positions.sort();
    positions
        .into_iter()
        .enumerate()
        .map(|(i, (_, canonical))| (canonical.clone(), i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandlens_shared::CandidateSource;

    fn clusterer() -> Clusterer {
        Clusterer::new(Normalizer::default(), &ClusteringConfig::default())
    }

    fn candidates(names: &[&str]) -> Vec<EntityCandidate> {
        names
            .iter()
            .map(|n| EntityCandidate::new(*n, CandidateSource::Regex))
            .collect()
    }

    #[test]
    fn variants_stay_apart_from_their_parent() {
        let table: AliasTable = [("iphone", "iphone")].into_iter().collect();
        let clusters = clusterer().canonicalize(&candidates(&["iPhone", "iPhone14"]), &table);
        assert_eq!(clusters.len(), 2, "{clusters:?}");
        assert_eq!(clusters["iphone"], vec!["iPhone"]);
        assert_eq!(clusters["iPhone14"], vec!["iPhone14"]);
    }

    #[test]
    fn trim_suffixes_do_not_collapse() {
        let table: AliasTable = [("宋", "宋"), ("ModelY", "ModelY")].into_iter().collect();
        let clusters = clusterer().canonicalize(&candidates(&["宋", "宋PLUS", "ModelYLongRange", "Model Y"]), &table);
        assert!(clusters.contains_key("宋PLUS"), "{clusters:?}");
        assert!(clusters.contains_key("ModelYLongRange"), "{clusters:?}");
        assert_eq!(clusters["ModelY"], vec!["Model Y"]);
    }

    #[test]
    fn run_together_variants_stay_apart() {
        let table: AliasTable = [("modely", "modely"), ("iphone", "iphone")].into_iter().collect();
        let clusters = clusterer().canonicalize(
            &candidates(&["modely", "modelylongrange", "iphone", "iphonepromax", "iphone128gb"]),
            &table,
        );
        assert_eq!(clusters["modely"], vec!["modely"]);
        assert_eq!(clusters["iphone"], vec!["iphone"]);
        assert!(clusters.contains_key("modelylongrange"), "{clusters:?}");
        assert!(clusters.contains_key("iphonepromax"), "{clusters:?}");
        assert!(clusters.contains_key("iphone128gb"), "{clusters:?}");
    }

    #[test]
    fn substring_hits_respect_variant_residues() {
        let key = |s: &str| Normalizer::default().comparison_key(s);
        let keys = [("iphone14", "iphone14"), ("modely", "modely"), ("比亚迪", "比亚迪"), ("byd", "比亚迪"), ("mate", "mate")];

        assert_eq!(substring_alias("iphone14pro", &key("iphone14pro"), &keys), None);
        assert_eq!(substring_alias("modelylongrange", &key("modelylongrange"), &keys), None);
        assert_eq!(substring_alias("比亚迪宋plus", &key("比亚迪宋plus"), &keys), None);
        assert_eq!(substring_alias("byd宋plus", &key("byd宋plus"), &keys), None);
        assert_eq!(substring_alias("mate50pro", &key("mate50pro"), &keys), None);
        assert_eq!(substring_alias("比亚迪汽车", &key("比亚迪汽车"), &keys), Some("比亚迪".to_string()));
    }

    #[test]
    fn parents_never_fold_into_longer_aliases() {
        let table: AliasTable = [("ModelYLongRange", "ModelYLongRange")].into_iter().collect();
        let clusters = clusterer().canonicalize(&candidates(&["Model Y"]), &table);
        assert_eq!(clusters["Model Y"], vec!["Model Y"]);
        assert!(!clusters.contains_key("ModelYLongRange"), "{clusters:?}");
    }

    #[test]
    fn aliases_and_same_keys_join() {
        let clusters = clusterer().canonicalize(
            &candidates(&["BYD", "比亚迪", "Tesla", "TESLA", "tesla"]),
            &AliasTable::builtin(),
        );
        assert_eq!(clusters["比亚迪"], vec!["BYD", "比亚迪"]);
        assert_eq!(clusters["特斯拉"], vec!["Tesla", "TESLA", "tesla"]);
    }

    #[test]
    fn substring_hits_against_alias_keys() {
        let clusters = clusterer().canonicalize(&candidates(&["大众汽车"]), &AliasTable::builtin());
        assert_eq!(clusters["大众"], vec!["大众汽车"]);
    }

    #[test]
    fn similar_spellings_join_existing_clusters() {
        let clusters = clusterer().canonicalize(&candidates(&["Volkswagen Golf", "Volkswagen Golff"]), &AliasTable::new());
        assert_eq!(clusters.len(), 1, "{clusters:?}");
    }

    #[test]
    fn seeds_are_processed_first() {
        let mut list = candidates(&["Tesla Motors"]);
        list.push(EntityCandidate::new("Tesla Motor", CandidateSource::Seed));
        let clusters = clusterer().canonicalize(&list, &AliasTable::new());
        assert_eq!(clusters["Tesla Motor"], vec!["Tesla Motor", "Tesla Motors"]);
    }

    #[test]
    fn ranks_follow_first_mention() {
        let mut clusters = Clusters::new();
        clusters.insert("丰田".into(), vec!["Toyota".into()]);
        clusters.insert("本田".into(), vec!["Honda".into()]);
        clusters.insert("Ghost".into(), vec!["Ghost".into()]);
        let ranks = first_mention_ranks(&clusters, "1. Honda CR-V\n2. Toyota RAV4");
        assert_eq!(ranks["本田"], 1);
        assert_eq!(ranks["丰田"], 2);
        assert_eq!(ranks["Ghost"], 3);
    }
}
