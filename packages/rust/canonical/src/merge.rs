//! Run-level merge planning: which surface names fold into which target.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use brandlens_text::{AliasTable, entity_key};

use crate::cluster::merge_unsafe;
use crate::similarity::key_similarity;

/// `source` should be recorded as an alias of `target`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeCandidate {
    pub source: String,
    pub target: String,
    pub similarity: f64,
}

/// Sort key of the "cleanest" name: shortest key, then shortest raw
/// string, then case-folded text.
pub fn canonical_score(name: &str) -> (usize, usize, String) {
    (entity_key(name).chars().count(), name.chars().count(), name.to_lowercase())
}

/// Names the user declared. User-declared names always become targets.
#[derive(Debug, Clone, Default)]
pub struct DeclaredNames {
    keys: BTreeSet<String>,
}

impl DeclaredNames {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            keys: names.into_iter().map(entity_key).filter(|k| !k.is_empty()).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains(&entity_key(name))
    }
}

/// The target of a group: the cleanest user-declared name, else the
/// preferred name when given, else the cleanest name overall.
pub fn choose_canonical<'a>(
    names: &[&'a str],
    preferred: Option<&'a str>,
    declared: &DeclaredNames,
) -> Option<&'a str> {
    let cleanest = |pool: Vec<&'a str>| pool.into_iter().min_by_key(|n| canonical_score(n));
    let users: Vec<&str> = names.iter().copied().filter(|n| declared.contains(n)).collect();
    if !users.is_empty() {
        return cleanest(users);
    }
    preferred.or_else(|| cleanest(names.to_vec()))
}

/// Pairs of names whose keys are at least `threshold` similar and which
/// carry the same variant signals. Each pair points at its cleaner name.
pub fn find_merge_candidates(
    names: &[String],
    threshold: f64,
    declared: &DeclaredNames,
) -> Vec<MergeCandidate> {
    let keys: Vec<String> = names.iter().map(|n| entity_key(n)).collect();
    let mut out = Vec::new();
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            if names[i] == names[j] {
                continue;
            }
            let similarity = key_similarity(&keys[i], &keys[j]);
            if similarity < threshold || merge_unsafe(&names[i], &names[j]) {
                continue;
            }
            let Some(target) = choose_canonical(&[names[i].as_str(), names[j].as_str()], None, declared) else {
                continue;
            };
            let source = if target == names[i] { &names[j] } else { &names[i] };
            if declared.contains(source) && declared.contains(target) {
                continue;
            }
            out.push(MergeCandidate {
                source: source.clone(),
                target: target.to_string(),
                similarity,
            });
        }
    }
    out
}

/// Merges implied by an alias table: names resolving to the same canonical
/// fold into one target. The table's canonical is the target only when it
/// is itself one of the names (or `known` says it already exists).
///
/// Returns the candidates and the set of names that were grouped.
pub fn alias_group_candidates(
    names: &[String],
    alias_table: &AliasTable,
    declared: &DeclaredNames,
    known: impl Fn(&str) -> bool,
) -> (Vec<MergeCandidate>, BTreeSet<String>) {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in names {
        if let Some(canonical) = alias_table.lookup_exact(name) {
            groups.entry(canonical).or_default().push(name.as_str());
        }
    }

    let mut candidates = Vec::new();
    let mut grouped = BTreeSet::new();
    for (canonical, members) in groups {
        let canonical_key = entity_key(canonical);
        let preferred = (known(canonical) || members.iter().any(|m| entity_key(m) == canonical_key))
            .then_some(canonical);
        let Some(target) = choose_canonical(&members, preferred, declared) else {
            continue;
        };
        for member in &members {
            grouped.insert((*member).to_string());
            if *member != target {
                candidates.push(MergeCandidate {
                    source: (*member).to_string(),
                    target: target.to_string(),
                    similarity: 1.0,
                });
            }
        }
    }
    (candidates, grouped)
}

/// Follow `name` through `merge_map` to its final target. Cycles stop at
/// the first repeated name.
pub fn resolve_merge_chain(name: &str, merge_map: &HashMap<String, String>) -> String {
    let mut visited = BTreeSet::new();
    let mut current = name.to_string();
    while let Some(next) = merge_map.get(&current) {
        if !visited.insert(current.clone()) {
            break;
        }
        current = next.clone();
    }
    current
}

/// One entity to create or update after merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlannedEntity {
    pub mention_count: u32,
    /// Source names folded into this entity.
    pub aliases: Vec<String>,
}

/// Fold `mentions` along `candidates`. Later candidates for the same
/// source override earlier ones.
pub fn plan_merges(
    mentions: &BTreeMap<String, u32>,
    candidates: &[MergeCandidate],
) -> BTreeMap<String, PlannedEntity> {
    let merge_map: HashMap<String, String> = candidates
        .iter()
        .map(|c| (c.source.clone(), c.target.clone()))
        .collect();

    let mut plan: BTreeMap<String, PlannedEntity> = BTreeMap::new();
    for (name, count) in mentions {
        let target = resolve_merge_chain(name, &merge_map);
        let entry = plan.entry(target.clone()).or_default();
        entry.mention_count += count;
        if *name != target && !entry.aliases.contains(name) {
            entry.aliases.push(name.clone());
        }
    }
    debug!(names = mentions.len(), entities = plan.len(), "merge plan built");
    plan
}
