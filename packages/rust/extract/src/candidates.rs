//! Rule-based candidate extraction for one answer.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use brandlens_shared::{CandidateSource, EntityCandidate, ExtractionConfig};
use brandlens_text::AliasTable;

use crate::blacklist::Blacklist;
use crate::patterns::{expand_subtokens, list_candidates, quoted_candidates, regex_candidates};
use crate::signals::{NoopSignalSource, OptionalSignalSource};

/// Collects candidates from every rule source and applies the blacklist
/// and length bounds. Holds only read-only tables once built.
pub struct CandidateExtractor {
    alias_table: AliasTable,
    blacklist: Blacklist,
    signal_sources: Vec<Box<dyn OptionalSignalSource>>,
    min_chars: usize,
    max_chars: usize,
}

impl std::fmt::Debug for CandidateExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateExtractor")
            .field("aliases", &self.alias_table.len())
            .field(
                "signal_sources",
                &self.signal_sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("min_chars", &self.min_chars)
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl CandidateExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            alias_table: AliasTable::builtin(),
            blacklist: Blacklist::new(&config.extra_blacklist),
            signal_sources: vec![Box::new(NoopSignalSource)],
            min_chars: config.min_candidate_chars.max(1),
            max_chars: config.max_candidate_chars.max(config.min_candidate_chars),
        }
    }

    pub fn with_alias_table(mut self, alias_table: AliasTable) -> Self {
        self.alias_table = alias_table;
        self
    }

    /// Add a signal source. Sources are consulted in insertion order.
    pub fn with_signal_source(mut self, source: Box<dyn OptionalSignalSource>) -> Self {
        self.signal_sources.push(source);
        self
    }

    pub fn alias_table(&self) -> &AliasTable {
        &self.alias_table
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// All candidates for `text`, deduplicated by name; the first source to
    /// produce a name is the one recorded.
    ///
    /// Seeds (`primary_name` and `aliases`) are only emitted when they occur
    /// in the text and are exempt from the blacklist.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub fn extract(&self, text: &str, primary_name: &str, aliases: &[String]) -> Vec<EntityCandidate> {
        let lowered = text.to_lowercase();
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        for seed in std::iter::once(primary_name).chain(aliases.iter().map(String::as_str)) {
            let seed = seed.trim();
            if !seed.is_empty() && contains_surface(&lowered, &seed.to_lowercase()) && seen.insert(seed.to_string()) {
                out.push(EntityCandidate::new(seed, CandidateSource::Seed));
            }
        }

        let table_hits: Vec<String> = self
            .alias_table
            .surfaces()
            .filter(|surface| contains_surface(&lowered, &surface.to_lowercase()))
            .map(str::to_string)
            .collect();
        self.push_all(&mut out, &mut seen, table_hits, CandidateSource::AliasTable);

        for source in &self.signal_sources {
            match source.entities(text) {
                Ok(names) => self.push_all(&mut out, &mut seen, names, CandidateSource::Ner),
                Err(e) => warn!(source = source.name(), error = %e, "signal source failed"),
            }
        }

        self.push_all(&mut out, &mut seen, regex_candidates(text), CandidateSource::Regex);
        self.push_all(&mut out, &mut seen, quoted_candidates(text), CandidateSource::Quoted);
        self.push_all(&mut out, &mut seen, list_candidates(text), CandidateSource::List);

        let names: Vec<String> = out.iter().map(|c| c.name.clone()).collect();
        let subtokens = expand_subtokens(names.iter().map(String::as_str));
        self.push_all(&mut out, &mut seen, subtokens, CandidateSource::Regex);

        debug!(count = out.len(), "candidates extracted");
        out
    }

    /// Add LLM-sourced names to an existing candidate set under the same filters.
    pub fn merge_llm_names(&self, candidates: &mut Vec<EntityCandidate>, names: impl IntoIterator<Item = String>) {
        let mut seen: HashSet<String> = candidates.iter().map(|c| c.name.clone()).collect();
        self.push_all(candidates, &mut seen, names, CandidateSource::Llm);
    }

    /// Whether `name` survives the blacklist and length bounds.
    pub fn accepts(&self, name: &str) -> bool {
        let len = name.chars().count();
        (self.min_chars..=self.max_chars).contains(&len) && !self.blacklist.is_blocked(name)
    }

    fn push_all(
        &self,
        out: &mut Vec<EntityCandidate>,
        seen: &mut HashSet<String>,
        names: impl IntoIterator<Item = String>,
        source: CandidateSource,
    ) {
        for name in names {
            let name = name.trim();
            if self.accepts(name) && seen.insert(name.to_string()) {
                out.push(EntityCandidate::new(name, source));
            }
        }
    }
}

/// Case-folded containment. ASCII-alphanumeric needles must not sit inside
/// a longer Latin word ("vw" does not hit "vwx").
fn contains_surface(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let bounded = needle.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '.' || c == '-');
    if !bounded {
        return haystack.contains(needle);
    }
    haystack.match_indices(needle).any(|(start, m)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + m.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric()) && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(candidates: &[EntityCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    fn source_of(candidates: &[EntityCandidate], name: &str) -> Option<CandidateSource> {
        candidates.iter().find(|c| c.name == name).map(|c| c.source)
    }

    #[test]
    fn seeds_only_when_present() {
        let extractor = CandidateExtractor::default();
        let out = extractor.extract(
            "我推荐比亚迪宋PLUS",
            "比亚迪",
            &["BYD".to_string(), "仰望".to_string()],
        );
        assert_eq!(source_of(&out, "比亚迪"), Some(CandidateSource::Seed));
        assert!(!names(&out).contains(&"仰望"));
    }

    #[test]
    fn alias_table_hits_use_word_edges() {
        let extractor = CandidateExtractor::default();
        let out = extractor.extract("VW and Tesla are popular", "", &[]);
        assert_eq!(source_of(&out, "VW"), Some(CandidateSource::AliasTable));
        assert_eq!(source_of(&out, "Tesla"), Some(CandidateSource::AliasTable));
        let out = extractor.extract("VWX is not a brand", "", &[]);
        assert!(!names(&out).contains(&"VW"));
    }

    #[test]
    fn blacklist_and_bounds_apply() {
        let extractor = CandidateExtractor::default();
        let out = extractor.extract("1. SUV\n2. \"性价比\"\n3. Toyota RAV4", "", &[]);
        let found = names(&out);
        assert!(!found.contains(&"SUV"), "{found:?}");
        assert!(!found.contains(&"性价比"), "{found:?}");
        assert!(found.contains(&"RAV4"), "{found:?}");
        assert!(found.contains(&"Toyota"), "{found:?}");
        assert!(found.iter().all(|n| (2..=40).contains(&n.chars().count())));
    }

    #[test]
    fn signal_source_contributes_and_failures_are_ignored() {
        struct Broken;
        impl OptionalSignalSource for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn entities(&self, _text: &str) -> brandlens_shared::Result<Vec<String>> {
                Err(brandlens_shared::BrandlensError::validation("model missing"))
            }
        }
        let extractor = CandidateExtractor::default()
            .with_signal_source(Box::new(Broken))
            .with_signal_source(Box::new(crate::signals::LexiconSignalSource::new(["蔚来"])));
        let out = extractor.extract("蔚来ES6值得买", "", &[]);
        assert_eq!(source_of(&out, "蔚来"), Some(CandidateSource::Ner));
    }

    #[test]
    fn llm_names_are_filtered_and_deduplicated() {
        let extractor = CandidateExtractor::default();
        let mut out = extractor.extract("Toyota RAV4", "", &[]);
        let before = out.len();
        extractor.merge_llm_names(&mut out, vec!["RAV4".into(), "hybrid".into(), "Lexus".into()]);
        assert_eq!(out.len(), before + 1);
        assert_eq!(source_of(&out, "Lexus"), Some(CandidateSource::Llm));
    }
}
