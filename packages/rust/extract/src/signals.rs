//! Optional entity signal sources (NER backends, gazetteers).
//!
//! A source is selected once when the extractor is built. A failing source
//! contributes nothing for that answer; it never fails extraction.

use brandlens_shared::Result;

/// A best-effort producer of entity names for one text.
pub trait OptionalSignalSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn entities(&self, text: &str) -> Result<Vec<String>>;
}

/// The absent backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignalSource;

impl OptionalSignalSource for NoopSignalSource {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn entities(&self, _text: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Dictionary lookup: every lexicon entry occurring in the text.
#[derive(Debug, Default, Clone)]
pub struct LexiconSignalSource {
    terms: Vec<String>,
}

impl LexiconSignalSource {
    pub fn new(terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.trim().is_empty())
            .collect();
        // longest first so "Model Y" is reported before "Model"
        terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        terms.dedup();
        Self { terms }
    }
}

impl OptionalSignalSource for LexiconSignalSource {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    fn entities(&self, text: &str) -> Result<Vec<String>> {
        Ok(self
            .terms
            .iter()
            .filter(|term| text.contains(term.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_yields_nothing() {
        assert!(NoopSignalSource.entities("比亚迪 宋PLUS").unwrap().is_empty());
    }

    #[test]
    fn lexicon_finds_terms_longest_first() {
        let source = LexiconSignalSource::new(["Model", "Model Y", "蔚来", ""]);
        let found = source.entities("特斯拉 Model Y 和 蔚来 ES6").unwrap();
        assert_eq!(found, vec!["Model Y", "Model", "蔚来"]);
    }
}
