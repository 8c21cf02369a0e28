//! Alias table: surface form → canonical name.

use std::collections::{BTreeMap, BTreeSet};

use crate::normalize::entity_key;

/// Built-in alias groups: `(canonical, aliases)`.
const BUILTIN_ALIASES: &[(&str, &[&str])] = &[
    ("大众", &["大眾", "Volkswagen", "VW", "上汽大众", "一汽大众"]),
    ("丰田", &["豐田", "Toyota"]),
    ("特斯拉", &["Tesla"]),
    ("比亚迪", &["BYD"]),
    ("宋PLUS", &["宋Plus", "宋PlusDM-i", "宋PLUS DM-i"]),
    ("ID.4", &["ID4", "ID.4 CROZZ"]),
    ("ModelY", &["Model Y"]),
];

/// Maps lookup keys of surface forms to a canonical display name.
///
/// Keys are [`entity_key`]s, so `"Model Y"` and `"modely"` resolve alike.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    canonical_by_key: BTreeMap<String, String>,
    surfaces: BTreeSet<String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with the common automotive aliases.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (canonical, aliases) in BUILTIN_ALIASES {
            table.insert(canonical, canonical);
            for alias in *aliases {
                table.insert(alias, canonical);
            }
        }
        table
    }

    /// Register `alias` for `canonical`. Later inserts win for the same key.
    pub fn insert(&mut self, alias: &str, canonical: &str) {
        let key = entity_key(alias);
        if key.is_empty() {
            return;
        }
        self.canonical_by_key.insert(key, canonical.to_string());
        self.surfaces.insert(alias.to_string());
    }

    /// Canonical name for an exact (key-equal) surface.
    pub fn lookup_exact(&self, surface: &str) -> Option<&str> {
        self.canonical_by_key
            .get(&entity_key(surface))
            .map(String::as_str)
    }

    /// Lookup keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.canonical_by_key.keys().map(String::as_str)
    }

    /// Every registered surface form, as inserted.
    pub fn surfaces(&self) -> impl Iterator<Item = &str> {
        self.surfaces.iter().map(String::as_str)
    }

    /// Distinct canonical names.
    pub fn canonicals(&self) -> BTreeSet<&str> {
        self.canonical_by_key.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.canonical_by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_by_key.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for AliasTable {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (alias, canonical) in iter {
            table.insert(alias, canonical);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_variants() {
        let table = AliasTable::builtin();
        assert_eq!(table.lookup_exact("VW"), Some("大众"));
        assert_eq!(table.lookup_exact("volkswagen"), Some("大众"));
        assert_eq!(table.lookup_exact("大眾"), Some("大众"));
        assert_eq!(table.lookup_exact("Model Y"), Some("ModelY"));
        assert_eq!(table.lookup_exact("宋plus"), Some("宋PLUS"));
        assert_eq!(table.lookup_exact("Honda"), None);
    }

    #[test]
    fn custom_entries_override() {
        let mut table: AliasTable = [("iphone", "iphone")].into_iter().collect();
        assert_eq!(table.lookup_exact("iPhone"), Some("iphone"));
        assert_eq!(table.lookup_exact("iPhone14"), None);
        table.insert("iPhone", "Apple iPhone");
        assert_eq!(table.lookup_exact("iphone"), Some("Apple iPhone"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_keys_are_ignored() {
        let mut table = AliasTable::new();
        table.insert("--", "x");
        assert!(table.is_empty());
    }
}
