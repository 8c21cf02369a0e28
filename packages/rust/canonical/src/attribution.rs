//! List-position attribution: in a ranked list, only the first brand and
//! the first product of each item are credited to that item.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use brandlens_text::{is_list_format, split_into_list_items};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributionResult {
    pub kept_brands: BTreeSet<String>,
    pub kept_products: BTreeSet<String>,
    pub rejected_brands: BTreeSet<String>,
    pub rejected_products: BTreeSet<String>,
}

/// Names the knowledge base already treats as validated. Matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ValidatedNames {
    lowered: HashSet<String>,
}

impl ValidatedNames {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            lowered: names.into_iter().map(str::to_lowercase).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lowered.contains(&name.to_lowercase())
    }
}

/// Apply the list-position filter to one answer.
///
/// Non-list text keeps every name. In a list, each item credits its
/// earliest brand and earliest product (the longer name wins a tie);
/// names credited by no item are rejected unless validated.
pub fn apply_list_position_filter(
    text: &str,
    brands: &[String],
    products: &[String],
    validated: &ValidatedNames,
) -> AttributionResult {
    let items = if is_list_format(text) {
        split_into_list_items(text)
    } else {
        Vec::new()
    };
    if items.is_empty() {
        return AttributionResult {
            kept_brands: brands.iter().cloned().collect(),
            kept_products: products.iter().cloned().collect(),
            ..AttributionResult::default()
        };
    }

    let mut result = AttributionResult::default();
    for item in &items {
        if let Some(brand) = first_in(item, brands) {
            result.kept_brands.insert(brand.clone());
        }
        if let Some(product) = first_in(item, products) {
            result.kept_products.insert(product.clone());
        }
    }
    settle(brands, validated, &mut result.kept_brands, &mut result.rejected_brands);
    settle(products, validated, &mut result.kept_products, &mut result.rejected_products);

    debug!(
        items = items.len(),
        kept_brands = result.kept_brands.len(),
        kept_products = result.kept_products.len(),
        "list attribution applied"
    );
    result
}

fn settle(
    names: &[String],
    validated: &ValidatedNames,
    kept: &mut BTreeSet<String>,
    rejected: &mut BTreeSet<String>,
) {
    for name in names {
        if kept.contains(name) {
            continue;
        }
        if validated.contains(name) {
            kept.insert(name.clone());
        } else {
            rejected.insert(name.clone());
        }
    }
}

/// Earliest occurring name in `item`; ties go to the longer name.
fn first_in<'a>(item: &str, names: &'a [String]) -> Option<&'a String> {
    names
        .iter()
        .filter(|name| !name.is_empty())
        .filter_map(|name| item.find(name.as_str()).map(|pos| (pos, name)))
        .min_by(|(pa, a), (pb, b)| pa.cmp(pb).then_with(|| b.len().cmp(&a.len())))
        .map(|(_, name)| name)
}
