//! Product→brand evidence from one answer's text.
//!
//! In a list, each item credits the brand closest to the product inside
//! that item. In running text, a product credits the nearest brand within
//! the proximity window.

use brandlens_canonical::Clusters;
use brandlens_shared::MappingSource;
use brandlens_text::{is_list_format, split_into_list_items};

/// One unit of support for `product` belonging to `brand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceHit {
    pub product: String,
    pub brand: String,
    pub source: MappingSource,
}

/// A span in characters.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn gap(&self, other: &Span) -> usize {
        if self.end <= other.start {
            other.start - self.end
        } else if other.end <= self.start {
            self.start - other.end
        } else {
            0
        }
    }
}

/// Every occurrence of any of `names` in `lowered`, in characters.
fn spans<'a>(lowered: &str, names: impl IntoIterator<Item = &'a String>) -> Vec<Span> {
    let mut out = Vec::new();
    for name in names {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let len = needle.chars().count();
        for (byte, _) in lowered.match_indices(&needle) {
            let start = lowered[..byte].chars().count();
            out.push(Span { start, end: start + len });
        }
    }
    out.sort_by_key(|s| s.start);
    out
}

fn cluster_spans<'a>(lowered: &str, clusters: &'a Clusters) -> Vec<(&'a str, Vec<Span>)> {
    clusters
        .iter()
        .map(|(canonical, variants)| {
            let spans = spans(lowered, std::iter::once(canonical).chain(variants));
            (canonical.as_str(), spans)
        })
        .filter(|(_, spans)| !spans.is_empty())
        .collect()
}

/// Collect mapping evidence from `text` for the given clusters.
pub fn collect_evidence(text: &str, brands: &Clusters, products: &Clusters, window_chars: usize) -> Vec<EvidenceHit> {
    if brands.is_empty() || products.is_empty() {
        return Vec::new();
    }
    if is_list_format(text) {
        let items = split_into_list_items(text);
        if !items.is_empty() {
            return items.iter().flat_map(|item| item_evidence(item, brands, products)).collect();
        }
    }
    proximity_evidence(text, brands, products, window_chars)
}

fn item_evidence(item: &str, brands: &Clusters, products: &Clusters) -> Vec<EvidenceHit> {
    let lowered = item.to_lowercase();
    let brand_spans: Vec<(&str, Span)> = cluster_spans(&lowered, brands)
        .into_iter()
        .map(|(name, spans)| (name, spans[0]))
        .collect();
    if brand_spans.is_empty() {
        return Vec::new();
    }

    cluster_spans(&lowered, products)
        .into_iter()
        .filter_map(|(product, spans)| {
            let position = spans[0];
            brand_spans
                .iter()
                .min_by_key(|(_, span)| (span.start.abs_diff(position.start), span.start))
                .map(|(brand, _)| EvidenceHit {
                    product: product.to_string(),
                    brand: (*brand).to_string(),
                    source: MappingSource::AutoListEvidence,
                })
        })
        .collect()
}

fn proximity_evidence(text: &str, brands: &Clusters, products: &Clusters, window_chars: usize) -> Vec<EvidenceHit> {
    let lowered = text.to_lowercase();
    let brand_spans = cluster_spans(&lowered, brands);

    cluster_spans(&lowered, products)
        .into_iter()
        .filter_map(|(product, product_spans)| {
            let mut best: Option<(usize, &str)> = None;
            for product_span in &product_spans {
                for (brand, spans) in &brand_spans {
                    for span in spans {
                        let gap = product_span.gap(span);
                        if gap <= window_chars && best.is_none_or(|(d, _)| gap < d) {
                            best = Some((gap, brand));
                        }
                    }
                }
            }
            best.map(|(_, brand)| EvidenceHit {
                product: product.to_string(),
                brand: brand.to_string(),
                source: MappingSource::AutoProximity,
            })
        })
        .collect()
}
