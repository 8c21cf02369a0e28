//! LLM-backed extraction with one shortfall retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use brandlens_llm::{LlmClient, parse_model_output};
use brandlens_shared::ModelOutput;

use crate::quality::{ExtractionQuality, assess_quality, implied_counts};

/// Typed model answer. Both a `{brands, products}` object and a flat
/// `[{name, type}]` array are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionPayload {
    pub brands: Vec<String>,
    pub products: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Split {
        #[serde(default)]
        brands: Vec<RawName>,
        #[serde(default)]
        products: Vec<RawName>,
    },
    Flat(Vec<TypedName>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawName {
    Plain(String),
    Named { name: String },
}

impl RawName {
    fn into_name(self) -> String {
        match self {
            Self::Plain(name) | Self::Named { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TypedName {
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
}

impl From<RawPayload> for ExtractionPayload {
    fn from(raw: RawPayload) -> Self {
        match raw {
            RawPayload::Split { brands, products } => Self {
                brands: brands.into_iter().map(RawName::into_name).collect(),
                products: products.into_iter().map(RawName::into_name).collect(),
            },
            RawPayload::Flat(items) => {
                let mut payload = Self::default();
                for item in items {
                    if item.kind.eq_ignore_ascii_case("product") {
                        payload.products.push(item.name);
                    } else {
                        payload.brands.push(item.name);
                    }
                }
                payload
            }
        }
    }
}

impl ExtractionPayload {
    pub fn len(&self) -> usize {
        self.brands.len() + self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union in order, keeping first occurrences.
    fn absorb(&mut self, other: ExtractionPayload) {
        merge_unique(&mut self.brands, other.brands);
        merge_unique(&mut self.products, other.products);
    }

    fn cleaned(self) -> Self {
        let clean = |names: Vec<String>| {
            let mut out = Vec::new();
            merge_unique(&mut out, names);
            out
        };
        Self {
            brands: clean(self.brands),
            products: clean(self.products),
        }
    }
}

fn merge_unique(into: &mut Vec<String>, names: Vec<String>) {
    let mut seen: BTreeSet<String> = into.iter().cloned().collect();
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && seen.insert(name.clone()) {
            into.push(name);
        }
    }
}

/// Parse one raw model answer. Never fails; unusable output is `Malformed`.
pub fn parse_extraction(raw: &str) -> ModelOutput<ExtractionPayload> {
    match parse_model_output::<RawPayload>(raw) {
        ModelOutput::Parsed(raw) => ModelOutput::Parsed(ExtractionPayload::from(raw).cleaned()),
        ModelOutput::Malformed { reason } => ModelOutput::Malformed { reason },
    }
}

/// Prompt context for one vertical.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub vertical: String,
    pub vertical_description: String,
    /// Validated names to look out for.
    pub positive_examples: Vec<String>,
    /// Rejected names and why.
    pub negative_examples: Vec<(String, String)>,
}

/// Outcome of LLM extraction for one answer.
#[derive(Debug, Clone, Default)]
pub struct LlmExtraction {
    pub brands: Vec<String>,
    pub products: Vec<String>,
    pub quality: ExtractionQuality,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub attempts: u32,
    /// Transport or parse problem, when one occurred.
    pub error: Option<String>,
}

pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Extract brands and products from `text`.
    ///
    /// When the result falls short of the implied item count the call is
    /// retried once with the shortfall spelled out, and both answers are
    /// unioned. A failed call yields what was gathered so far.
    #[instrument(skip_all, fields(model = %self.client.model_name(), text_len = text.len()))]
    pub async fn extract(&self, text: &str, ctx: &ExtractionContext) -> LlmExtraction {
        let (expected, list_items) = implied_counts(text);
        let mut result = LlmExtraction::default();
        let mut payload = ExtractionPayload::default();

        let first = build_prompt(text, ctx, None);
        self.attempt(&first, &mut payload, &mut result).await;

        let mut quality = assess_quality(expected, list_items, payload.len());
        if !quality.is_sufficient && result.error.is_none() {
            let target = quality.target().unwrap_or_default();
            debug!(found = payload.len(), target, "extraction shortfall, retrying");
            let retry = build_prompt(text, ctx, Some((payload.len(), target)));
            self.attempt(&retry, &mut payload, &mut result).await;
            quality = assess_quality(expected, list_items, payload.len());
        }

        result.brands = payload.brands;
        result.products = payload.products;
        result.quality = quality;
        result
    }

    async fn attempt(
        &self,
        prompt: &str,
        payload: &mut ExtractionPayload,
        result: &mut LlmExtraction,
    ) {
        result.attempts += 1;
        match self.client.query(prompt).await {
            Ok(response) => {
                result.tokens_in += response.tokens_in;
                result.tokens_out += response.tokens_out;
                match parse_extraction(&response.text) {
                    ModelOutput::Parsed(parsed) => payload.absorb(parsed),
                    ModelOutput::Malformed { reason } => {
                        warn!(%reason, "malformed extraction output");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "extraction call failed");
                result.error = Some(e.to_string());
            }
        }
    }
}

fn build_prompt(text: &str, ctx: &ExtractionContext, shortfall: Option<(usize, usize)>) -> String {
    let mut prompt = String::from(
        "Extract every brand and product named in the answer below.\n\
         Return only JSON: {\"brands\": [...], \"products\": [...]}.\n\
         Use names exactly as written. Do not include generic features or categories.\n",
    );
    if !ctx.vertical.is_empty() {
        prompt.push_str(&format!("\nVertical: {}", ctx.vertical));
        if !ctx.vertical_description.is_empty() {
            prompt.push_str(&format!(" ({})", ctx.vertical_description));
        }
        prompt.push('\n');
    }
    if !ctx.positive_examples.is_empty() {
        prompt.push_str(&format!(
            "\nKnown valid entities: {}\n",
            ctx.positive_examples.join(", ")
        ));
    }
    if !ctx.negative_examples.is_empty() {
        prompt.push_str("\nNot entities, never return these:\n");
        for (name, reason) in &ctx.negative_examples {
            prompt.push_str(&format!("- {name} ({reason})\n"));
        }
    }
    if let Some((found, target)) = shortfall {
        prompt.push_str(&format!(
            "\nA previous pass found only {found} entities but the answer lists at least {target}. \
             Read every list item and table row again and return all of them.\n"
        ));
    }
    prompt.push_str("\nAnswer:\n");
    prompt.push_str(text);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandlens_llm::MockLlmClient;

    #[test]
    fn parses_split_and_flat_shapes() {
        let split = parse_extraction("```json\n{\"brands\": [\"比亚迪\", \" 比亚迪 \"], \"products\": [{\"name\": \"宋PLUS\"}]}\n```");
        assert_eq!(
            split,
            ModelOutput::Parsed(ExtractionPayload {
                brands: vec!["比亚迪".into()],
                products: vec!["宋PLUS".into()],
            })
        );

        let flat = parse_extraction(r#"[{"name": "Tesla", "type": "brand"}, {"name": "Model Y", "type": "product"}]"#);
        let payload = flat.parsed().unwrap();
        assert_eq!(payload.brands, vec!["Tesla"]);
        assert_eq!(payload.products, vec!["Model Y"]);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(!parse_extraction("I cannot help with that").is_parsed());
        assert!(!parse_extraction("{\"brands\": 3}").is_parsed());
    }

    #[tokio::test]
    async fn sufficient_first_pass_makes_one_call() {
        let mock = MockLlmClient::new().with_response(r#"{"brands": ["Honda", "Toyota"], "products": []}"#);
        let extractor = LlmExtractor::new(Arc::new(mock.clone()));
        let out = extractor
            .extract("1. Honda\n2. Toyota", &ExtractionContext::default())
            .await;
        assert_eq!(mock.call_count(), 1);
        assert_eq!(out.brands, vec!["Honda", "Toyota"]);
        assert!(out.quality.is_sufficient);
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn shortfall_retries_once_and_unions() {
        let mock = MockLlmClient::new()
            .with_response(r#"{"brands": ["Honda"]}"#)
            .with_response(r#"{"brands": ["Honda", "Toyota"], "products": ["RAV4"]}"#)
            .with_response(r#"{"brands": ["Never"]}"#);
        let extractor = LlmExtractor::new(Arc::new(mock.clone()));
        let out = extractor
            .extract("TOP 5 SUVs\n1. Honda\n2. Toyota\n3. Mazda", &ExtractionContext::default())
            .await;
        assert_eq!(mock.call_count(), 2);
        assert!(mock.calls()[1].contains("found only 1"));
        assert_eq!(out.brands, vec!["Honda", "Toyota"]);
        assert_eq!(out.products, vec!["RAV4"]);
        assert!(!out.quality.is_sufficient);
        assert_eq!(out.tokens_in, 20);
    }

    #[tokio::test]
    async fn transport_failure_is_empty_not_fatal() {
        let mock = MockLlmClient::new().with_failure("connection reset");
        let extractor = LlmExtractor::new(Arc::new(mock.clone()));
        let out = extractor
            .extract("1. Honda\n2. Toyota", &ExtractionContext::default())
            .await;
        assert!(out.brands.is_empty());
        assert!(out.error.is_some());
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn prompt_carries_context_and_shortfall() {
        let ctx = ExtractionContext {
            vertical: "SUV".into(),
            vertical_description: "family cars".into(),
            positive_examples: vec!["比亚迪".into()],
            negative_examples: vec![("续航".into(), "feature".into())],
        };
        let prompt = build_prompt("text", &ctx, Some((1, 5)));
        assert!(prompt.contains("Vertical: SUV (family cars)"));
        assert!(prompt.contains("比亚迪"));
        assert!(prompt.contains("- 续航 (feature)"));
        assert!(prompt.contains("at least 5"));
    }
}
