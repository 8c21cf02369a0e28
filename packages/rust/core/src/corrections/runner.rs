//! Batched audit calls with a response cache.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use brandlens_llm::{LlmClient, LlmResponse, run_bounded};
use brandlens_shared::{CorrectionsConfig, ModelOutput, Result};
use brandlens_storage::{CachedResponse, Storage};

use super::audit::{AuditItem, ExportedAnswer, build_audit_prompt, parse_audit_response};
use crate::progress::ProgressReporter;

/// Cache task type for audit batches.
pub const AUDIT_TASK: &str = "extraction_audit";

/// Cache key for a prompt under a task type.
pub fn prompt_hash(content: &str, task_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(task_type.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditOutput {
    pub items: Vec<AuditItem>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub batches: usize,
    pub failed_batches: usize,
    pub cache_hits: usize,
}

pub struct AuditRunner {
    client: Arc<dyn LlmClient>,
    batch_size: usize,
    concurrency: usize,
}

impl std::fmt::Debug for AuditRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRunner")
            .field("model", &self.client.model_name())
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl AuditRunner {
    pub fn new(client: Arc<dyn LlmClient>, config: &CorrectionsConfig, concurrency: usize) -> Self {
        Self {
            client,
            batch_size: config.batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Audit `export` in batches. A failed or malformed batch is logged and
    /// contributes no items. Responses are cached in `cache` when given.
    #[instrument(skip_all, fields(vertical = %vertical, answers = export.len(), model = %self.client.model_name()))]
    pub async fn run(
        &self,
        vertical: &str,
        export: &[ExportedAnswer],
        cache: Option<&Storage>,
        progress: &dyn ProgressReporter,
    ) -> Result<AuditOutput> {
        let model = self.client.model_name().to_string();
        let mut output = AuditOutput::default();
        let mut pending: Vec<(String, String)> = Vec::new();

        // --- Cached batches ---
        for batch in export.chunks(self.batch_size) {
            output.batches += 1;
            let prompt = build_audit_prompt(vertical, batch)?;
            let hash = prompt_hash(&prompt, AUDIT_TASK);

            if let Some(storage) = cache
                && let Some(cached) = read_cache(storage, &hash, &model).await
                && let ModelOutput::Parsed(response) = parse_audit_response(&cached.text)
            {
                output.items.extend(response.items);
                output.cache_hits += 1;
                continue;
            }
            pending.push((prompt, hash));
        }

        // --- Model calls ---
        let total = output.batches;
        let mut done = output.cache_hits;
        progress.item_progress(done, total, "cached batches");

        let prompts: Vec<String> = pending.iter().map(|(prompt, _)| prompt.clone()).collect();
        let client = self.client.clone();
        let results = run_bounded(prompts, self.concurrency, move |prompt| {
            let client = client.clone();
            async move { client.query(&prompt).await }
        })
        .await;

        for ((_, hash), result) in pending.iter().zip(results) {
            done += 1;
            progress.item_progress(done, total, "audit batch");
            match result {
                Ok(response) => self.absorb(&mut output, response, hash, cache).await,
                Err(e) => {
                    output.failed_batches += 1;
                    warn!(error = %e, "audit batch failed");
                }
            }
        }

        info!(
            batches = output.batches,
            failed = output.failed_batches,
            cache_hits = output.cache_hits,
            items = output.items.len(),
            tokens_in = output.tokens_in,
            tokens_out = output.tokens_out,
            "audit calls complete"
        );
        Ok(output)
    }

    async fn absorb(&self, output: &mut AuditOutput, response: LlmResponse, hash: &str, cache: Option<&Storage>) {
        output.tokens_in += response.tokens_in;
        output.tokens_out += response.tokens_out;
        match parse_audit_response(&response.text) {
            ModelOutput::Parsed(parsed) => {
                debug!(items = parsed.items.len(), "audit batch parsed");
                output.items.extend(parsed.items);
                if let Some(storage) = cache {
                    let cached = CachedResponse {
                        text: response.text,
                        tokens_in: response.tokens_in,
                        tokens_out: response.tokens_out,
                    };
                    if let Err(e) = storage
                        .set_llm_cache(AUDIT_TASK, hash, self.client.model_name(), &cached)
                        .await
                    {
                        warn!(error = %e, "audit cache write failed");
                    }
                }
            }
            ModelOutput::Malformed { reason } => {
                output.failed_batches += 1;
                warn!(reason = %reason, "audit reply malformed");
            }
        }
    }
}

/// A cache read failure is logged and treated as a miss.
async fn read_cache(storage: &Storage, hash: &str, model: &str) -> Option<CachedResponse> {
    match storage.get_llm_cache(AUDIT_TASK, hash, model).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!(error = %e, "audit cache read failed");
            None
        }
    }
}
