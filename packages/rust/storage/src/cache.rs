use brandlens_shared::Result;
use libsql::params;

use crate::{Storage, new_id, now, storage_err};

/// A cached model response with the token usage it originally cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl Storage {
    // -----------------------------------------------------------------------
    // LLM response cache
    // -----------------------------------------------------------------------

    /// Get a cached response for (task, prompt hash, model).
    pub async fn get_llm_cache(
        &self,
        task_type: &str,
        prompt_hash: &str,
        model_id: &str,
    ) -> Result<Option<CachedResponse>> {
        let mut rows = self
            .conn
            .query(
                "SELECT response_text, tokens_in, tokens_out FROM llm_cache
                 WHERE task_type = ?1 AND prompt_hash = ?2 AND model_id = ?3",
                params![task_type, prompt_hash, model_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(CachedResponse {
                text: row.get::<String>(0).map_err(storage_err)?,
                tokens_in: row.get::<i64>(1).map_err(storage_err)?.max(0) as u64,
                tokens_out: row.get::<i64>(2).map_err(storage_err)?.max(0) as u64,
            })),
            None => Ok(None),
        }
    }

    /// Store a response (upserts).
    pub async fn set_llm_cache(
        &self,
        task_type: &str,
        prompt_hash: &str,
        model_id: &str,
        response: &CachedResponse,
    ) -> Result<()> {
        self.execute_write(
            "set_llm_cache",
            "INSERT INTO llm_cache (id, task_type, prompt_hash, model_id, response_text, tokens_in, tokens_out, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(task_type, prompt_hash, model_id) DO UPDATE SET
                   response_text = excluded.response_text,
                   tokens_in = excluded.tokens_in,
                   tokens_out = excluded.tokens_out,
                   created_at = excluded.created_at",
            || {
                params![
                    new_id(),
                    task_type,
                    prompt_hash,
                    model_id,
                    response.text.as_str(),
                    response.tokens_in as i64,
                    response.tokens_out as i64,
                    now()
                ]
            },
        )
        .await?;
        Ok(())
    }

    /// Drop every cached response for a task type. Returns the number removed.
    pub async fn invalidate_llm_cache(&self, task_type: &str) -> Result<u64> {
        self.execute_write("invalidate_llm_cache", "DELETE FROM llm_cache WHERE task_type = ?1", || {
            params![task_type]
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::CachedResponse;
    use crate::test_support::test_storage;

    #[tokio::test]
    async fn llm_cache_lifecycle() {
        let storage = test_storage().await;
        let miss = storage.get_llm_cache("audit", "hash1", "qwen-plus").await.unwrap();
        assert!(miss.is_none());

        let response = CachedResponse {
            text: r#"{"items": []}"#.into(),
            tokens_in: 120,
            tokens_out: 8,
        };
        storage.set_llm_cache("audit", "hash1", "qwen-plus", &response).await.unwrap();
        let hit = storage.get_llm_cache("audit", "hash1", "qwen-plus").await.unwrap();
        assert_eq!(hit, Some(response));

        // Keyed by model too.
        assert!(storage.get_llm_cache("audit", "hash1", "deepseek-chat").await.unwrap().is_none());

        assert_eq!(storage.invalidate_llm_cache("audit").await.unwrap(), 1);
        assert!(storage.get_llm_cache("audit", "hash1", "qwen-plus").await.unwrap().is_none());
    }
}
