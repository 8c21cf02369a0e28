//! libSQL knowledge store (local file, offline).
//!
//! The [`Storage`] struct wraps a libSQL database holding verticals, brands,
//! products, aliases, rejections, product→brand mappings, the LLM response
//! cache, and audit runs with their review items.
//!
//! **Access rules:**
//! - writers open with [`Storage::open`] and run migrations
//! - inspection commands may use [`Storage::open_readonly`]
//! - every write is retried while the database reports it is locked, and
//!   surfaces as `StoreContention` once the retry policy is spent
//! - mapping evidence is written in one `BEGIN IMMEDIATE` transaction

mod audit;
mod cache;
mod entities;
mod mappings;
mod migrations;
pub mod retry;

use std::path::Path;

use brandlens_shared::{BrandlensError, Result, RetryPolicy, StorageConfig};
use libsql::params::IntoParams;
use libsql::{Connection, Database, params};

pub use audit::{AuditRunRecord, AuditStatus, NewReviewItem, ReviewItemRecord, ReviewStatus};
pub use cache::CachedResponse;
pub use entities::{KnowledgeEntity, RejectedRecord, VerticalRecord};
pub use mappings::MappingRow;
pub use retry::{is_busy, with_busy_retry};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("readonly", &self.readonly)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StorageConfig::default()).await
    }

    /// Open read-write with the busy-retry policy from `config`.
    pub async fn open_with(path: &Path, config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BrandlensError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            retry: RetryPolicy::from(config),
        };
        storage
            .conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            retry: RetryPolicy::default(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    BrandlensError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // table doesn't exist yet
        }
    }

    /// Execute one write statement, retried while the store is busy.
    async fn execute_write<P, F>(&self, operation: &str, sql: &str, params: F) -> Result<u64>
    where
        F: Fn() -> P,
        P: IntoParams,
    {
        self.check_writable()?;
        let params = &params;
        with_busy_retry(operation, self.retry, || async move {
            self.conn.execute(sql, params()).await.map_err(storage_err)
        })
        .await
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(BrandlensError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn storage_err(e: libsql::Error) -> BrandlensError {
    BrandlensError::Storage(e.to_string())
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}


#[cfg(test)]
mod tests {
    use super::test_support::test_storage;
    use super::*;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("brandlens_test_{}.db", uuid::Uuid::now_v7()));
        let first = Storage::open(&tmp).await.expect("first open");
        drop(first);
        let second = Storage::open(&tmp).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("brandlens_test_{}.db", uuid::Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.ensure_vertical("SUV", None).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.find_vertical("suv").await.unwrap().is_some());
        let result = ro.ensure_vertical("Phones", None).await;
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
