//! Audit runs and the review items they leave behind.

use brandlens_shared::{BrandlensError, Result};
use libsql::params;
use serde::Serialize;

use crate::{Storage, new_id, now, storage_err};

/// Lifecycle of an audit run: pending → in_progress → completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: AuditStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Applied,
    Ignored,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "applied" => Some(Self::Applied),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRunRecord {
    pub id: String,
    pub vertical_id: String,
    pub status: AuditStatus,
    pub dry_run: bool,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub report_json: Option<String>,
    pub error: Option<String>,
}

/// A suggestion queued for a human.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewItem {
    pub llm_answer_id: String,
    pub category: String,
    pub action: String,
    pub confidence_level: String,
    pub confidence_score: f64,
    pub reason: String,
    pub evidence_quote: String,
    /// JSON the feedback writer replays when the item is applied.
    pub feedback_payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItemRecord {
    pub id: String,
    pub audit_run_id: String,
    pub llm_answer_id: String,
    pub category: String,
    pub action: String,
    pub confidence_level: String,
    pub confidence_score: f64,
    pub reason: String,
    pub evidence_quote: String,
    pub feedback_payload: String,
    pub status: ReviewStatus,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Audit runs
    // -----------------------------------------------------------------------

    /// Create a pending audit run and return its id.
    pub async fn create_audit_run(&self, vertical_id: &str, dry_run: bool) -> Result<String> {
        let id = new_id();
        self.execute_write(
            "create_audit_run",
            "INSERT INTO audit_runs (id, vertical_id, status, dry_run, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            || params![id.as_str(), vertical_id, AuditStatus::Pending.as_str(), dry_run as i64, now()],
        )
        .await?;
        Ok(id)
    }

    pub async fn get_audit_run(&self, id: &str) -> Result<Option<AuditRunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, vertical_id, status, dry_run, tokens_in, tokens_out, report_json, error
                 FROM audit_runs WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let status = row.get::<String>(2).map_err(storage_err)?;
        Ok(Some(AuditRunRecord {
            id: row.get::<String>(0).map_err(storage_err)?,
            vertical_id: row.get::<String>(1).map_err(storage_err)?,
            status: AuditStatus::parse(&status)
                .ok_or_else(|| BrandlensError::Storage(format!("unknown audit status '{status}'")))?,
            dry_run: row.get::<i64>(3).map_err(storage_err)? != 0,
            tokens_in: row.get::<i64>(4).map_err(storage_err)?.max(0) as u64,
            tokens_out: row.get::<i64>(5).map_err(storage_err)?.max(0) as u64,
            report_json: row.get::<String>(6).ok(),
            error: row.get::<String>(7).ok(),
        }))
    }

    /// Move a run to `status`, rejecting transitions the lifecycle forbids.
    pub async fn set_audit_status(&self, id: &str, status: AuditStatus, error: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let current = self
            .get_audit_run(id)
            .await?
            .ok_or_else(|| BrandlensError::validation(format!("audit run {id} not found")))?
            .status;
        if !current.can_transition_to(status) {
            return Err(BrandlensError::validation(format!(
                "audit run {id} cannot move from {} to {}",
                current.as_str(),
                status.as_str()
            )));
        }
        let finished = matches!(status, AuditStatus::Completed | AuditStatus::Failed).then(now);
        self.execute_write(
            "set_audit_status",
            "UPDATE audit_runs SET status = ?1, error = COALESCE(?2, error),
                finished_at = COALESCE(?3, finished_at)
             WHERE id = ?4",
            || params![status.as_str(), error, finished.as_deref(), id],
        )
        .await?;
        Ok(())
    }

    /// Store usage and the serialized report, then mark the run completed.
    pub async fn finish_audit_run(
        &self,
        id: &str,
        tokens_in: u64,
        tokens_out: u64,
        report_json: &str,
    ) -> Result<()> {
        self.execute_write(
            "finish_audit_run",
            "UPDATE audit_runs SET tokens_in = ?1, tokens_out = ?2, report_json = ?3 WHERE id = ?4",
            || params![tokens_in as i64, tokens_out as i64, report_json, id],
        )
        .await?;
        self.set_audit_status(id, AuditStatus::Completed, None).await
    }

    // -----------------------------------------------------------------------
    // Review items
    // -----------------------------------------------------------------------

    pub async fn insert_review_item(&self, audit_run_id: &str, item: &NewReviewItem) -> Result<String> {
        let id = new_id();
        self.execute_write(
            "insert_review_item",
            "INSERT INTO review_items (id, audit_run_id, llm_answer_id, category, action,
                confidence_level, confidence_score, reason, evidence_quote, feedback_payload,
                status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            || {
                params![
                    id.as_str(),
                    audit_run_id,
                    item.llm_answer_id.as_str(),
                    item.category.as_str(),
                    item.action.as_str(),
                    item.confidence_level.as_str(),
                    item.confidence_score,
                    item.reason.as_str(),
                    item.evidence_quote.as_str(),
                    item.feedback_payload.as_str(),
                    ReviewStatus::Pending.as_str(),
                    now()
                ]
            },
        )
        .await?;
        Ok(id)
    }

    pub async fn list_review_items(
        &self,
        audit_run_id: &str,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<ReviewItemRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, audit_run_id, llm_answer_id, category, action, confidence_level,
                        confidence_score, reason, evidence_quote, feedback_payload, status
                 FROM review_items
                 WHERE audit_run_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at, id",
                params![audit_run_id, status.map(|s| s.as_str())],
            )
            .await
            .map_err(storage_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let status = row.get::<String>(10).map_err(storage_err)?;
            out.push(ReviewItemRecord {
                id: row.get::<String>(0).map_err(storage_err)?,
                audit_run_id: row.get::<String>(1).map_err(storage_err)?,
                llm_answer_id: row.get::<String>(2).map_err(storage_err)?,
                category: row.get::<String>(3).map_err(storage_err)?,
                action: row.get::<String>(4).map_err(storage_err)?,
                confidence_level: row.get::<String>(5).map_err(storage_err)?,
                confidence_score: row.get::<f64>(6).map_err(storage_err)?,
                reason: row.get::<String>(7).map_err(storage_err)?,
                evidence_quote: row.get::<String>(8).map_err(storage_err)?,
                feedback_payload: row.get::<String>(9).map_err(storage_err)?,
                status: ReviewStatus::parse(&status)
                    .ok_or_else(|| BrandlensError::Storage(format!("unknown review status '{status}'")))?,
            });
        }
        Ok(out)
    }

    pub async fn set_review_status(&self, id: &str, status: ReviewStatus) -> Result<()> {
        self.execute_write(
            "set_review_status",
            "UPDATE review_items SET status = ?1 WHERE id = ?2",
            || params![status.as_str(), id],
        )
        .await?;
        Ok(())
    }
}
