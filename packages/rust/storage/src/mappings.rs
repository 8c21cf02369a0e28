//! Product→brand mapping rows, their support counts and the auto-validation
//! policy that sits on top of them.

use std::collections::BTreeMap;

use brandlens_shared::{MappingPolicyConfig, MappingSource, Result};
use libsql::{Connection, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{Storage, new_id, now, storage_err, with_busy_retry};

/// One candidate brand for a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRow {
    pub id: String,
    pub product_id: String,
    pub brand_id: String,
    pub brand_name: String,
    pub source: MappingSource,
    pub support_count: i64,
    pub confidence: f64,
    pub is_validated: bool,
}

async fn mappings_on(conn: &Connection, product_id: &str) -> Result<Vec<MappingRow>> {
    let mut rows = conn
        .query(
            "SELECT m.id, m.product_id, m.brand_id, b.canonical_name, m.source,
                    m.support_count, m.confidence, m.is_validated
             FROM product_brand_mappings m JOIN brands b ON b.id = m.brand_id
             WHERE m.product_id = ?1
             ORDER BY m.support_count DESC, m.created_at DESC, m.id DESC",
            params![product_id],
        )
        .await
        .map_err(storage_err)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(storage_err)? {
        let source: MappingSource = row.get::<String>(4).map_err(storage_err)?.parse()?;
        out.push(MappingRow {
            id: row.get::<String>(0).map_err(storage_err)?,
            product_id: row.get::<String>(1).map_err(storage_err)?,
            brand_id: row.get::<String>(2).map_err(storage_err)?,
            brand_name: row.get::<String>(3).map_err(storage_err)?,
            source,
            support_count: row.get::<i64>(5).map_err(storage_err)?,
            confidence: row.get::<f64>(6).map_err(storage_err)?,
            is_validated: row.get::<i64>(7).map_err(storage_err)? != 0,
        });
    }
    Ok(out)
}

/// Add support to a (product, brand) row, creating it on first evidence.
///
/// Human sources (`feedback`, `user_reject`) always replace the stored
/// source; automatic sources never replace a human one or `auto_support`.
async fn upsert_mapping_on(
    conn: &Connection,
    vertical_id: &str,
    product_id: &str,
    brand_id: &str,
    source: MappingSource,
    delta: i64,
) -> Result<()> {
    let delta = delta.max(0);
    let timestamp = now();

    let mut rows = conn
        .query(
            "SELECT id, source FROM product_brand_mappings WHERE product_id = ?1 AND brand_id = ?2",
            params![product_id, brand_id],
        )
        .await
        .map_err(storage_err)?;

    let existing = match rows.next().await.map_err(storage_err)? {
        Some(row) => Some((
            row.get::<String>(0).map_err(storage_err)?,
            row.get::<String>(1).map_err(storage_err)?.parse::<MappingSource>()?,
        )),
        None => None,
    };

    match existing {
        None => {
            conn.execute(
                "INSERT INTO product_brand_mappings
                    (id, vertical_id, product_id, brand_id, source, support_count,
                     confidence, is_validated, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?8)",
                params![
                    new_id(),
                    vertical_id,
                    product_id,
                    brand_id,
                    source.as_str(),
                    delta,
                    (source == MappingSource::Feedback) as i64,
                    timestamp.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        Some((id, _)) if source.is_protected() => {
            conn.execute(
                "UPDATE product_brand_mappings
                 SET support_count = support_count + ?1, source = ?2, is_validated = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    delta,
                    source.as_str(),
                    (source == MappingSource::Feedback) as i64,
                    timestamp.as_str(),
                    id.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        Some((id, current)) => {
            let keep = current.is_protected() || current == MappingSource::AutoSupport;
            let next = if keep { current } else { source };
            conn.execute(
                "UPDATE product_brand_mappings
                 SET support_count = support_count + ?1, source = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![delta, next.as_str(), timestamp.as_str(), id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        }
    }
    Ok(())
}

/// Each row's confidence becomes its share of the product's total support.
async fn recompute_confidence_on(conn: &Connection, product_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE product_brand_mappings
         SET confidence = CASE
             WHEN (SELECT SUM(support_count) FROM product_brand_mappings WHERE product_id = ?1) > 0
             THEN CAST(support_count AS REAL)
                  / (SELECT SUM(support_count) FROM product_brand_mappings WHERE product_id = ?1)
             ELSE 0 END
         WHERE product_id = ?1",
        params![product_id],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

async fn set_validated_on(conn: &Connection, id: &str, validated: bool, source: MappingSource) -> Result<()> {
    conn.execute(
        "UPDATE product_brand_mappings SET is_validated = ?1, source = ?2, updated_at = ?3 WHERE id = ?4",
        params![validated as i64, source.as_str(), now(), id],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

async fn revoke_auto_support_on(conn: &Connection, rows: &[MappingRow], except: Option<&str>) -> Result<()> {
    for row in rows {
        if row.is_validated && row.source == MappingSource::AutoSupport && Some(row.id.as_str()) != except {
            set_validated_on(conn, &row.id, false, MappingSource::AutoSupport).await?;
        }
    }
    Ok(())
}

/// Dominance rule: a single clearly-leading brand auto-validates, any
/// ambiguity revokes automatic validation, and feedback always wins.
async fn apply_policy_on(conn: &Connection, product_id: &str, policy: &MappingPolicyConfig) -> Result<()> {
    let rows = mappings_on(conn, product_id).await?;
    let Some(top) = rows.first() else {
        return Ok(());
    };

    let feedback_validated = rows
        .iter()
        .any(|m| m.is_validated && m.source == MappingSource::Feedback);
    let runner_up = rows.get(1).map(|m| m.support_count).unwrap_or(0);
    let dominant = !feedback_validated
        && runner_up < policy.runner_up_max
        && top.source != MappingSource::UserReject
        && top.support_count >= policy.min_support
        && top.confidence >= policy.min_confidence;

    if dominant {
        revoke_auto_support_on(conn, &rows, Some(&top.id)).await?;
        if !top.is_validated || top.source != MappingSource::AutoSupport {
            debug!(product_id, brand = %top.brand_name, "mapping auto-validated");
            set_validated_on(conn, &top.id, true, MappingSource::AutoSupport).await?;
        }
    } else {
        revoke_auto_support_on(conn, &rows, None).await?;
    }
    Ok(())
}

impl Storage {
    pub async fn mappings_for_product(&self, product_id: &str) -> Result<Vec<MappingRow>> {
        mappings_on(&self.conn, product_id).await
    }

    /// The validated brand of a product, feedback first.
    pub async fn validated_mapping(&self, product_id: &str) -> Result<Option<MappingRow>> {
        let rows = self.mappings_for_product(product_id).await?;
        let mut validated: Vec<MappingRow> = rows.into_iter().filter(|m| m.is_validated).collect();
        validated.sort_by_key(|m| (m.source != MappingSource::Feedback, -m.support_count));
        Ok(validated.into_iter().next())
    }

    /// Product canonical name → validated brand canonical name for a vertical.
    pub async fn validated_product_brands(&self, vertical_id: &str) -> Result<BTreeMap<String, String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT p.canonical_name, b.canonical_name
                 FROM product_brand_mappings m
                 JOIN products p ON p.id = m.product_id
                 JOIN brands b ON b.id = m.brand_id
                 WHERE p.vertical_id = ?1 AND m.is_validated = 1
                 ORDER BY (m.source = 'feedback') DESC, m.support_count DESC",
                params![vertical_id],
            )
            .await
            .map_err(storage_err)?;

        let mut out = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let product: String = row.get(0).map_err(storage_err)?;
            let brand: String = row.get(1).map_err(storage_err)?;
            out.entry(product).or_insert(brand);
        }
        Ok(out)
    }

    pub async fn upsert_mapping(
        &self,
        vertical_id: &str,
        product_id: &str,
        brand_id: &str,
        source: MappingSource,
        delta: i64,
    ) -> Result<()> {
        self.check_writable()?;
        with_busy_retry("upsert_mapping", self.retry, || async move {
            upsert_mapping_on(&self.conn, vertical_id, product_id, brand_id, source, delta).await
        })
        .await
    }

    pub async fn recompute_confidence(&self, product_id: &str) -> Result<()> {
        self.check_writable()?;
        with_busy_retry("recompute_confidence", self.retry, || async move {
            recompute_confidence_on(&self.conn, product_id).await
        })
        .await
    }

    pub async fn apply_auto_validation_policy(
        &self,
        product_id: &str,
        policy: &MappingPolicyConfig,
    ) -> Result<()> {
        self.check_writable()?;
        with_busy_retry("apply_auto_validation_policy", self.retry, || async move {
            apply_policy_on(&self.conn, product_id, policy).await
        })
        .await
    }

    /// Add one product's brand support, recompute confidences and apply the
    /// policy as one IMMEDIATE transaction, retried while the store is busy.
    #[instrument(skip_all, fields(product_id = %product_id, brands = support.len()))]
    pub async fn record_mapping_evidence(
        &self,
        vertical_id: &str,
        product_id: &str,
        support: &[(String, MappingSource, i64)],
        policy: &MappingPolicyConfig,
    ) -> Result<()> {
        self.check_writable()?;
        with_busy_retry("record_mapping_evidence", self.retry, || async move {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .await
                .map_err(storage_err)?;
            let outcome = async {
                for (brand_id, source, delta) in support {
                    upsert_mapping_on(&tx, vertical_id, product_id, brand_id, *source, *delta).await?;
                }
                recompute_confidence_on(&tx, product_id).await?;
                apply_policy_on(&tx, product_id, policy).await
            }
            .await;
            match outcome {
                Ok(()) => tx.commit().await.map_err(storage_err),
                Err(e) => {
                    let _ = tx.rollback().await;
                    Err(e)
                }
            }
        })
        .await
    }

    /// Record a human decision on a (product, brand) pair.
    ///
    /// Accepting writes a validated `feedback` row; rejecting writes an
    /// unvalidated `user_reject` row that automatic evidence cannot revive.
    pub async fn set_mapping_feedback(
        &self,
        vertical_id: &str,
        product_id: &str,
        brand_id: &str,
        accept: bool,
        policy: &MappingPolicyConfig,
    ) -> Result<()> {
        let source = if accept { MappingSource::Feedback } else { MappingSource::UserReject };
        self.record_mapping_evidence(vertical_id, product_id, &[(brand_id.to_string(), source, 0)], policy)
            .await
    }
}
