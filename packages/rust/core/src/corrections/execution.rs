//! One audit run end to end: call the auditor, build the report, apply
//! auto-routed feedback and queue the rest for review.

use tracing::{info, instrument, warn};

use brandlens_shared::{AppConfig, BrandlensError, Result};
use brandlens_storage::{AuditStatus, NewReviewItem, ReviewItemRecord, ReviewStatus, Storage, VerticalRecord};

use super::audit::ExportedAnswer;
use super::policy::CorrectionPolicy;
use super::report::{AuditReport, build_report};
use super::runner::AuditRunner;
use crate::feedback::{AppliedFeedback, FeedbackPayload, apply_feedback};
use crate::progress::ProgressReporter;

#[derive(Debug, Clone)]
pub struct AuditExecution {
    pub audit_run_id: String,
    pub report: AuditReport,
    pub applied: AppliedFeedback,
    pub review_items: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Audit `export` for `vertical` and record the run.
///
/// The run moves pending → in_progress → completed, or to failed with the
/// error message. A dry run queues review items but writes no feedback.
#[instrument(skip_all, fields(vertical = %vertical.name, answers = export.len(), dry_run = dry_run))]
pub async fn execute_audit(
    storage: &Storage,
    vertical: &VerticalRecord,
    export: &[ExportedAnswer],
    runner: &AuditRunner,
    config: &AppConfig,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<AuditExecution> {
    let run_id = storage.create_audit_run(&vertical.id, dry_run).await?;
    storage.set_audit_status(&run_id, AuditStatus::InProgress, None).await?;

    match run_audit(storage, vertical, export, runner, config, dry_run, progress, &run_id).await {
        Ok(execution) => Ok(execution),
        Err(e) => {
            if let Err(status_err) = storage
                .set_audit_status(&run_id, AuditStatus::Failed, Some(&e.to_string()))
                .await
            {
                warn!(run_id = %run_id, error = %status_err, "could not mark audit run failed");
            }
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_audit(
    storage: &Storage,
    vertical: &VerticalRecord,
    export: &[ExportedAnswer],
    runner: &AuditRunner,
    config: &AppConfig,
    dry_run: bool,
    progress: &dyn ProgressReporter,
    run_id: &str,
) -> Result<AuditExecution> {
    // --- Audit ---
    progress.phase("Auditing extractions");
    let output = runner.run(&vertical.name, export, Some(storage), progress).await?;

    // --- Report ---
    progress.phase("Building report");
    let policy = CorrectionPolicy::from_config(&config.corrections);
    let mut report = build_report(export, &output.items, &policy, config.corrections.cluster_examples);
    report.dry_run = dry_run;

    // --- Auto feedback ---
    let applied = if dry_run {
        AppliedFeedback::default()
    } else {
        progress.phase("Applying feedback");
        apply_feedback(storage, &vertical.id, &report.auto_feedback, &config.consolidation.mapping).await?
    };

    // --- Review queue ---
    progress.phase("Queuing review items");
    for item in &report.pending_review_items {
        let feedback_payload = serde_json::to_string(&item.feedback_payload)
            .map_err(|e| BrandlensError::parse(format!("cannot encode feedback payload: {e}")))?;
        storage
            .insert_review_item(
                run_id,
                &NewReviewItem {
                    llm_answer_id: item.llm_answer_id.clone(),
                    category: item.category.clone(),
                    action: item.action.clone(),
                    confidence_level: item.confidence_level.clone(),
                    confidence_score: item.confidence_score,
                    reason: item.reason.clone(),
                    evidence_quote: item.evidence_quote.clone(),
                    feedback_payload,
                },
            )
            .await?;
    }

    let report_json = serde_json::to_string(&report)
        .map_err(|e| BrandlensError::parse(format!("cannot encode audit report: {e}")))?;
    storage
        .finish_audit_run(run_id, output.tokens_in, output.tokens_out, &report_json)
        .await?;

    info!(
        run_id = %run_id,
        matched = report.matched_items,
        auto = report.auto_applied_counts.values().sum::<usize>(),
        review = report.pending_review_items.len(),
        failed_batches = output.failed_batches,
        "audit run complete"
    );

    Ok(AuditExecution {
        audit_run_id: run_id.to_string(),
        review_items: report.pending_review_items.len(),
        report,
        applied,
        tokens_in: output.tokens_in,
        tokens_out: output.tokens_out,
    })
}

/// Apply or ignore a pending review item.
#[instrument(skip_all, fields(item = %item.id, apply = apply))]
pub async fn resolve_review_item(
    storage: &Storage,
    vertical_id: &str,
    item: &ReviewItemRecord,
    apply: bool,
    config: &AppConfig,
) -> Result<AppliedFeedback> {
    if item.status != ReviewStatus::Pending {
        return Err(BrandlensError::validation(format!(
            "review item {} is already {}",
            item.id,
            item.status.as_str()
        )));
    }
    if !apply {
        storage.set_review_status(&item.id, ReviewStatus::Ignored).await?;
        return Ok(AppliedFeedback::default());
    }
    let payload: FeedbackPayload = serde_json::from_str(&item.feedback_payload)
        .map_err(|e| BrandlensError::parse(format!("review item {} has a bad payload: {e}", item.id)))?;
    let applied = apply_feedback(storage, vertical_id, &payload, &config.consolidation.mapping).await?;
    storage.set_review_status(&item.id, ReviewStatus::Applied).await?;
    Ok(applied)
}
