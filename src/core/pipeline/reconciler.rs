// The per-row state machine shared by every row stage.
//
//   Pending --(not eligible)--> Skipped          no ledger write
//   Pending --> Processing --> Completed | Error  one terminal write per row
//
// Stages that only move or annotate existing files do not own the status
// column: they leave it alone on success and write Error only when they fail.
//
// Rows are handled strictly in ledger order and one at a time. A row error is
// written into the row and the batch moves on; only fatal errors (ledger gone)
// stop the stage.

use super::pipeline_config::PipelineConfig;
use super::pipeline_models::{ItemRef, Row, RowPatch, RowStatus, StageKey};
use super::pipeline_ports::{DocumentStore, FileStore, Ledger, PipelineError, PresentationStore};
use super::run_report::{RunReport, RunSummary};
use crate::core::generation::{PromptTemplates, TextGenerator};
use async_trait::async_trait;

/// Everything a stage body may touch during one run.
pub struct PipelineContext<'a> {
    pub config: &'a PipelineConfig,
    pub ledger: &'a dyn Ledger,
    pub files: &'a dyn FileStore,
    pub documents: &'a dyn DocumentStore,
    pub presentations: &'a dyn PresentationStore,
    pub generator: &'a dyn TextGenerator,
    pub prompts: &'a PromptTemplates,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(&'static str),
}

/// One step of the pipeline that works row by row.
#[async_trait]
pub trait RowStage: Send + Sync {
    fn key(&self) -> StageKey;

    /// Pure check on the row as currently stored. Must not call collaborators.
    fn eligibility(&self, row: &Row, config: &PipelineConfig) -> Eligibility;

    /// Generative stages call the model once per row: they are paced by the
    /// inter-call delay and capped by the batch size.
    fn is_generative(&self) -> bool {
        false
    }

    /// Whether success is recorded as `Completed` on the row. When false the
    /// row is written on success only if the patch carries something.
    fn records_status(&self) -> bool {
        true
    }

    /// Runs the stage body. The returned patch carries the artifact
    /// references produced; the reconciler adds the terminal status.
    async fn process(&self, row: &Row, ctx: &PipelineContext<'_>) -> Result<RowPatch, PipelineError>;
}

/// Runs one stage over every row of the ledger.
pub async fn reconcile(
    stage: &dyn RowStage,
    ctx: &PipelineContext<'_>,
) -> Result<RunSummary, PipelineError> {
    let key = stage.key();
    let mut report = RunReport::new(key);

    let rows = ctx.ledger.fetch_all().await?;
    tracing::info!(stage = %key, rows = rows.len(), "{}", key.title());

    let limit = if stage.is_generative() {
        ctx.config.batch_size
    } else {
        0
    };
    let mut processed = 0usize;

    for row in &rows {
        if let Eligibility::Skip(reason) = stage.eligibility(row, ctx.config) {
            tracing::debug!(stage = %key, row = row.row_index, "Skipped: {}", reason);
            report.record_skipped();
            continue;
        }

        if limit > 0 && processed >= limit {
            tracing::debug!(stage = %key, row = row.row_index, "Skipped: batch limit reached");
            report.record_skipped();
            continue;
        }
        processed += 1;

        if let Err(e) = process_row(stage, row, ctx).await {
            if e.is_fatal() {
                report.finish();
                return Err(e);
            }

            tracing::warn!(stage = %key, row = row.row_index, "Row failed: {}", e);
            report.record_error(ItemRef::Row(row.row_index), e.to_string());

            if let Err(write_err) = ctx
                .ledger
                .update(row.row_index, &RowPatch::failed(e.to_string()))
                .await
            {
                if write_err.is_fatal() {
                    report.finish();
                    return Err(write_err);
                }
                tracing::warn!(
                    stage = %key,
                    row = row.row_index,
                    "Could not record the failure: {}",
                    write_err
                );
            }
        } else {
            report.record_success();
        }

        if stage.is_generative() && !ctx.config.api_call_delay.is_zero() {
            tokio::time::sleep(ctx.config.api_call_delay).await;
        }
    }

    Ok(report.finish())
}

/// Processing -> body -> Completed. Any error is left to the caller, which
/// writes the Error state.
async fn process_row(
    stage: &dyn RowStage,
    row: &Row,
    ctx: &PipelineContext<'_>,
) -> Result<(), PipelineError> {
    let records_status = stage.records_status();
    if records_status && ctx.config.persist_processing {
        ctx.ledger
            .update(row.row_index, &RowPatch::status(RowStatus::Processing))
            .await?;
    }

    let mut patch = stage.process(row, ctx).await?;
    if records_status {
        patch = patch.completed();
    }
    if !patch.is_empty() {
        ctx.ledger.update(row.row_index, &patch).await?;
    }

    tracing::info!(stage = %stage.key(), row = row.row_index, "Row completed");
    Ok(())
}
