// Runs the selected stages in their fixed order.

use super::folder_stages::{register_slides, sweep_root_slides};
use super::pipeline_models::StageKey;
use super::pipeline_ports::PipelineError;
use super::reconciler::{reconcile, PipelineContext};
use super::row_stages::row_stage;
use super::run_report::RunSummary;
use serde::Serialize;

/// Outcome of every stage that ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<RunSummary>,
}

impl PipelineReport {
    pub fn total_errors(&self) -> usize {
        self.stages.iter().map(|s| s.error).sum()
    }

    pub fn log(&self) {
        tracing::info!(
            stages = self.stages.len(),
            errors = self.total_errors(),
            "Pipeline finished"
        );
        for summary in &self.stages {
            tracing::info!(
                "  {:<18} success={} error={} skipped={}",
                summary.stage.key(),
                summary.success,
                summary.error,
                summary.skipped
            );
        }
    }
}

pub async fn run_stage(key: StageKey, ctx: &PipelineContext<'_>) -> Result<RunSummary, PipelineError> {
    match key {
        StageKey::SweepRootSlides => sweep_root_slides(ctx).await,
        StageKey::RegisterSlides => register_slides(ctx).await,
        _ => match row_stage(key) {
            Some(stage) => reconcile(stage.as_ref(), ctx).await,
            None => Err(PipelineError::ConfigInvalid(vec![format!(
                "stage {} has no implementation",
                key
            )])),
        },
    }
}

/// Runs `config.stages` one after the other with the configured pause between
/// them. A fatal error stops the run; stages already finished stay finished.
pub async fn run_pipeline(ctx: &PipelineContext<'_>) -> Result<PipelineReport, PipelineError> {
    let mut report = PipelineReport::default();

    for (position, key) in ctx.config.stages.iter().copied().enumerate() {
        if position > 0 && !ctx.config.stage_delay.is_zero() {
            tokio::time::sleep(ctx.config.stage_delay).await;
        }

        match run_stage(key, ctx).await {
            Ok(summary) => report.stages.push(summary),
            Err(e) => {
                tracing::error!(stage = %key, "Pipeline aborted: {}", e);
                return Err(e);
            }
        }
    }

    report.log();
    Ok(report)
}
