// Per-stage outcome counters. Created when a stage starts, logged when it
// ends, never persisted.

use super::pipeline_models::{ItemRef, StageKey};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub item: ItemRef,
    pub message: String,
}

#[derive(Debug)]
pub struct RunReport {
    stage: StageKey,
    success: usize,
    error: usize,
    skipped: usize,
    failures: Vec<ItemFailure>,
    started: Instant,
}

/// Snapshot of a finished (or aborted) stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub stage: StageKey,
    pub elapsed: Duration,
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl Serialize for StageKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.success + self.error + self.skipped
    }
}

impl RunReport {
    pub fn new(stage: StageKey) -> Self {
        Self {
            stage,
            success: 0,
            error: 0,
            skipped: 0,
            failures: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.success += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_error(&mut self, item: ItemRef, message: impl Into<String>) {
        self.error += 1;
        self.failures.push(ItemFailure {
            item,
            message: message.into(),
        });
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            stage: self.stage,
            elapsed: self.started.elapsed(),
            success: self.success,
            error: self.error,
            skipped: self.skipped,
            failures: self.failures.clone(),
        }
    }

    /// Logs the counters and every failure, then hands back the summary.
    pub fn finish(self) -> RunSummary {
        let summary = self.summary();

        tracing::info!(
            stage = %summary.stage,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            success = summary.success,
            error = summary.error,
            skipped = summary.skipped,
            total = summary.total(),
            "{} finished",
            summary.stage.title()
        );
        for failure in &summary.failures {
            tracing::warn!(stage = %summary.stage, "  {}: {}", failure.item, failure.message);
        }

        summary
    }
}
