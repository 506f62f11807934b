// Stages driven by folder contents rather than ledger rows: collecting new
// decks from the root folder and registering them in the ledger.

use super::pipeline_models::{FileInfo, ItemRef, NewRow, Row, RowPatch, StageKey, PRESENTATION_MIME};
use super::pipeline_ports::PipelineError;
use super::reconciler::PipelineContext;
use super::run_report::{RunReport, RunSummary};

/// Alias every file store understands for the top-level folder.
pub const ROOT_FOLDER: &str = "root";

/// Lists a folder. A folder that cannot be listed leaves the stage without input.
async fn list_source(
    ctx: &PipelineContext<'_>,
    folder_id: &str,
    mime_type: Option<&str>,
) -> Result<Vec<FileInfo>, PipelineError> {
    ctx.files
        .list_files(folder_id, mime_type)
        .await
        .map_err(|e| PipelineError::SourceUnavailable(format!("folder {} cannot be listed: {}", folder_id, e)))
}

/// Moves every presentation sitting directly in the root folder into slide storage.
pub async fn sweep_root_slides(ctx: &PipelineContext<'_>) -> Result<RunSummary, PipelineError> {
    let mut report = RunReport::new(StageKey::SweepRootSlides);
    let target = ctx.config.folders.slide_storage.as_str();

    let files = list_source(ctx, ROOT_FOLDER, Some(PRESENTATION_MIME)).await?;
    tracing::info!(stage = %StageKey::SweepRootSlides, files = files.len(), "{}", StageKey::SweepRootSlides.title());

    for file in files {
        match ctx.files.move_into(&file.id, target).await {
            Ok(()) => {
                tracing::info!(file = %file.name, "Moved into slide storage");
                report.record_success();
            }
            Err(e) => {
                tracing::warn!(file = %file.name, "Move failed: {}", e);
                report.record_error(ItemRef::File(file.name.clone()), e.to_string());
            }
        }
    }

    Ok(report.finish())
}

/// Makes sure every file in slide storage has a ledger row.
///
/// A file already referenced by a row is skipped. Otherwise a row with the
/// same title and no slide reference is claimed, or a new row is appended.
pub async fn register_slides(ctx: &PipelineContext<'_>) -> Result<RunSummary, PipelineError> {
    let key = StageKey::RegisterSlides;
    let mut report = RunReport::new(key);

    let files = list_source(ctx, &ctx.config.folders.slide_storage, None).await?;
    let mut rows = ctx.ledger.fetch_all().await?;
    tracing::info!(stage = %key, files = files.len(), rows = rows.len(), "{}", key.title());

    for file in files {
        if rows.iter().any(|row| row.slide_ref.as_deref() == Some(file.id.as_str())) {
            tracing::debug!(stage = %key, file = %file.name, "Skipped: already registered");
            report.record_skipped();
            continue;
        }

        let claimable = rows
            .iter_mut()
            .find(|row| row.slide_ref.is_none() && row.slide_title.trim() == file.name.trim());

        let outcome = match claimable {
            Some(row) => {
                let patch = RowPatch {
                    slide_title: Some(file.name.clone()),
                    slide_url: Some(file.url.clone()),
                    slide_ref: Some(file.id.clone()),
                    ..RowPatch::default()
                };
                let result = ctx.ledger.update(row.row_index, &patch).await;
                if result.is_ok() {
                    row.apply(&patch);
                    tracing::info!(stage = %key, row = row.row_index, file = %file.name, "Linked to existing row");
                }
                result
            }
            None => {
                let new_row = NewRow {
                    timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                    slide_title: file.name.clone(),
                    slide_url: file.url.clone(),
                    slide_ref: file.id.clone(),
                };
                ctx.ledger.append(&new_row).await.map(|row_index| {
                    tracing::info!(stage = %key, row = row_index, file = %file.name, "Registered");
                    let mut row = Row::new(row_index).with_slide(&file.id);
                    row.slide_title = file.name.clone();
                    rows.push(row);
                })
            }
        };

        match outcome {
            Ok(()) => report.record_success(),
            Err(e) if e.is_fatal() => {
                report.finish();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(stage = %key, file = %file.name, "Registration failed: {}", e);
                report.record_error(ItemRef::File(file.name.clone()), e.to_string());
            }
        }
    }

    Ok(report.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::PromptTemplates;
    use crate::core::pipeline::pipeline_config::FolderIds;
    use crate::core::pipeline::{PipelineConfig, RowStatus, SlideContent};
    use crate::infra::memory::{FakeGenerator, MemoryDrive, MemoryLedger};

    struct Fixture {
        config: PipelineConfig,
        ledger: MemoryLedger,
        drive: MemoryDrive,
        generator: FakeGenerator,
        prompts: PromptTemplates,
    }

    impl Fixture {
        fn new(rows: Vec<Row>) -> Self {
            let drive = MemoryDrive::new();
            drive.add_folder("f-storage", "Slides");
            Self {
                config: PipelineConfig {
                    folders: FolderIds {
                        slide_storage: "f-storage".to_string(),
                        ..FolderIds::default()
                    },
                    ..PipelineConfig::default()
                },
                ledger: MemoryLedger::new(rows),
                drive,
                generator: FakeGenerator::replying("unused"),
                prompts: PromptTemplates::default(),
            }
        }

        fn ctx(&self) -> PipelineContext<'_> {
            PipelineContext {
                config: &self.config,
                ledger: &self.ledger,
                files: &self.drive,
                documents: &self.drive,
                presentations: &self.drive,
                generator: &self.generator,
                prompts: &self.prompts,
            }
        }
    }

    #[tokio::test]
    async fn sweep_moves_only_presentations() {
        let fixture = Fixture::new(vec![]);
        fixture.drive.add_presentation("S1", "Deck", ROOT_FOLDER, vec![SlideContent::default()]);
        fixture.drive.add_document("D1", "Notes", ROOT_FOLDER, "text");

        let summary = sweep_root_slides(&fixture.ctx()).await.unwrap();

        assert_eq!(summary.success, 1);
        assert_eq!(fixture.drive.file("S1").unwrap().parents, vec!["f-storage".to_string()]);
        assert_eq!(fixture.drive.file("D1").unwrap().parents, vec![ROOT_FOLDER.to_string()]);
    }

    #[tokio::test]
    async fn sweep_counts_failed_moves_by_file_name() {
        let fixture = Fixture::new(vec![]);
        fixture.drive.add_presentation("S1", "Locked deck", ROOT_FOLDER, vec![]);
        fixture.drive.add_presentation("S2", "Open deck", ROOT_FOLDER, vec![]);
        fixture.drive.fail_on("S1", "permission denied");

        let summary = sweep_root_slides(&fixture.ctx()).await.unwrap();

        assert_eq!((summary.success, summary.error), (1, 1));
        assert_eq!(summary.failures[0].item, ItemRef::File("Locked deck".to_string()));
    }

    #[tokio::test]
    async fn register_appends_links_and_skips() {
        let mut titled = Row::new(2);
        titled.slide_title = "Ownership".to_string();
        let known = Row::new(3).with_slide("S-known");
        let fixture = Fixture::new(vec![titled, known]);
        fixture.drive.add_presentation("S-own", "Ownership", "f-storage", vec![]);
        fixture.drive.add_presentation("S-known", "Known", "f-storage", vec![]);
        fixture.drive.add_presentation("S-new", "Traits", "f-storage", vec![]);

        let summary = register_slides(&fixture.ctx()).await.unwrap();

        assert_eq!((summary.success, summary.skipped, summary.error), (2, 1, 0));

        let linked = fixture.ledger.row(2).unwrap();
        assert_eq!(linked.slide_ref.as_deref(), Some("S-own"));
        assert_eq!(linked.slide_url, fixture.drive.file("S-own").unwrap().url);

        let appended = fixture.ledger.row(4).unwrap();
        assert_eq!(appended.slide_ref.as_deref(), Some("S-new"));
        assert_eq!(appended.slide_title, "Traits");
        assert_eq!(appended.status, RowStatus::Pending);
        assert!(!appended.timestamp.is_empty());

        let again = register_slides(&fixture.ctx()).await.unwrap();
        assert_eq!((again.success, again.skipped), (0, 3));
    }

    #[tokio::test]
    async fn unlistable_storage_is_fatal() {
        let mut fixture = Fixture::new(vec![]);
        fixture.config.folders.slide_storage = "missing".to_string();

        let err = register_slides(&fixture.ctx()).await.unwrap_err();

        assert!(err.is_fatal());
    }
}
