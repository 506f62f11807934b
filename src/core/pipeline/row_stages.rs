// The row stages of the pipeline: what each one needs from a row, and what it
// produces. Sequencing and error bookkeeping live in the reconciler.

use super::pipeline_config::{FolderIds, PipelineConfig};
use super::pipeline_models::{non_empty, DocumentHandle, Row, RowPatch, StageKey, PRESENTATION_MIME};
use super::pipeline_ports::PipelineError;
use super::reconciler::{Eligibility, PipelineContext, RowStage};
use crate::core::generation::{parse_note_sections, ScriptInput};
use crate::core::markdown::parse_markdown;
use async_trait::async_trait;

/// Looks up the row stage behind a key. Folder stages have none.
pub fn row_stage(key: StageKey) -> Option<Box<dyn RowStage>> {
    match key {
        StageKey::SweepRootSlides | StageKey::RegisterSlides => None,
        StageKey::GenerateNotes => Some(Box::new(GenerateNotes)),
        StageKey::ImportNotes => Some(Box::new(ImportNotes)),
        StageKey::GenerateBlog => Some(Box::new(GenerateBlog)),
        StageKey::ArchiveScripts => Some(Box::new(ArchiveStage::Scripts)),
        StageKey::ArchiveSlides => Some(Box::new(ArchiveStage::Slides)),
        StageKey::ArchiveBlogs => Some(Box::new(ArchiveStage::Blogs)),
    }
}

fn required<'r>(value: &'r Option<String>, what: &str) -> Result<&'r str, PipelineError> {
    value
        .as_deref()
        .ok_or_else(|| PipelineError::Collaborator(format!("row has no {}", what)))
}

/// Creates a document and moves it into the output folder when one is configured.
async fn create_output_document(
    ctx: &PipelineContext<'_>,
    prefix: &str,
    row: &Row,
) -> Result<DocumentHandle, PipelineError> {
    let title = format!(
        "{}_{}_{}",
        prefix,
        row.row_index,
        chrono::Utc::now().timestamp_millis()
    );
    let document = ctx.documents.create_document(&title).await?;

    if let Some(folder) = &ctx.config.folders.output_root {
        ctx.files.move_into(&document.id, folder).await?;
    }

    tracing::debug!(row = row.row_index, document = %document.id, "Created {}", title);
    Ok(document)
}

// ============================================================================
// GENERATE SPEAKER SCRIPT
// ============================================================================

pub struct GenerateNotes;

#[async_trait]
impl RowStage for GenerateNotes {
    fn key(&self) -> StageKey {
        StageKey::GenerateNotes
    }

    fn eligibility(&self, row: &Row, config: &PipelineConfig) -> Eligibility {
        if row.slide_ref.is_none() {
            Eligibility::Skip("no slide")
        } else if row.script_doc_ref.is_some() && !config.force_overwrite {
            Eligibility::Skip("script already generated")
        } else {
            Eligibility::Eligible
        }
    }

    fn is_generative(&self) -> bool {
        true
    }

    async fn process(&self, row: &Row, ctx: &PipelineContext<'_>) -> Result<RowPatch, PipelineError> {
        let slide_id = required(&row.slide_ref, "slide")?;

        let slides = ctx.presentations.read_slides(slide_id).await?;
        let prompt = ctx.prompts.speaker_notes(&slides);
        let script = ctx.generator.generate(&prompt).await?;

        let document = create_output_document(ctx, "speaker-notes", row).await?;
        ctx.documents.set_body_text(&document.id, &script).await?;

        Ok(RowPatch {
            script_doc_ref: Some(document.id),
            script_doc_url: Some(document.url),
            ..RowPatch::default()
        })
    }
}

// ============================================================================
// IMPORT NOTES INTO THE DECK
// ============================================================================

pub struct ImportNotes;

#[async_trait]
impl RowStage for ImportNotes {
    fn key(&self) -> StageKey {
        StageKey::ImportNotes
    }

    fn eligibility(&self, row: &Row, _config: &PipelineConfig) -> Eligibility {
        match (&row.script_doc_ref, &row.slide_ref) {
            (Some(_), Some(_)) => Eligibility::Eligible,
            (None, _) => Eligibility::Skip("no script document"),
            (_, None) => Eligibility::Skip("no slide"),
        }
    }

    fn records_status(&self) -> bool {
        false
    }

    async fn process(&self, row: &Row, ctx: &PipelineContext<'_>) -> Result<RowPatch, PipelineError> {
        let doc_id = required(&row.script_doc_ref, "script document")?;
        let slide_id = required(&row.slide_ref, "slide")?;

        let script = ctx.documents.read_body_text(doc_id).await?;
        let notes: Vec<(usize, String)> = parse_note_sections(&script)
            .into_iter()
            .filter_map(|section| section.slide_index().map(|index| (index, section.text)))
            .collect();

        if notes.is_empty() {
            return Err(PipelineError::Collaborator(format!(
                "script document {} has no '@@ Slide <n>' sections",
                doc_id
            )));
        }

        let written = ctx.presentations.set_speaker_notes(slide_id, &notes).await?;
        tracing::info!(
            row = row.row_index,
            sections = notes.len(),
            written,
            "Speaker notes imported"
        );

        Ok(RowPatch::default())
    }
}

// ============================================================================
// GENERATE BLOG ARTICLE
// ============================================================================

pub struct GenerateBlog;

#[async_trait]
impl RowStage for GenerateBlog {
    fn key(&self) -> StageKey {
        StageKey::GenerateBlog
    }

    fn eligibility(&self, row: &Row, config: &PipelineConfig) -> Eligibility {
        if row.script_doc_ref.is_none() && row.slide_ref.is_none() {
            Eligibility::Skip("no script or slide")
        } else if row.blog_doc_ref.is_some() && !config.force_overwrite {
            Eligibility::Skip("blog already generated")
        } else {
            Eligibility::Eligible
        }
    }

    fn is_generative(&self) -> bool {
        true
    }

    async fn process(&self, row: &Row, ctx: &PipelineContext<'_>) -> Result<RowPatch, PipelineError> {
        let slide_url = match (non_empty(&row.slide_url), &row.slide_ref) {
            (Some(url), _) => Some(url),
            (None, Some(slide_id)) => match ctx.files.get_file(slide_id).await {
                Ok(file) => Some(file.url),
                Err(e) => {
                    tracing::debug!(row = row.row_index, "Slide URL unavailable: {}", e);
                    None
                }
            },
            (None, None) => None,
        };

        // An unreadable script still yields an article; the prompt says what went wrong.
        let script = match &row.script_doc_ref {
            Some(doc_id) => match ctx.documents.read_body_text(doc_id).await {
                Ok(text) => ScriptInput::Text(text),
                Err(e) => ScriptInput::Unreadable {
                    document_id: doc_id.clone(),
                    reason: e.to_string(),
                },
            },
            None => ScriptInput::Missing,
        };

        let prompt = ctx.prompts.blog(slide_url.as_deref(), &script);
        let article = ctx.generator.generate(&prompt).await?;

        let document = create_output_document(ctx, "blog-article", row).await?;
        ctx.documents
            .set_body_blocks(&document.id, &parse_markdown(&article))
            .await?;

        Ok(RowPatch {
            blog_doc_ref: Some(document.id),
            ..RowPatch::default()
        })
    }
}

// ============================================================================
// ARCHIVE STAGES
// ============================================================================

/// Moves a produced file into its "done" folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStage {
    Scripts,
    Slides,
    Blogs,
}

impl ArchiveStage {
    fn file_id<'r>(&self, row: &'r Row) -> Option<&'r str> {
        match self {
            ArchiveStage::Scripts => row.script_doc_ref.as_deref(),
            ArchiveStage::Slides => row.slide_ref.as_deref(),
            ArchiveStage::Blogs => row.blog_doc_ref.as_deref(),
        }
    }

    fn target<'c>(&self, folders: &'c FolderIds) -> &'c str {
        match self {
            ArchiveStage::Scripts => &folders.used_docs,
            ArchiveStage::Slides => &folders.scripted_slides,
            ArchiveStage::Blogs => &folders.unposted_blog,
        }
    }
}

#[async_trait]
impl RowStage for ArchiveStage {
    fn key(&self) -> StageKey {
        match self {
            ArchiveStage::Scripts => StageKey::ArchiveScripts,
            ArchiveStage::Slides => StageKey::ArchiveSlides,
            ArchiveStage::Blogs => StageKey::ArchiveBlogs,
        }
    }

    fn eligibility(&self, row: &Row, _config: &PipelineConfig) -> Eligibility {
        match self {
            ArchiveStage::Scripts if row.script_doc_ref.is_none() => {
                Eligibility::Skip("no script document")
            }
            ArchiveStage::Slides if row.slide_ref.is_none() => Eligibility::Skip("no slide"),
            ArchiveStage::Slides if row.script_doc_ref.is_none() => {
                Eligibility::Skip("slide has no script yet")
            }
            ArchiveStage::Blogs if row.blog_doc_ref.is_none() => {
                Eligibility::Skip("no blog document")
            }
            _ => Eligibility::Eligible,
        }
    }

    fn records_status(&self) -> bool {
        false
    }

    async fn process(&self, row: &Row, ctx: &PipelineContext<'_>) -> Result<RowPatch, PipelineError> {
        let file_id = self
            .file_id(row)
            .ok_or_else(|| PipelineError::Collaborator("row has no file to archive".to_string()))?;

        if *self == ArchiveStage::Slides {
            let file = ctx.files.get_file(file_id).await?;
            if file.mime_type != PRESENTATION_MIME {
                return Err(PipelineError::Collaborator(format!(
                    "file {} is not a presentation ({})",
                    file_id, file.mime_type
                )));
            }
        }

        let folder = self.target(&ctx.config.folders);
        ctx.files.move_into(file_id, folder).await?;
        tracing::info!(row = row.row_index, file = file_id, folder, "Archived");

        Ok(RowPatch::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::PromptTemplates;
    use crate::core::markdown::BlockKind;
    use crate::core::pipeline::pipeline_models::{ItemRef, RowStatus, SlideContent};
    use crate::core::pipeline::reconciler::reconcile;
    use crate::infra::memory::{FakeGenerator, MemoryDrive, MemoryLedger};
    use std::collections::HashSet;
    use std::time::Duration;

    struct Fixture {
        config: PipelineConfig,
        ledger: MemoryLedger,
        drive: MemoryDrive,
        generator: FakeGenerator,
        prompts: PromptTemplates,
    }

    impl Fixture {
        fn new(rows: Vec<Row>, generator: FakeGenerator) -> Self {
            let config = PipelineConfig {
                api_call_delay: Duration::ZERO,
                folders: FolderIds {
                    slide_storage: "f-storage".to_string(),
                    used_docs: "f-used".to_string(),
                    scripted_slides: "f-scripted".to_string(),
                    unposted_blog: "f-blog".to_string(),
                    output_root: Some("f-out".to_string()),
                },
                ..PipelineConfig::default()
            };
            let drive = MemoryDrive::new();
            for folder in ["f-storage", "f-used", "f-scripted", "f-blog", "f-out"] {
                drive.add_folder(folder, folder);
            }

            Self {
                config,
                ledger: MemoryLedger::new(rows),
                drive,
                generator,
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

    fn deck() -> Vec<SlideContent> {
        vec![
            SlideContent {
                shape_texts: vec!["Borrowing".to_string()],
                tables: vec![],
            },
            SlideContent {
                shape_texts: vec!["Lifetimes".to_string()],
                tables: vec![],
            },
        ]
    }

    #[tokio::test]
    async fn produce_script_end_to_end() {
        let mut row3 = Row::new(4).with_slide("S3").with_script_doc("D3");
        row3.status = RowStatus::Completed;
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1"), Row::new(3), row3.clone()],
            FakeGenerator::replying("@@ Slide 1\nHi.\n@@ Slide 2\nBye."),
        );
        fixture.drive.add_presentation("S1", "Deck one", "f-storage", deck());
        fixture.drive.add_presentation("S3", "Deck three", "f-storage", deck());

        let summary = reconcile(&GenerateNotes, &fixture.ctx()).await.unwrap();

        assert_eq!((summary.success, summary.error, summary.skipped), (1, 0, 2));
        assert_eq!(fixture.generator.calls(), 1);
        assert!(fixture.generator.prompts()[0].contains("Borrowing"));

        let row1 = fixture.ledger.row(2).unwrap();
        assert_eq!(row1.status, RowStatus::Completed);
        let doc_id = row1.script_doc_ref.expect("script reference written");
        assert_eq!(
            fixture.drive.body(&doc_id).as_deref(),
            Some("@@ Slide 1\nHi.\n@@ Slide 2\nBye.")
        );
        assert!(row1.script_doc_url.contains(&doc_id));
        let file = fixture.drive.file(&doc_id).unwrap();
        assert!(file.name.starts_with("speaker-notes_2_"));
        assert_eq!(file.parents, vec!["f-out".to_string()]);

        assert_eq!(fixture.ledger.writes_for(3), 0);
        assert_eq!(fixture.ledger.row(4).unwrap(), row3);
    }

    #[tokio::test]
    async fn rerunning_a_producing_stage_only_skips() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1")],
            FakeGenerator::replying("@@ Slide 1\nHi."),
        );
        fixture.drive.add_presentation("S1", "Deck", "f-storage", deck());

        reconcile(&GenerateNotes, &fixture.ctx()).await.unwrap();
        let after_first = fixture.ledger.row(2).unwrap();
        let drive_calls = fixture.drive.call_count();

        let summary = reconcile(&GenerateNotes, &fixture.ctx()).await.unwrap();

        assert_eq!((summary.success, summary.skipped), (0, 1));
        assert_eq!(fixture.ledger.row(2).unwrap(), after_first);
        assert_eq!(fixture.generator.calls(), 1);
        assert_eq!(fixture.drive.call_count(), drive_calls);
    }

    #[tokio::test]
    async fn force_overwrite_reproduces_the_script() {
        let mut fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1").with_script_doc("OLD")],
            FakeGenerator::replying("@@ Slide 1\nNew."),
        );
        fixture.config.force_overwrite = true;
        fixture.drive.add_presentation("S1", "Deck", "f-storage", deck());

        let summary = reconcile(&GenerateNotes, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.success, 1);
        assert_ne!(fixture.ledger.row(2).unwrap().script_doc_ref.as_deref(), Some("OLD"));
    }

    #[tokio::test]
    async fn generation_failure_leaves_no_reference() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1")],
            FakeGenerator::failing(PipelineError::RemoteCallFailed {
                status: Some(429),
                attempts: 3,
                body: "quota".to_string(),
            }),
        );
        fixture.drive.add_presentation("S1", "Deck", "f-storage", deck());

        let summary = reconcile(&GenerateNotes, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.error, 1);
        let row = fixture.ledger.row(2).unwrap();
        assert_eq!(row.status, RowStatus::Error);
        assert_eq!(row.script_doc_ref, None);
        assert!(row.error_message.unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn notes_are_written_per_section() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1").with_script_doc("D1")],
            FakeGenerator::replying("unused"),
        );
        fixture.drive.add_presentation("S1", "Deck", "f-storage", deck());
        fixture.drive.add_document(
            "D1",
            "script",
            "f-out",
            "@@ Slide 2\nSecond.\n@@ Slide 1\nFirst.\n@@ Slide 9\nNowhere.",
        );

        let summary = reconcile(&ImportNotes, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.success, 1);
        assert_eq!(fixture.drive.notes("S1", 0).as_deref(), Some("First."));
        assert_eq!(fixture.drive.notes("S1", 1).as_deref(), Some("Second."));
        assert_eq!(fixture.generator.calls(), 0);
    }

    #[tokio::test]
    async fn script_without_sections_is_a_row_error() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1").with_script_doc("D1")],
            FakeGenerator::replying("unused"),
        );
        fixture.drive.add_presentation("S1", "Deck", "f-storage", deck());
        fixture.drive.add_document("D1", "script", "f-out", "Just prose.");

        let summary = reconcile(&ImportNotes, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.error, 1);
        assert_eq!(summary.failures[0].item, ItemRef::Row(2));
        assert_eq!(fixture.ledger.row(2).unwrap().status, RowStatus::Error);
    }

    #[tokio::test]
    async fn blog_is_rendered_from_markdown() {
        let mut row = Row::new(2).with_slide("S1").with_script_doc("D1");
        row.slide_url = "https://slides.example/S1".to_string();
        let fixture = Fixture::new(
            vec![row],
            FakeGenerator::replying("## Title ideas\n- **One**\nPlain text."),
        );
        fixture.drive.add_document("D1", "script", "f-out", "The spoken script.");

        let summary = reconcile(&GenerateBlog, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.success, 1);
        let prompt = &fixture.generator.prompts()[0];
        assert!(prompt.contains("https://slides.example/S1"));
        assert!(prompt.contains("The spoken script."));

        let blog_id = fixture.ledger.row(2).unwrap().blog_doc_ref.unwrap();
        let blocks = fixture.drive.blocks(&blog_id).unwrap();
        assert_eq!(blocks[0].kind, BlockKind::Heading(2));
        assert_eq!(blocks[1].kind, BlockKind::Bullet);
        assert_eq!(blocks[1].text, "One");
        assert!(fixture.drive.file(&blog_id).unwrap().name.starts_with("blog-article_2_"));
    }

    #[tokio::test]
    async fn unreadable_script_is_noted_in_the_blog_prompt() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1").with_script_doc("GONE")],
            FakeGenerator::replying("Article."),
        );
        fixture.drive.add_presentation("S1", "Deck", "f-storage", deck());

        let summary = reconcile(&GenerateBlog, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.success, 1);
        let prompt = &fixture.generator.prompts()[0];
        assert!(prompt.contains("GONE could not be read"));
        // The slide URL falls back to the file store.
        assert!(prompt.contains(&fixture.drive.file("S1").unwrap().url));
    }

    #[tokio::test]
    async fn archive_moves_file_out_of_every_other_folder() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("S1").with_script_doc("D1")],
            FakeGenerator::replying("unused"),
        );
        fixture.drive.add_document("D1", "script", "f-out", "body");
        fixture.drive.add_parent("D1", "f-storage");

        let summary = reconcile(&ArchiveStage::Scripts, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.success, 1);
        let parents: HashSet<String> = fixture.drive.file("D1").unwrap().parents.into_iter().collect();
        assert_eq!(parents, HashSet::from(["f-used".to_string()]));
    }

    #[tokio::test]
    async fn archiving_a_non_presentation_is_a_type_mismatch() {
        let fixture = Fixture::new(
            vec![Row::new(2).with_slide("D9").with_script_doc("D1")],
            FakeGenerator::replying("unused"),
        );
        fixture.drive.add_document("D9", "not a deck", "f-storage", "text");

        let summary = reconcile(&ArchiveStage::Slides, &fixture.ctx()).await.unwrap();

        assert_eq!(summary.error, 1);
        assert!(summary.failures[0].message.contains("not a presentation"));
        assert_eq!(fixture.drive.file("D9").unwrap().parents, vec!["f-storage".to_string()]);
    }

    #[tokio::test]
    async fn ineligible_rows_make_no_collaborator_calls() {
        let fixture = Fixture::new(vec![Row::new(2), Row::new(3)], FakeGenerator::replying("x"));

        for key in StageKey::ALL {
            if let Some(stage) = row_stage(key) {
                let summary = reconcile(stage.as_ref(), &fixture.ctx()).await.unwrap();
                assert_eq!(summary.skipped, 2, "stage {}", key);
            }
        }

        assert_eq!(fixture.drive.call_count(), 0);
        assert_eq!(fixture.generator.calls(), 0);
        assert_eq!(fixture.ledger.writes_for(2), 0);
    }
}
