// Domain models for the editorial pipeline.
// Nothing in here knows about spreadsheets, HTTP or column letters: the ledger
// implementation translates between these records and whatever grid it stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// First row that can hold data. Row 1 is the header.
pub const FIRST_DATA_ROW: u32 = 2;

/// Progress of a row through the stage that touched it last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
    Skipped,
}

impl RowStatus {
    /// Label written into the ledger.
    pub fn label(&self) -> &'static str {
        match self {
            RowStatus::Pending => "Pending",
            RowStatus::Processing => "Processing",
            RowStatus::Completed => "Completed",
            RowStatus::Error => "Error",
            RowStatus::Skipped => "Skipped",
        }
    }

    /// Parses a ledger cell. Empty cells are `Pending`; the Japanese labels
    /// written by the older spreadsheet scripts are still understood.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" | "Pending" | "未処理" => Some(RowStatus::Pending),
            "Processing" | "処理中" => Some(RowStatus::Processing),
            "Completed" | "完了" => Some(RowStatus::Completed),
            "Error" | "エラー" => Some(RowStatus::Error),
            "Skipped" | "スキップ" => Some(RowStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One tracked deck and everything the pipeline produced for it.
///
/// Artifact references are `None` until the stage that produces them succeeds.
/// Once set, later runs treat the artifact as already produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Position in the ledger, `>= FIRST_DATA_ROW`. Stable for the row's lifetime.
    pub row_index: u32,
    pub timestamp: String,
    pub slide_title: String,
    pub slide_url: String,
    pub script_doc_url: String,
    pub status: RowStatus,
    pub error_message: Option<String>,
    pub slide_ref: Option<String>,
    pub script_doc_ref: Option<String>,
    pub blog_doc_ref: Option<String>,
}

impl Row {
    pub fn new(row_index: u32) -> Self {
        Self {
            row_index,
            ..Default::default()
        }
    }

    pub fn with_slide(mut self, slide_ref: &str) -> Self {
        self.slide_ref = Some(slide_ref.to_string());
        self
    }

    /// Applies a patch in memory, mirroring what the ledger does on disk.
    pub fn apply(&mut self, patch: &RowPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(message) = &patch.error_message {
            self.error_message = non_empty(message);
        }
        if let Some(v) = &patch.slide_title {
            self.slide_title = v.clone();
        }
        if let Some(v) = &patch.slide_url {
            self.slide_url = v.clone();
        }
        if let Some(v) = &patch.script_doc_url {
            self.script_doc_url = v.clone();
        }
        if let Some(v) = &patch.slide_ref {
            self.slide_ref = non_empty(v);
        }
        if let Some(v) = &patch.script_doc_ref {
            self.script_doc_ref = non_empty(v);
        }
        if let Some(v) = &patch.blog_doc_ref {
            self.blog_doc_ref = non_empty(v);
        }
    }
}

#[cfg(test)]
impl Row {
    pub fn with_script_doc(mut self, doc_ref: &str) -> Self {
        self.script_doc_ref = Some(doc_ref.to_string());
        self
    }

    pub fn with_blog_doc(mut self, doc_ref: &str) -> Self {
        self.blog_doc_ref = Some(doc_ref.to_string());
        self
    }
}

/// Normalises an optional cell value: blank means "not produced yet".
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The subset of a row's fields a stage is allowed to change.
///
/// `None` means "leave the stored value alone". `Some("")` clears a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPatch {
    pub status: Option<RowStatus>,
    pub error_message: Option<String>,
    pub slide_title: Option<String>,
    pub slide_url: Option<String>,
    pub script_doc_url: Option<String>,
    pub slide_ref: Option<String>,
    pub script_doc_ref: Option<String>,
    pub blog_doc_ref: Option<String>,
}

impl RowPatch {
    pub fn status(status: RowStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Terminal success: sets the status and clears any stale error.
    pub fn completed(mut self) -> Self {
        self.status = Some(RowStatus::Completed);
        self.error_message = Some(String::new());
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(RowStatus::Error),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RowPatch::default()
    }
}

/// Fields of a row created by the pipeline itself (see the slide registration stage).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRow {
    pub timestamp: String,
    pub slide_title: String,
    pub slide_url: String,
    pub slide_ref: String,
}

/// What a run-report failure refers to: a ledger row, or a file for folder stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ItemRef {
    Row(u32),
    File(String),
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRef::Row(index) => write!(f, "row {}", index),
            ItemRef::File(name) => write!(f, "file '{}'", name),
        }
    }
}

/// The fixed pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKey {
    SweepRootSlides,
    RegisterSlides,
    GenerateNotes,
    ImportNotes,
    GenerateBlog,
    ArchiveScripts,
    ArchiveSlides,
    ArchiveBlogs,
}

impl StageKey {
    pub const ALL: [StageKey; 8] = [
        StageKey::SweepRootSlides,
        StageKey::RegisterSlides,
        StageKey::GenerateNotes,
        StageKey::ImportNotes,
        StageKey::GenerateBlog,
        StageKey::ArchiveScripts,
        StageKey::ArchiveSlides,
        StageKey::ArchiveBlogs,
    ];

    /// Identifier accepted in `PIPELINE_STAGES`.
    pub fn key(&self) -> &'static str {
        match self {
            StageKey::SweepRootSlides => "sweep-root-slides",
            StageKey::RegisterSlides => "register-slides",
            StageKey::GenerateNotes => "generate-notes",
            StageKey::ImportNotes => "import-notes",
            StageKey::GenerateBlog => "generate-blog",
            StageKey::ArchiveScripts => "archive-scripts",
            StageKey::ArchiveSlides => "archive-slides",
            StageKey::ArchiveBlogs => "archive-blogs",
        }
    }

    /// Human-readable name used in logs and run reports.
    pub fn title(&self) -> &'static str {
        match self {
            StageKey::SweepRootSlides => "Move new decks out of the root folder",
            StageKey::RegisterSlides => "Register decks in the ledger",
            StageKey::GenerateNotes => "Generate speaker scripts",
            StageKey::ImportNotes => "Import speaker notes into decks",
            StageKey::GenerateBlog => "Generate blog articles",
            StageKey::ArchiveScripts => "Archive used scripts",
            StageKey::ArchiveSlides => "Archive scripted decks",
            StageKey::ArchiveBlogs => "Move blog drafts to the unposted folder",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        StageKey::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// COLLABORATOR DATA
// ============================================================================

/// MIME type of presentation files in the file store.
pub const PRESENTATION_MIME: &str = "application/vnd.google-apps.presentation";

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub url: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
}

/// A freshly created document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub id: String,
    pub url: String,
}

/// Readable content of one slide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideContent {
    /// Text of every text-bearing shape, in page order.
    pub shape_texts: Vec<String>,
    /// Tables as rows of cell text.
    pub tables: Vec<Vec<Vec<String>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_current_and_legacy_labels() {
        assert_eq!(RowStatus::parse(""), Some(RowStatus::Pending));
        assert_eq!(RowStatus::parse("Completed"), Some(RowStatus::Completed));
        assert_eq!(RowStatus::parse("エラー"), Some(RowStatus::Error));
        assert_eq!(RowStatus::parse(" 処理中 "), Some(RowStatus::Processing));
        assert_eq!(RowStatus::parse("whatever"), None);
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut row = Row::new(4).with_slide("S1").with_blog_doc("B1");
        row.slide_title = "Intro".to_string();

        let patch = RowPatch {
            script_doc_ref: Some("D1".to_string()),
            ..RowPatch::default()
        }
        .completed();
        row.apply(&patch);

        assert_eq!(row.status, RowStatus::Completed);
        assert_eq!(row.script_doc_ref.as_deref(), Some("D1"));
        assert_eq!(row.blog_doc_ref.as_deref(), Some("B1"));
        assert_eq!(row.slide_ref.as_deref(), Some("S1"));
        assert_eq!(row.slide_title, "Intro");
        assert_eq!(row.error_message, None);
    }

    #[test]
    fn failed_patch_records_message() {
        let mut row = Row::new(2);
        row.apply(&RowPatch::failed("boom"));

        assert_eq!(row.status, RowStatus::Error);
        assert_eq!(row.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn blank_references_read_as_missing() {
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(" abc "), Some("abc".to_string()));
    }
}
