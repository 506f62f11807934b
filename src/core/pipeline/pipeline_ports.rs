// Ports: what the pipeline needs from the outside world.
// The core only sees these traits. `infra/` provides the Google-backed
// implementations, and tests provide in-memory ones.

use super::pipeline_models::{
    DocumentHandle, FileInfo, FolderInfo, NewRow, Row, RowPatch, SlideContent,
};
use crate::core::markdown::Block;
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Missing credential or unreachable ledger/folder. Aborts before any stage runs.
    #[error("Configuration invalid:\n{}", .0.join("\n"))]
    ConfigInvalid(Vec<String>),

    /// The ledger or its sheet cannot be located. Aborts the stage that needs it.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The generative endpoint refused the request or kept failing.
    #[error("Remote call failed after {attempts} attempt(s) (status {}): {body}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    RemoteCallFailed {
        status: Option<u16>,
        attempts: u32,
        body: String,
    },

    /// A file, document or presentation operation failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl PipelineError {
    /// Fatal errors stop the pipeline. Everything else is recorded on the row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::ConfigInvalid(_) | PipelineError::SourceUnavailable(_)
        )
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// The durable table of per-row pipeline state.
///
/// No caching: every `fetch_all` reflects what is committed externally, since
/// the same ledger is shared by runs spread over days.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Reads every data row (header excluded) in one batched read.
    async fn fetch_all(&self) -> Result<Vec<Row>, PipelineError>;

    /// Writes only the fields named by the patch.
    async fn update(&self, row_index: u32, patch: &RowPatch) -> Result<(), PipelineError>;

    /// Index of the last populated row. Anything below 2 means "no data".
    async fn last_data_row(&self) -> Result<u32, PipelineError>;

    /// Appends a row after the last populated one and returns its index.
    async fn append(&self, row: &NewRow) -> Result<u32, PipelineError>;
}

/// Hierarchical file storage.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, PipelineError>;

    async fn get_file(&self, file_id: &str) -> Result<FileInfo, PipelineError>;

    /// Files directly inside a folder, optionally filtered by MIME type.
    async fn list_files(
        &self,
        folder_id: &str,
        mime_type: Option<&str>,
    ) -> Result<Vec<FileInfo>, PipelineError>;

    /// Move semantics: afterwards the file's only parent is `folder_id`.
    /// Moving a file into the folder it already lives in is a no-op.
    async fn move_into(&self, file_id: &str, folder_id: &str) -> Result<(), PipelineError>;
}

/// Rich-text documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, title: &str) -> Result<DocumentHandle, PipelineError>;

    async fn read_body_text(&self, document_id: &str) -> Result<String, PipelineError>;

    /// Replaces the whole body with plain text.
    async fn set_body_text(&self, document_id: &str, text: &str) -> Result<(), PipelineError>;

    /// Replaces the whole body with formatted blocks.
    async fn set_body_blocks(
        &self,
        document_id: &str,
        blocks: &[Block],
    ) -> Result<(), PipelineError>;
}

/// Slide decks.
#[async_trait]
pub trait PresentationStore: Send + Sync {
    /// Readable content of every slide, in deck order.
    async fn read_slides(&self, presentation_id: &str) -> Result<Vec<SlideContent>, PipelineError>;

    /// Replaces the speaker notes of the given zero-based slide indices.
    /// Indices past the last slide are ignored. Returns how many slides were written.
    async fn set_speaker_notes(
        &self,
        presentation_id: &str,
        notes: &[(usize, String)],
    ) -> Result<usize, PipelineError>;
}
