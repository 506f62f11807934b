use crate::core::markdown::{joined_text, Block};
use crate::core::pipeline::folder_stages::ROOT_FOLDER;
use crate::core::pipeline::pipeline_models::PRESENTATION_MIME;
use crate::core::pipeline::{
    DocumentHandle, DocumentStore, FileInfo, FileStore, FolderInfo, PipelineError,
    PresentationStore, SlideContent,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

const DOCUMENT_MIME: &str = "application/vnd.google-apps.document";

#[derive(Debug, Clone)]
struct StoredFile {
    info: FileInfo,
    body: String,
    blocks: Option<Vec<Block>>,
    slides: Vec<SlideContent>,
    notes: HashMap<usize, String>,
}

impl StoredFile {
    fn new(info: FileInfo) -> Self {
        Self {
            info,
            body: String::new(),
            blocks: None,
            slides: Vec::new(),
            notes: HashMap::new(),
        }
    }
}

/// Files, documents and decks in one map, standing in for Drive, Docs and Slides.
///
/// Every port call is counted, so tests can check that a stage left the
/// collaborators alone.
pub struct MemoryDrive {
    folders: DashMap<String, String>,
    files: DashMap<String, StoredFile>,
    failures: DashMap<String, String>,
    calls: AtomicUsize,
    created: AtomicUsize,
}

impl Default for MemoryDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDrive {
    pub fn new() -> Self {
        let folders = DashMap::new();
        folders.insert(ROOT_FOLDER.to_string(), "My Drive".to_string());
        Self {
            folders,
            files: DashMap::new(),
            failures: DashMap::new(),
            calls: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        }
    }

    pub fn add_folder(&self, id: &str, name: &str) {
        self.folders.insert(id.to_string(), name.to_string());
    }

    pub fn add_presentation(&self, id: &str, name: &str, parent: &str, slides: Vec<SlideContent>) {
        self.files.insert(
            id.to_string(),
            StoredFile {
                slides,
                ..StoredFile::new(file_info(id, name, PRESENTATION_MIME, parent))
            },
        );
    }

    pub fn add_document(&self, id: &str, name: &str, parent: &str, body: &str) {
        self.files.insert(
            id.to_string(),
            StoredFile {
                body: body.to_string(),
                ..StoredFile::new(file_info(id, name, DOCUMENT_MIME, parent))
            },
        );
    }

    /// Gives a file a second parent, as Drive allows.
    pub fn add_parent(&self, id: &str, folder: &str) {
        if let Some(mut file) = self.files.get_mut(id) {
            file.info.parents.push(folder.to_string());
        }
    }

    /// Makes every later operation on `id` fail with `message`.
    pub fn fail_on(&self, id: &str, message: &str) {
        self.failures.insert(id.to_string(), message.to_string());
    }

    pub fn file(&self, id: &str) -> Option<FileInfo> {
        self.files.get(id).map(|f| f.info.clone())
    }

    pub fn body(&self, id: &str) -> Option<String> {
        self.files.get(id).map(|f| f.body.clone())
    }

    pub fn blocks(&self, id: &str) -> Option<Vec<Block>> {
        self.files.get(id).and_then(|f| f.blocks.clone())
    }

    pub fn notes(&self, id: &str, slide_index: usize) -> Option<String> {
        self.files.get(id).and_then(|f| f.notes.get(&slide_index).cloned())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Counts the call and applies any failure injected for `id`.
    fn enter(&self, id: &str) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.get(id) {
            Some(message) => Err(PipelineError::Collaborator(format!("{}: {}", id, message.value()))),
            None => Ok(()),
        }
    }

    fn not_found(kind: &str, id: &str) -> PipelineError {
        PipelineError::Collaborator(format!("{} {} not found (404)", kind, id))
    }

    fn with_file<T>(
        &self,
        kind: &str,
        id: &str,
        f: impl FnOnce(&mut StoredFile) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        self.enter(id)?;
        let mut file = self.files.get_mut(id).ok_or_else(|| Self::not_found(kind, id))?;
        f(&mut *file)
    }
}

fn file_info(id: &str, name: &str, mime_type: &str, parent: &str) -> FileInfo {
    let url = if mime_type == PRESENTATION_MIME {
        format!("https://docs.google.com/presentation/d/{}/edit", id)
    } else {
        format!("https://docs.google.com/document/d/{}/edit", id)
    };
    FileInfo {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        url,
        parents: vec![parent.to_string()],
    }
}

#[async_trait]
impl FileStore for MemoryDrive {
    async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, PipelineError> {
        self.enter(folder_id)?;
        self.folders
            .get(folder_id)
            .map(|name| FolderInfo {
                id: folder_id.to_string(),
                name: name.value().clone(),
            })
            .ok_or_else(|| Self::not_found("folder", folder_id))
    }

    async fn get_file(&self, file_id: &str) -> Result<FileInfo, PipelineError> {
        self.with_file("file", file_id, |f| Ok(f.info.clone()))
    }

    async fn list_files(
        &self,
        folder_id: &str,
        mime_type: Option<&str>,
    ) -> Result<Vec<FileInfo>, PipelineError> {
        self.enter(folder_id)?;
        if !self.folders.contains_key(folder_id) {
            return Err(Self::not_found("folder", folder_id));
        }

        let mut files: Vec<FileInfo> = self
            .files
            .iter()
            .map(|entry| entry.info.clone())
            .filter(|info| info.parents.iter().any(|p| p == folder_id))
            .filter(|info| mime_type.map_or(true, |mime| info.mime_type == mime))
            .collect();
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    async fn move_into(&self, file_id: &str, folder_id: &str) -> Result<(), PipelineError> {
        if !self.folders.contains_key(folder_id) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(Self::not_found("folder", folder_id));
        }
        self.with_file("file", file_id, |f| {
            f.info.parents = vec![folder_id.to_string()];
            Ok(())
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryDrive {
    async fn create_document(&self, title: &str) -> Result<DocumentHandle, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = format!("doc-{}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
        let info = file_info(&id, title, DOCUMENT_MIME, ROOT_FOLDER);
        let handle = DocumentHandle {
            id: id.clone(),
            url: info.url.clone(),
        };
        self.files.insert(id, StoredFile::new(info));
        Ok(handle)
    }

    async fn read_body_text(&self, document_id: &str) -> Result<String, PipelineError> {
        self.with_file("document", document_id, |f| Ok(f.body.clone()))
    }

    async fn set_body_text(&self, document_id: &str, text: &str) -> Result<(), PipelineError> {
        self.with_file("document", document_id, |f| {
            f.body = text.to_string();
            f.blocks = None;
            Ok(())
        })
    }

    async fn set_body_blocks(
        &self,
        document_id: &str,
        blocks: &[Block],
    ) -> Result<(), PipelineError> {
        self.with_file("document", document_id, |f| {
            f.body = joined_text(blocks);
            f.blocks = Some(blocks.to_vec());
            Ok(())
        })
    }
}

#[async_trait]
impl PresentationStore for MemoryDrive {
    async fn read_slides(&self, presentation_id: &str) -> Result<Vec<SlideContent>, PipelineError> {
        self.with_file("presentation", presentation_id, |f| Ok(f.slides.clone()))
    }

    async fn set_speaker_notes(
        &self,
        presentation_id: &str,
        notes: &[(usize, String)],
    ) -> Result<usize, PipelineError> {
        self.with_file("presentation", presentation_id, |f| {
            let mut touched = HashSet::new();
            for (index, text) in notes {
                if *index < f.slides.len() {
                    f.notes.insert(*index, text.clone());
                    touched.insert(*index);
                }
            }
            Ok(touched.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn move_replaces_every_parent() {
        let drive = MemoryDrive::new();
        drive.add_folder("f-a", "A");
        drive.add_document("D1", "doc", "f-b", "");
        drive.add_parent("D1", "f-c");

        drive.move_into("D1", "f-a").await.unwrap();

        assert_eq!(drive.file("D1").unwrap().parents, vec!["f-a".to_string()]);
        assert_eq!(drive.call_count(), 1);
    }

    #[tokio::test]
    async fn listing_filters_by_type_and_unknown_folders_fail() {
        let drive = MemoryDrive::new();
        drive.add_presentation("S2", "b", ROOT_FOLDER, vec![]);
        drive.add_presentation("S1", "a", ROOT_FOLDER, vec![]);
        drive.add_document("D1", "doc", ROOT_FOLDER, "");

        let decks = drive.list_files(ROOT_FOLDER, Some(PRESENTATION_MIME)).await.unwrap();
        let ids: Vec<&str> = decks.iter().map(|f| f.id.as_str()).collect();

        assert_eq!(ids, vec!["S1", "S2"]);
        assert!(drive.list_files("nope", None).await.is_err());
    }

    #[tokio::test]
    async fn notes_past_the_last_slide_are_ignored() {
        let drive = MemoryDrive::new();
        drive.add_presentation("S1", "deck", ROOT_FOLDER, vec![SlideContent::default()]);

        let written = drive
            .set_speaker_notes("S1", &[(0, "hi".to_string()), (3, "lost".to_string())])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(drive.notes("S1", 3), None);
    }
}
