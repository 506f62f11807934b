// File store backed by the Drive v3 API.
//
// "root" is accepted wherever a folder id is, as Drive itself does.

use super::google_api_client::GoogleApiClient;
use crate::core::pipeline::{FileInfo, FileStore, FolderInfo, PipelineError};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink,parents";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    web_view_link: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

impl From<DriveFile> for FileInfo {
    fn from(file: DriveFile) -> Self {
        let url = file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));
        FileInfo {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            url,
            parents: file.parents,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

pub struct DriveFileStore {
    api: GoogleApiClient,
}

impl DriveFileStore {
    pub fn new(api: GoogleApiClient) -> Self {
        Self { api }
    }

    async fn fetch(&self, id: &str) -> Result<DriveFile, PipelineError> {
        let url = GoogleApiClient::url(DRIVE_API, &[id])?;
        self.api
            .get(url, &[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .await
            .map_err(|e| PipelineError::Collaborator(format!("{}: {}", id, e)))
    }
}

/// Drive search query for the direct children of a folder.
fn children_query(folder_id: &str, mime_type: Option<&str>) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    let mut query = format!("'{}' in parents and trashed = false", escaped);
    if let Some(mime) = mime_type {
        query.push_str(&format!(" and mimeType = '{}'", mime));
    }
    query
}

/// Parents to drop when moving into `folder_id`. `None` means nothing to do.
fn parents_to_remove(parents: &[String], folder_id: &str) -> Option<Vec<String>> {
    if parents.len() == 1 && parents[0] == folder_id {
        return None;
    }
    Some(parents.iter().filter(|p| p.as_str() != folder_id).cloned().collect())
}

#[async_trait]
impl FileStore for DriveFileStore {
    async fn get_folder(&self, folder_id: &str) -> Result<FolderInfo, PipelineError> {
        let file = self.fetch(folder_id).await?;
        if file.mime_type != FOLDER_MIME {
            return Err(PipelineError::Collaborator(format!(
                "{} is not a folder ({})",
                folder_id, file.mime_type
            )));
        }
        Ok(FolderInfo {
            id: file.id,
            name: file.name,
        })
    }

    async fn get_file(&self, file_id: &str) -> Result<FileInfo, PipelineError> {
        Ok(self.fetch(file_id).await?.into())
    }

    async fn list_files(
        &self,
        folder_id: &str,
        mime_type: Option<&str>,
    ) -> Result<Vec<FileInfo>, PipelineError> {
        let query = children_query(folder_id, mime_type);
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", "1000"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.as_str()));
            }

            let url = GoogleApiClient::url(DRIVE_API, &[])?;
            let page: FileList = self.api.get(url, &params).await?;
            files.extend(page.files.into_iter().map(FileInfo::from));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(folder = folder_id, files = files.len(), "Listed folder");
        Ok(files)
    }

    async fn move_into(&self, file_id: &str, folder_id: &str) -> Result<(), PipelineError> {
        // "root" has to be resolved to the real id to compare parents.
        let target = if folder_id == "root" {
            self.fetch("root").await?.id
        } else {
            folder_id.to_string()
        };

        let file = self.fetch(file_id).await?;
        let Some(remove) = parents_to_remove(&file.parents, &target) else {
            tracing::debug!(file = file_id, folder = folder_id, "Already in place");
            return Ok(());
        };

        let remove = remove.join(",");
        let mut params = vec![("fields", "id,parents"), ("supportsAllDrives", "true")];
        if !file.parents.contains(&target) {
            params.push(("addParents", target.as_str()));
        }
        if !remove.is_empty() {
            params.push(("removeParents", remove.as_str()));
        }

        let url = GoogleApiClient::url(DRIVE_API, &[file_id])?;
        let _: Value = self
            .api
            .send_json(Method::PATCH, url, &params, &json!({}))
            .await
            .map_err(|e| PipelineError::Collaborator(format!("moving {}: {}", file_id, e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn query_filters_by_parent_and_type() {
        assert_eq!(
            children_query("abc", Some("application/vnd.google-apps.presentation")),
            "'abc' in parents and trashed = false and mimeType = 'application/vnd.google-apps.presentation'"
        );
        assert_eq!(children_query("o'k", None), "'o\\'k' in parents and trashed = false");
    }

    #[test]
    fn moving_removes_every_other_parent() {
        assert_eq!(parents_to_remove(&ids(&["a", "b"]), "f"), Some(ids(&["a", "b"])));
        assert_eq!(parents_to_remove(&ids(&["a", "f"]), "f"), Some(ids(&["a"])));
        assert_eq!(parents_to_remove(&[], "f"), Some(vec![]));
    }

    #[test]
    fn moving_into_the_only_parent_is_a_no_op() {
        assert_eq!(parents_to_remove(&ids(&["f"]), "f"), None);
    }

    #[test]
    fn url_falls_back_to_file_link() {
        let info: FileInfo = DriveFile {
            id: "X1".to_string(),
            name: "deck".to_string(),
            mime_type: "application/vnd.google-apps.presentation".to_string(),
            web_view_link: None,
            parents: vec![],
        }
        .into();

        assert_eq!(info.url, "https://drive.google.com/file/d/X1/view");
    }
}
