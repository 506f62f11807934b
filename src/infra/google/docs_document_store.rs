// Document store backed by the Google Docs v1 API.
// Bodies are replaced wholesale: clear everything after index 1, insert the
// new text, then style it with one batchUpdate.

use super::google_api_client::GoogleApiClient;
use crate::core::markdown::{joined_text, utf16_len, Block, BlockKind, InlineStyle};
use crate::core::pipeline::{DocumentHandle, DocumentStore, PipelineError};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

const DOCS_API: &str = "https://docs.googleapis.com/v1/documents";

/// Index of the first character of a document body.
const BODY_START: usize = 1;

// =============================================================================
// GOOGLE DOCS API RESPONSE STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    document_id: String,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Body {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuralElement {
    #[serde(default)]
    end_index: usize,
    paragraph: Option<Paragraph>,
    table: Option<Table>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextRun {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    #[serde(default)]
    table_rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRow {
    #[serde(default)]
    table_cells: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableCell {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

impl Document {
    fn text(&self) -> String {
        let mut out = String::new();
        if let Some(body) = &self.body {
            for element in &body.content {
                extract_element_text(element, &mut out);
            }
        }
        out
    }

    /// End index of the body, including the final newline Docs always keeps.
    fn end_index(&self) -> usize {
        self.body
            .as_ref()
            .and_then(|b| b.content.last())
            .map(|e| e.end_index)
            .unwrap_or(BODY_START + 1)
    }
}

fn extract_element_text(element: &StructuralElement, output: &mut String) {
    if let Some(paragraph) = &element.paragraph {
        for para_element in &paragraph.elements {
            if let Some(content) = para_element.text_run.as_ref().and_then(|r| r.content.as_ref()) {
                output.push_str(content);
            }
        }
    }

    if let Some(table) = &element.table {
        for row in &table.table_rows {
            let mut cells: Vec<String> = Vec::new();
            for cell in &row.table_cells {
                let mut cell_text = String::new();
                for cell_element in &cell.content {
                    extract_element_text(cell_element, &mut cell_text);
                }
                cells.push(cell_text.trim().to_string());
            }
            output.push_str(&cells.join("\t"));
            output.push('\n');
        }
    }
}

fn range(start: usize, end: usize) -> Value {
    json!({ "startIndex": start, "endIndex": end })
}

/// Clears the body and inserts `text` at the start.
fn replace_body_requests(end_index: usize, text: &str) -> Vec<Value> {
    let mut requests = Vec::new();
    // The final newline of a body can never be deleted.
    if end_index > BODY_START + 1 {
        requests.push(json!({ "deleteContentRange": { "range": range(BODY_START, end_index - 1) } }));
    }
    if !text.is_empty() {
        requests.push(json!({
            "insertText": { "location": { "index": BODY_START }, "text": text }
        }));
    }
    requests
}

/// Paragraph and text styles for blocks already inserted at `BODY_START`.
fn format_requests(blocks: &[Block]) -> Vec<Value> {
    let mut requests = Vec::new();
    let mut start = BODY_START;

    for block in blocks {
        let len = utf16_len(&block.text);
        let paragraph = range(start, start + len + 1);

        match block.kind {
            BlockKind::Heading(level) if len > 0 => requests.push(json!({
                "updateParagraphStyle": {
                    "range": paragraph,
                    "paragraphStyle": { "namedStyleType": format!("HEADING_{}", level) },
                    "fields": "namedStyleType",
                }
            })),
            BlockKind::Bullet if len > 0 => requests.push(json!({
                "createParagraphBullets": {
                    "range": paragraph,
                    "bulletPreset": "BULLET_DISC_CIRCLE_SQUARE",
                }
            })),
            BlockKind::Numbered if len > 0 => requests.push(json!({
                "createParagraphBullets": {
                    "range": paragraph,
                    "bulletPreset": "NUMBERED_DECIMAL_ALPHA_ROMAN",
                }
            })),
            _ => {}
        }

        for span in &block.spans {
            let (style, field) = match span.style {
                InlineStyle::Bold => (json!({ "bold": true }), "bold"),
                InlineStyle::Italic => (json!({ "italic": true }), "italic"),
            };
            requests.push(json!({
                "updateTextStyle": {
                    "range": range(start + span.start, start + span.end),
                    "textStyle": style,
                    "fields": field,
                }
            }));
        }

        start += len + 1;
    }

    requests
}

pub struct DocsDocumentStore {
    api: GoogleApiClient,
}

impl DocsDocumentStore {
    pub fn new(api: GoogleApiClient) -> Self {
        Self { api }
    }

    async fn fetch(&self, document_id: &str) -> Result<Document, PipelineError> {
        let url = GoogleApiClient::url(DOCS_API, &[document_id])?;
        self.api
            .get(url, &[])
            .await
            .map_err(|e| PipelineError::Collaborator(format!("document {}: {}", document_id, e)))
    }

    async fn batch_update(&self, document_id: &str, requests: Vec<Value>) -> Result<(), PipelineError> {
        if requests.is_empty() {
            return Ok(());
        }
        let url = GoogleApiClient::url(DOCS_API, &[format!("{}:batchUpdate", document_id).as_str()])?;
        let _: Value = self
            .api
            .send_json(Method::POST, url, &[], &json!({ "requests": requests }))
            .await
            .map_err(|e| PipelineError::Collaborator(format!("document {}: {}", document_id, e)))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for DocsDocumentStore {
    async fn create_document(&self, title: &str) -> Result<DocumentHandle, PipelineError> {
        let url = GoogleApiClient::url(DOCS_API, &[])?;
        let document: Document = self
            .api
            .send_json(Method::POST, url, &[], &json!({ "title": title }))
            .await?;

        Ok(DocumentHandle {
            url: format!("https://docs.google.com/document/d/{}/edit", document.document_id),
            id: document.document_id,
        })
    }

    async fn read_body_text(&self, document_id: &str) -> Result<String, PipelineError> {
        Ok(self.fetch(document_id).await?.text())
    }

    async fn set_body_text(&self, document_id: &str, text: &str) -> Result<(), PipelineError> {
        let end = self.fetch(document_id).await?.end_index();
        self.batch_update(document_id, replace_body_requests(end, text))
            .await
    }

    async fn set_body_blocks(&self, document_id: &str, blocks: &[Block]) -> Result<(), PipelineError> {
        let end = self.fetch(document_id).await?.end_index();
        let mut requests = replace_body_requests(end, &joined_text(blocks));
        requests.extend(format_requests(blocks));
        self.batch_update(document_id, requests).await
    }
}
