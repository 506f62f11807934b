// Presentation store backed by the Google Slides v1 API.

use super::google_api_client::GoogleApiClient;
use crate::core::pipeline::{PipelineError, PresentationStore, SlideContent};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const SLIDES_API: &str = "https://slides.googleapis.com/v1/presentations";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Presentation {
    #[serde(default)]
    slides: Vec<Page>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    page_elements: Vec<PageElement>,
    slide_properties: Option<SlideProperties>,
    /// Only set on notes pages.
    notes_properties: Option<NotesProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlideProperties {
    notes_page: Option<Box<Page>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotesProperties {
    speaker_notes_object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageElement {
    #[serde(default)]
    object_id: String,
    shape: Option<Shape>,
    table: Option<Table>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Shape {
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextContent {
    #[serde(default)]
    text_elements: Vec<TextElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Deserialize)]
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
    text: Option<TextContent>,
}

impl TextContent {
    fn plain(&self) -> String {
        self.text_elements
            .iter()
            .filter_map(|e| e.text_run.as_ref().and_then(|r| r.content.as_deref()))
            .collect::<String>()
            .trim()
            .to_string()
    }
}

impl Page {
    fn content(&self) -> SlideContent {
        let mut slide = SlideContent::default();
        for element in &self.page_elements {
            if let Some(text) = element.shape.as_ref().and_then(|s| s.text.as_ref()) {
                let text = text.plain();
                if !text.is_empty() {
                    slide.shape_texts.push(text);
                }
            }
            if let Some(table) = &element.table {
                slide.tables.push(
                    table
                        .table_rows
                        .iter()
                        .map(|row| {
                            row.table_cells
                                .iter()
                                .map(|cell| cell.text.as_ref().map(TextContent::plain).unwrap_or_default())
                                .collect()
                        })
                        .collect(),
                );
            }
        }
        slide
    }

    /// The speaker-notes shape of a slide and whether it already holds text.
    fn notes_shape(&self) -> Option<(&str, bool)> {
        let notes_page = self.slide_properties.as_ref()?.notes_page.as_ref()?;
        let object_id = notes_page
            .notes_properties
            .as_ref()?
            .speaker_notes_object_id
            .as_deref()?;

        let has_text = notes_page
            .page_elements
            .iter()
            .find(|e| e.object_id == object_id)
            .and_then(|e| e.shape.as_ref()?.text.as_ref())
            .map(|text| !text.plain().is_empty())
            .unwrap_or(false);

        Some((object_id, has_text))
    }
}

/// Requests replacing the notes of the given slides. Returns them with the
/// number of slides they touch.
///
/// A slide named twice gets the later text only.
fn notes_requests(slides: &[Page], notes: &[(usize, String)]) -> (Vec<Value>, usize) {
    let latest: BTreeMap<usize, &str> = notes
        .iter()
        .map(|(index, text)| (*index, text.as_str()))
        .collect();

    let mut requests = Vec::new();
    let mut written = 0;

    for (index, text) in latest {
        let Some((object_id, has_text)) = slides.get(index).and_then(Page::notes_shape) else {
            continue;
        };
        if has_text {
            requests.push(json!({
                "deleteText": { "objectId": object_id, "textRange": { "type": "ALL" } }
            }));
        }
        requests.push(json!({
            "insertText": { "objectId": object_id, "insertionIndex": 0, "text": text }
        }));
        written += 1;
    }

    (requests, written)
}

pub struct SlidesPresentationStore {
    api: GoogleApiClient,
}

impl SlidesPresentationStore {
    pub fn new(api: GoogleApiClient) -> Self {
        Self { api }
    }

    async fn fetch(&self, presentation_id: &str) -> Result<Presentation, PipelineError> {
        let url = GoogleApiClient::url(SLIDES_API, &[presentation_id])?;
        self.api
            .get(url, &[])
            .await
            .map_err(|e| PipelineError::Collaborator(format!("presentation {}: {}", presentation_id, e)))
    }
}

#[async_trait]
impl PresentationStore for SlidesPresentationStore {
    async fn read_slides(&self, presentation_id: &str) -> Result<Vec<SlideContent>, PipelineError> {
        let presentation = self.fetch(presentation_id).await?;
        Ok(presentation.slides.iter().map(Page::content).collect())
    }

    async fn set_speaker_notes(
        &self,
        presentation_id: &str,
        notes: &[(usize, String)],
    ) -> Result<usize, PipelineError> {
        let presentation = self.fetch(presentation_id).await?;
        let (requests, written) = notes_requests(&presentation.slides, notes);
        if requests.is_empty() {
            return Ok(0);
        }

        let url = GoogleApiClient::url(
            SLIDES_API,
            &[format!("{}:batchUpdate", presentation_id).as_str()],
        )?;
        let _: Value = self
            .api
            .send_json(Method::POST, url, &[], &json!({ "requests": requests }))
            .await
            .map_err(|e| PipelineError::Collaborator(format!("presentation {}: {}", presentation_id, e)))?;

        Ok(written)
    }
}
