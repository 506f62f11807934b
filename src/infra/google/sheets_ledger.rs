// Ledger backed by a Google Sheets tab.
//
// Column layout (row 1 is the header):
//   A timestamp | B slide title | C script doc URL | D slide URL | E status
//   F error     | G blog doc id | H script doc id  | I slide id
//
// This is the only place that knows the layout. Rows are never cached: each
// `fetch_all` reads the sheet again.

use super::google_api_client::{GoogleApiClient, GoogleApiError};
use crate::core::pipeline::{
    non_empty, Ledger, NewRow, PipelineError, Row, RowPatch, RowStatus, FIRST_DATA_ROW,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const LAST_COLUMN: char = 'I';

mod col {
    pub const TIMESTAMP: usize = 0;
    pub const SLIDE_TITLE: usize = 1;
    pub const SCRIPT_DOC_URL: usize = 2;
    pub const SLIDE_URL: usize = 3;
    pub const STATUS: usize = 4;
    pub const ERROR: usize = 5;
    pub const BLOG_DOC_ID: usize = 6;
    pub const SCRIPT_DOC_ID: usize = 7;
    pub const SLIDE_ID: usize = 8;
    pub const COUNT: usize = 9;
}

fn letter(column: usize) -> char {
    (b'A' + column as u8) as char
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsLedger {
    api: GoogleApiClient,
    spreadsheet_id: String,
    sheet_name: Option<String>,
    /// Resolved tab title. Only the name is cached, never the rows.
    sheet_title: OnceCell<String>,
}

impl SheetsLedger {
    pub fn new(api: GoogleApiClient, spreadsheet_id: &str, sheet_name: Option<String>) -> Self {
        Self {
            api,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name,
            sheet_title: OnceCell::new(),
        }
    }

    async fn title(&self) -> Result<&str, PipelineError> {
        self.sheet_title
            .get_or_try_init(|| self.resolve_title())
            .await
            .map(String::as_str)
    }

    async fn resolve_title(&self) -> Result<String, PipelineError> {
        let url = GoogleApiClient::url(SHEETS_API, &[self.spreadsheet_id.as_str()]).map_err(unavailable)?;
        let meta: SpreadsheetMeta = self
            .api
            .get(url, &[("fields", "sheets.properties.title")])
            .await
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!(
                    "spreadsheet {} cannot be opened: {}",
                    self.spreadsheet_id, e
                ))
            })?;

        let titles: Vec<String> = meta.sheets.into_iter().map(|s| s.properties.title).collect();
        select_sheet(&titles, self.sheet_name.as_deref()).ok_or_else(|| {
            PipelineError::SourceUnavailable(match &self.sheet_name {
                Some(name) => format!("sheet '{}' not found in spreadsheet {}", name, self.spreadsheet_id),
                None => format!("spreadsheet {} has no sheets", self.spreadsheet_id),
            })
        })
    }

    async fn range(&self, cells: &str) -> Result<String, PipelineError> {
        Ok(format!("'{}'!{}", self.title().await?.replace('\'', "''"), cells))
    }

    async fn read(&self, cells: &str) -> Result<Vec<Vec<Value>>, PipelineError> {
        let range = self.range(cells).await?;
        let url = GoogleApiClient::url(SHEETS_API, &[self.spreadsheet_id.as_str(), "values", range.as_str()])?;
        let values: ValueRange = self.api.get(url, &[]).await.map_err(source_error)?;
        Ok(values.values)
    }
}

fn unavailable(err: GoogleApiError) -> PipelineError {
    PipelineError::SourceUnavailable(err.to_string())
}

/// A vanished spreadsheet stops the stage, anything else is a failed call.
fn source_error(err: GoogleApiError) -> PipelineError {
    if err.is_not_found() {
        unavailable(err)
    } else {
        err.into()
    }
}

fn select_sheet(titles: &[String], wanted: Option<&str>) -> Option<String> {
    match wanted {
        Some(name) => titles.iter().find(|t| t.as_str() == name).cloned(),
        None => titles.first().cloned(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builds a row from the cells of ledger row `row_index`.
fn row_from_cells(row_index: u32, cells: &[Value]) -> Row {
    let get = |column: usize| cells.get(column).map(cell_text).unwrap_or_default();

    let status_label = get(col::STATUS);
    let status = RowStatus::parse(&status_label).unwrap_or_else(|| {
        tracing::debug!(row = row_index, status = %status_label, "Unknown status, reading as Pending");
        RowStatus::Pending
    });

    Row {
        row_index,
        timestamp: get(col::TIMESTAMP),
        slide_title: get(col::SLIDE_TITLE),
        slide_url: get(col::SLIDE_URL),
        script_doc_url: get(col::SCRIPT_DOC_URL),
        status,
        error_message: non_empty(&get(col::ERROR)),
        slide_ref: non_empty(&get(col::SLIDE_ID)),
        script_doc_ref: non_empty(&get(col::SCRIPT_DOC_ID)),
        blog_doc_ref: non_empty(&get(col::BLOG_DOC_ID)),
    }
}

/// The cells a patch writes, as (column, value). Fields the patch leaves
/// alone produce nothing.
fn patch_cells(patch: &RowPatch) -> Vec<(usize, String)> {
    let fields = [
        (col::SLIDE_TITLE, &patch.slide_title),
        (col::SCRIPT_DOC_URL, &patch.script_doc_url),
        (col::SLIDE_URL, &patch.slide_url),
        (col::ERROR, &patch.error_message),
        (col::BLOG_DOC_ID, &patch.blog_doc_ref),
        (col::SCRIPT_DOC_ID, &patch.script_doc_ref),
        (col::SLIDE_ID, &patch.slide_ref),
    ];

    let mut cells: Vec<(usize, String)> = patch
        .status
        .map(|s| (col::STATUS, s.label().to_string()))
        .into_iter()
        .collect();
    cells.extend(
        fields
            .into_iter()
            .filter_map(|(column, value)| value.clone().map(|v| (column, v))),
    );
    cells.sort_by_key(|(column, _)| *column);
    cells
}

fn new_row_cells(row: &NewRow) -> Vec<String> {
    let mut cells = vec![String::new(); col::COUNT];
    cells[col::TIMESTAMP] = row.timestamp.clone();
    cells[col::SLIDE_TITLE] = row.slide_title.clone();
    cells[col::SLIDE_URL] = row.slide_url.clone();
    cells[col::STATUS] = RowStatus::Pending.label().to_string();
    cells[col::SLIDE_ID] = row.slide_ref.clone();
    cells
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn fetch_all(&self) -> Result<Vec<Row>, PipelineError> {
        let grid = self
            .read(&format!("A{}:{}", FIRST_DATA_ROW, LAST_COLUMN))
            .await?;

        Ok(grid
            .iter()
            .enumerate()
            .map(|(offset, cells)| row_from_cells(FIRST_DATA_ROW + offset as u32, cells))
            .collect())
    }

    async fn update(&self, row_index: u32, patch: &RowPatch) -> Result<(), PipelineError> {
        let cells = patch_cells(patch);
        if cells.is_empty() {
            return Ok(());
        }

        let mut data = Vec::with_capacity(cells.len());
        for (column, value) in cells {
            data.push(json!({
                "range": self.range(&format!("{}{}", letter(column), row_index)).await?,
                "values": [[value]],
            }));
        }

        let url = GoogleApiClient::url(SHEETS_API, &[self.spreadsheet_id.as_str(), "values:batchUpdate"])?;
        let _: Value = self
            .api
            .send_json(
                Method::POST,
                url,
                &[],
                &json!({ "valueInputOption": "RAW", "data": data }),
            )
            .await
            .map_err(source_error)?;

        tracing::debug!(row = row_index, "Ledger row updated");
        Ok(())
    }

    async fn last_data_row(&self) -> Result<u32, PipelineError> {
        let grid = self.read(&format!("A:{}", LAST_COLUMN)).await?;
        Ok(grid.len() as u32)
    }

    async fn append(&self, row: &NewRow) -> Result<u32, PipelineError> {
        let row_index = self.last_data_row().await?.max(FIRST_DATA_ROW - 1) + 1;
        let range = self
            .range(&format!("A{}:{}{}", row_index, LAST_COLUMN, row_index))
            .await?;
        let url = GoogleApiClient::url(SHEETS_API, &[self.spreadsheet_id.as_str(), "values", range.as_str()])?;

        let _: Value = self
            .api
            .send_json(
                Method::PUT,
                url,
                &[("valueInputOption", "RAW")],
                &json!({ "values": [new_row_cells(row)] }),
            )
            .await
            .map_err(source_error)?;

        Ok(row_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::String(v.to_string())).collect()
    }

    #[test]
    fn reads_named_fields_from_columns() {
        let row = row_from_cells(
            7,
            &cells(&[
                "2024/05/01 10:00",
                "Intro deck",
                "https://docs/d/D1",
                "https://slides/S1",
                "完了",
                "",
                "B1",
                "D1",
                "S1",
            ]),
        );

        assert_eq!(row.row_index, 7);
        assert_eq!(row.slide_title, "Intro deck");
        assert_eq!(row.script_doc_url, "https://docs/d/D1");
        assert_eq!(row.slide_url, "https://slides/S1");
        assert_eq!(row.status, RowStatus::Completed);
        assert_eq!(row.error_message, None);
        assert_eq!(row.blog_doc_ref.as_deref(), Some("B1"));
        assert_eq!(row.script_doc_ref.as_deref(), Some("D1"));
        assert_eq!(row.slide_ref.as_deref(), Some("S1"));
    }

    #[test]
    fn short_rows_read_as_empty_pending() {
        let row = row_from_cells(3, &cells(&["", "Only a title"]));

        assert_eq!(row.status, RowStatus::Pending);
        assert_eq!(row.slide_ref, None);
        assert_eq!(row.script_doc_ref, None);
    }

    #[test]
    fn patch_touches_only_its_columns() {
        let patch = RowPatch {
            script_doc_ref: Some("D9".to_string()),
            script_doc_url: Some("https://docs/d/D9".to_string()),
            ..RowPatch::default()
        }
        .completed();

        let written: Vec<(char, String)> = patch_cells(&patch)
            .into_iter()
            .map(|(column, value)| (letter(column), value))
            .collect();

        assert_eq!(
            written,
            vec![
                ('C', "https://docs/d/D9".to_string()),
                ('E', "Completed".to_string()),
                ('F', String::new()),
                ('H', "D9".to_string()),
            ]
        );
    }

    #[test]
    fn empty_patch_writes_nothing() {
        assert!(patch_cells(&RowPatch::default()).is_empty());
    }

    #[test]
    fn new_rows_start_pending_with_slide_id_in_column_i() {
        let cells = new_row_cells(&NewRow {
            timestamp: "2024-05-01 10:00:00".to_string(),
            slide_title: "Traits".to_string(),
            slide_url: "https://slides/S2".to_string(),
            slide_ref: "S2".to_string(),
        });

        assert_eq!(cells.len(), 9);
        assert_eq!(cells[4], "Pending");
        assert_eq!(cells[8], "S2");
        assert_eq!(cells[2], "");
    }

    #[test]
    fn first_sheet_is_used_unless_named() {
        let titles = vec!["Responses".to_string(), "Archive".to_string()];

        assert_eq!(select_sheet(&titles, None).as_deref(), Some("Responses"));
        assert_eq!(select_sheet(&titles, Some("Archive")).as_deref(), Some("Archive"));
        assert_eq!(select_sheet(&titles, Some("Missing")), None);
        assert_eq!(select_sheet(&[], None), None);
    }
}
