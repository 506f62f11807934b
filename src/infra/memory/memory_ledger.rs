use crate::core::pipeline::{Ledger, NewRow, PipelineError, Row, RowPatch, FIRST_DATA_ROW};
use async_trait::async_trait;
use dashmap::DashMap;

/// A ledger held in a concurrent map keyed by row index.
///
/// Counts the writes each row receives, so tests can check that skipped rows
/// were never touched.
pub struct MemoryLedger {
    rows: DashMap<u32, Row>,
    writes: DashMap<u32, usize>,
    available: bool,
}

impl MemoryLedger {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.row_index, row)).collect(),
            writes: DashMap::new(),
            available: true,
        }
    }

    /// A ledger whose sheet cannot be found. Every call fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(vec![])
        }
    }

    pub fn row(&self, row_index: u32) -> Option<Row> {
        self.rows.get(&row_index).map(|entry| entry.clone())
    }

    pub fn writes_for(&self, row_index: u32) -> usize {
        self.writes.get(&row_index).map(|entry| *entry).unwrap_or(0)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.available {
            Ok(())
        } else {
            Err(PipelineError::SourceUnavailable(
                "sheet 'Ledger' not found".to_string(),
            ))
        }
    }

    fn last_index(&self) -> u32 {
        self.rows
            .iter()
            .map(|entry| *entry.key())
            .max()
            .unwrap_or(FIRST_DATA_ROW - 1)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn fetch_all(&self) -> Result<Vec<Row>, PipelineError> {
        self.check()?;
        let mut rows: Vec<Row> = self.rows.iter().map(|entry| entry.value().clone()).collect();
        rows.sort_by_key(|row| row.row_index);
        Ok(rows)
    }

    async fn update(&self, row_index: u32, patch: &RowPatch) -> Result<(), PipelineError> {
        self.check()?;
        self.rows
            .entry(row_index)
            .or_insert_with(|| Row::new(row_index))
            .apply(patch);
        *self.writes.entry(row_index).or_insert(0) += 1;
        Ok(())
    }

    async fn last_data_row(&self) -> Result<u32, PipelineError> {
        self.check()?;
        Ok(self.last_index())
    }

    async fn append(&self, row: &NewRow) -> Result<u32, PipelineError> {
        self.check()?;
        let row_index = self.last_index().max(FIRST_DATA_ROW - 1) + 1;
        let mut stored = Row::new(row_index);
        stored.timestamp = row.timestamp.clone();
        stored.slide_title = row.slide_title.clone();
        stored.slide_url = row.slide_url.clone();
        stored.slide_ref = Some(row.slide_ref.clone());
        self.rows.insert(row_index, stored);
        Ok(row_index)
    }
}
