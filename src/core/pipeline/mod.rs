// The editorial pipeline: ledger rows, the stages that advance them, and the
// reconciler that drives each stage over the ledger.

pub mod folder_stages;
pub mod pipeline_config;
pub mod pipeline_models;
pub mod pipeline_ports;
pub mod pipeline_runner;
pub mod reconciler;
pub mod row_stages;
pub mod run_report;

pub use pipeline_config::PipelineConfig;
pub use pipeline_models::{
    non_empty, DocumentHandle, FileInfo, FolderInfo, NewRow, Row, RowPatch, RowStatus, SlideContent,
    FIRST_DATA_ROW,
};
pub use pipeline_ports::{DocumentStore, FileStore, Ledger, PipelineError, PresentationStore};
pub use pipeline_runner::run_pipeline;
pub use reconciler::PipelineContext;
