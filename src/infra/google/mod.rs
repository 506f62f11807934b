// Google Workspace implementations of the pipeline ports.
// One authenticated client is shared by all four stores.

pub mod docs_document_store;
pub mod drive_file_store;
pub mod google_api_client;
pub mod service_account;
pub mod sheets_ledger;
pub mod slides_presentation_store;

pub use docs_document_store::DocsDocumentStore;
pub use drive_file_store::DriveFileStore;
pub use google_api_client::GoogleApiClient;
pub use service_account::{ServiceAccountAuth, PIPELINE_SCOPES};
pub use sheets_ledger::SheetsLedger;
pub use slides_presentation_store::SlidesPresentationStore;
