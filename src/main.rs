// This is the entry point of the deck pipeline.
//
// **Architecture Overview:**
// - `core/` = Business logic (ledger model, reconciler, stages, retry wrapper)
// - `infra/` = Implementations of core traits (Google Workspace APIs, Gemini)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize collaborators (dependency injection)
// 3. Validate that everything configured can be reached
// 4. Run the selected stages in order

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::generation::{PromptTemplates, RetryingGenerator};
use crate::core::pipeline::{run_pipeline, PipelineConfig, PipelineContext};
use crate::infra::gemini::GeminiTransport;
use crate::infra::google::{
    DocsDocumentStore, DriveFileStore, GoogleApiClient, ServiceAccountAuth, SheetsLedger,
    SlidesPresentationStore, PIPELINE_SCOPES,
};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    let prompts = PromptTemplates::load(
        config.notes_prompt_file.as_deref(),
        config.blog_prompt_file.as_deref(),
    )
    .await
    .context("Failed to load prompt templates")?;

    let auth = ServiceAccountAuth::from_env(PIPELINE_SCOPES)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load service account credentials: {}", e))?;
    tracing::info!(account = auth.client_email(), "Using service account");

    // All Google stores share one client, and with it one cached token.
    let api = GoogleApiClient::new(auth);
    let ledger = SheetsLedger::new(api.clone(), &config.spreadsheet_id, config.sheet_name.clone());
    let files = DriveFileStore::new(api.clone());
    let documents = DocsDocumentStore::new(api.clone());
    let presentations = SlidesPresentationStore::new(api);

    let generator = RetryingGenerator::new(
        GeminiTransport::new(config.api_key.clone()),
        config.retry,
        config.generation.clone(),
    );

    config
        .validate_reachability(&ledger, &files)
        .await
        .context("Configured ledger or folders are not reachable")?;

    let ctx = PipelineContext {
        config: &config,
        ledger: &ledger,
        files: &files,
        documents: &documents,
        presentations: &presentations,
        generator: &generator,
        prompts: &prompts,
    };

    tracing::info!(
        stages = config.stages.len(),
        model = %config.generation.model,
        "Starting pipeline"
    );
    let report = run_pipeline(&ctx).await.context("Pipeline aborted")?;

    if report.total_errors() > 0 {
        tracing::warn!(
            errors = report.total_errors(),
            "Some items failed; see the ledger's error column"
        );
    }

    Ok(())
}
