// Configuration for one pipeline run.
//
// Built once at startup and passed down by reference. Problems are collected
// rather than reported one at a time, so a broken `.env` is fixed in one go.

use super::pipeline_models::StageKey;
use super::pipeline_ports::{FileStore, Ledger, PipelineError};
use crate::core::generation::{GenerationConfig, RetryPolicy};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const API_KEY_PLACEHOLDER: &str = "YOUR_GEMINI_API_KEY";

/// Drive folders each stage reads from or moves into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderIds {
    /// New decks land here after leaving the root folder.
    pub slide_storage: String,
    /// Scripts whose notes were imported.
    pub used_docs: String,
    /// Decks that have a script.
    pub scripted_slides: String,
    /// Generated blog articles waiting to be posted.
    pub unposted_blog: String,
    /// Where new documents are created. `None` means the store's root folder.
    pub output_root: Option<String>,
}

impl FolderIds {
    /// Every configured folder with the variable it came from.
    pub fn named(&self) -> Vec<(&'static str, &str)> {
        let mut folders = vec![
            ("PIPELINE_FOLDER_SLIDE_STORAGE", self.slide_storage.as_str()),
            ("PIPELINE_FOLDER_USED_DOCS", self.used_docs.as_str()),
            ("PIPELINE_FOLDER_SCRIPTED_SLIDES", self.scripted_slides.as_str()),
            ("PIPELINE_FOLDER_UNPOSTED_BLOG", self.unposted_blog.as_str()),
        ];
        if let Some(root) = &self.output_root {
            folders.push(("PIPELINE_FOLDER_OUTPUT_ROOT", root.as_str()));
        }
        folders
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub spreadsheet_id: String,
    /// `None` selects the first sheet.
    pub sheet_name: Option<String>,
    pub api_key: String,
    pub generation: GenerationConfig,
    pub folders: FolderIds,
    pub retry: RetryPolicy,
    /// Minimum pause after each row of a generative stage.
    pub api_call_delay: Duration,
    pub stage_delay: Duration,
    /// Rows processed per generative stage run. 0 means no limit.
    pub batch_size: usize,
    pub force_overwrite: bool,
    pub persist_processing: bool,
    pub stages: Vec<StageKey>,
    pub notes_prompt_file: Option<PathBuf>,
    pub blog_prompt_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: None,
            api_key: String::new(),
            generation: GenerationConfig::default(),
            folders: FolderIds::default(),
            retry: RetryPolicy::default(),
            api_call_delay: Duration::from_millis(2000),
            stage_delay: Duration::from_millis(1000),
            batch_size: 10,
            force_overwrite: false,
            persist_processing: true,
            stages: StageKey::ALL.to_vec(),
            notes_prompt_file: None,
            blog_prompt_file: None,
        }
    }
}

impl PipelineConfig {
    /// Reads the process environment. Call `dotenv` first if a `.env` should count.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and statically validates a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut errors = Vec::new();
        let defaults = Self::default();

        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| text(key).unwrap_or_default();

        let folders = FolderIds {
            slide_storage: required("PIPELINE_FOLDER_SLIDE_STORAGE"),
            used_docs: required("PIPELINE_FOLDER_USED_DOCS"),
            scripted_slides: required("PIPELINE_FOLDER_SCRIPTED_SLIDES"),
            unposted_blog: required("PIPELINE_FOLDER_UNPOSTED_BLOG"),
            output_root: text("PIPELINE_FOLDER_OUTPUT_ROOT"),
        };

        let generation = GenerationConfig {
            model: text("GEMINI_MODEL").unwrap_or(defaults.generation.model),
            temperature: parsed(
                text("GEMINI_TEMPERATURE"),
                "GEMINI_TEMPERATURE",
                defaults.generation.temperature,
                &mut errors,
            ),
            max_output_tokens: parsed(
                text("GEMINI_MAX_OUTPUT_TOKENS"),
                "GEMINI_MAX_OUTPUT_TOKENS",
                defaults.generation.max_output_tokens,
                &mut errors,
            ),
        };

        let retry_count: u32 = parsed(
            text("PIPELINE_RETRY_COUNT"),
            "PIPELINE_RETRY_COUNT",
            defaults.retry.max_attempts,
            &mut errors,
        );
        if retry_count == 0 {
            errors.push("PIPELINE_RETRY_COUNT must be at least 1".to_string());
        }
        let retry_delay = millis(
            text("PIPELINE_RETRY_DELAY_MS"),
            "PIPELINE_RETRY_DELAY_MS",
            defaults.retry.base_delay,
            &mut errors,
        );

        let stages = match text("PIPELINE_STAGES") {
            None => defaults.stages,
            Some(list) => {
                let mut stages = Vec::new();
                for key in list.split(',').filter(|k| !k.trim().is_empty()) {
                    match StageKey::parse(key) {
                        Some(stage) => stages.push(stage),
                        None => errors.push(format!("Unknown stage in PIPELINE_STAGES: {}", key.trim())),
                    }
                }
                // Execution order is fixed no matter how the list was written.
                StageKey::ALL
                    .into_iter()
                    .filter(|k| stages.contains(k))
                    .collect()
            }
        };

        let config = Self {
            spreadsheet_id: required("PIPELINE_SPREADSHEET_ID"),
            sheet_name: text("PIPELINE_SHEET_NAME"),
            api_key: required("GEMINI_API_KEY"),
            generation,
            folders,
            retry: RetryPolicy::new(retry_count, retry_delay),
            api_call_delay: millis(
                text("PIPELINE_API_CALL_DELAY_MS"),
                "PIPELINE_API_CALL_DELAY_MS",
                defaults.api_call_delay,
                &mut errors,
            ),
            stage_delay: millis(
                text("PIPELINE_STAGE_DELAY_MS"),
                "PIPELINE_STAGE_DELAY_MS",
                defaults.stage_delay,
                &mut errors,
            ),
            batch_size: parsed(
                text("PIPELINE_BATCH_SIZE"),
                "PIPELINE_BATCH_SIZE",
                defaults.batch_size,
                &mut errors,
            ),
            force_overwrite: parsed(
                text("PIPELINE_FORCE_OVERWRITE"),
                "PIPELINE_FORCE_OVERWRITE",
                defaults.force_overwrite,
                &mut errors,
            ),
            persist_processing: parsed(
                text("PIPELINE_PERSIST_PROCESSING"),
                "PIPELINE_PERSIST_PROCESSING",
                defaults.persist_processing,
                &mut errors,
            ),
            stages,
            notes_prompt_file: text("PIPELINE_NOTES_PROMPT_FILE").map(PathBuf::from),
            blog_prompt_file: text("PIPELINE_BLOG_PROMPT_FILE").map(PathBuf::from),
        };

        errors.extend(config.problems());
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(PipelineError::ConfigInvalid(errors))
        }
    }

    /// Static checks: credentials and ids present, no placeholder key.
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let required = [
            ("PIPELINE_SPREADSHEET_ID", self.spreadsheet_id.as_str()),
            ("GEMINI_API_KEY", self.api_key.as_str()),
            ("PIPELINE_FOLDER_SLIDE_STORAGE", self.folders.slide_storage.as_str()),
            ("PIPELINE_FOLDER_USED_DOCS", self.folders.used_docs.as_str()),
            ("PIPELINE_FOLDER_SCRIPTED_SLIDES", self.folders.scripted_slides.as_str()),
            ("PIPELINE_FOLDER_UNPOSTED_BLOG", self.folders.unposted_blog.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("{} is not set", key));
            }
        }

        if self.api_key == API_KEY_PLACEHOLDER {
            problems.push("GEMINI_API_KEY still holds the placeholder value".to_string());
        }

        problems
    }

    /// Checks that the ledger and every configured folder can be reached.
    pub async fn validate_reachability(
        &self,
        ledger: &dyn Ledger,
        files: &dyn FileStore,
    ) -> Result<(), PipelineError> {
        let mut errors = Vec::new();

        if let Err(e) = ledger.last_data_row().await {
            errors.push(format!(
                "Ledger {} is not reachable: {}",
                self.spreadsheet_id, e
            ));
        }

        for (name, folder_id) in self.folders.named() {
            if let Err(e) = files.get_folder(folder_id).await {
                errors.push(format!("Folder {} ({}) is not reachable: {}", name, folder_id, e));
            }
        }

        if errors.is_empty() {
            tracing::info!("Configuration validated");
            Ok(())
        } else {
            Err(PipelineError::ConfigInvalid(errors))
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>, key: &str, default: T, errors: &mut Vec<String>) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            errors.push(format!("{} has an invalid value: {}", key, raw));
            default
        }),
    }
}

fn millis(value: Option<String>, key: &str, default: Duration, errors: &mut Vec<String>) -> Duration {
    let default_ms = default.as_millis() as u64;
    Duration::from_millis(parsed(value, key, default_ms, errors))
}
