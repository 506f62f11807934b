pub mod generation_models;
pub mod prompts;
pub mod retrying_generator;
pub mod speaker_notes;

pub use generation_models::{GenerationConfig, GenerationRequest, RemoteResponse};
pub use prompts::{PromptTemplates, ScriptInput};
pub use retrying_generator::{GenerationTransport, RetryPolicy, RetryingGenerator, TextGenerator};
pub use speaker_notes::parse_note_sections;
