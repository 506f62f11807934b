// The core module contains all business logic.
// Nothing in here talks HTTP: collaborators are reached through the traits
// in `pipeline::pipeline_ports`.

#[path = "generation/mod.rs"]
pub mod generation;

#[path = "markdown/markdown_blocks.rs"]
pub mod markdown;

#[path = "pipeline/mod.rs"]
pub mod pipeline;
