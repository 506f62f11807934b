// The infra module contains implementations of core traits.

#[path = "gemini/gemini_transport.rs"]
pub mod gemini;

#[path = "google/mod.rs"]
pub mod google;

#[cfg(test)]
#[path = "memory/mod.rs"]
pub mod memory;
