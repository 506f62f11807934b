use serde::{Deserialize, Serialize};

/// Sampling settings sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.7,
            max_output_tokens: 8000,
        }
    }
}

/// One logical request to the generative endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub config: GenerationConfig,
}

/// What a single attempt produced, before any retry decision.
///
/// `text` is the extracted payload when the body was a well-formed success
/// response, whatever the status code said.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub text: Option<String>,
    pub body: String,
}

#[cfg(test)]
impl RemoteResponse {
    pub fn ok(text: &str) -> Self {
        Self {
            status: 200,
            text: Some(text.to_string()),
            body: String::new(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            text: None,
            body: body.to_string(),
        }
    }
}
