// =============================================================================
// GEMINI TRANSPORT - one generateContent call per attempt
// =============================================================================
//
// The API key travels as the `key` query parameter. Retry decisions are not
// made here: every HTTP response, error statuses included, is handed back to
// the retrying generator as a `RemoteResponse`.
//
// **Environment Variables:**
// - `GEMINI_API_KEY` - API key from https://aistudio.google.com/apikey

use crate::core::generation::{GenerationRequest, GenerationTransport, RemoteResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;

const GEMINI_API: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// =============================================================================
// GEMINI API DATA STRUCTURES
// =============================================================================
//
// See: https://ai.google.dev/api/generate-content

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    /// Set on reasoning parts, which are never part of the answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
struct Content {
    #[serde(skip_serializing_if = "String::is_empty")]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

impl GenerateContentRequest {
    fn from_request(request: &GenerationRequest) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                    thought: None,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.config.temperature,
                max_output_tokens: request.config.max_output_tokens,
            },
        }
    }
}

/// Text of the first candidate, if the body is a success response with any.
fn extract_text(body: &str) -> Option<String> {
    let response: GenerateContentResponse = serde_json::from_str(body).ok()?;
    let candidate = response.candidates?.into_iter().next()?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter(|p| p.thought != Some(true))
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        tracing::warn!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            "Gemini candidate carried no text"
        );
        None
    } else {
        Some(text)
    }
}

pub struct GeminiTransport {
    client: Client,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl GenerationTransport for GeminiTransport {
    async fn send(
        &self,
        request: &GenerationRequest,
    ) -> Result<RemoteResponse, Box<dyn Error + Send + Sync>> {
        let url = format!("{}/{}:generateContent", GEMINI_API, request.config.model);
        let body = GenerateContentRequest::from_request(request);

        // Never log the key.
        tracing::debug!(
            model = %request.config.model,
            prompt_chars = request.prompt.len(),
            "Gemini request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(RemoteResponse {
            status,
            text: extract_text(&body),
            body,
        })
    }
}
