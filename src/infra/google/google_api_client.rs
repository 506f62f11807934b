// Authenticated JSON requests against the Google REST APIs.
// Every store in this module shares one client; the token cache lives in the
// service account authenticator.

use super::service_account::ServiceAccountAuth;
use crate::core::pipeline::PipelineError;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GoogleApiError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GoogleApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GoogleApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<GoogleApiError> for PipelineError {
    fn from(err: GoogleApiError) -> Self {
        PipelineError::Collaborator(err.to_string())
    }
}

/// Error envelope shared by the Google APIs.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pulls the human-readable message out of an error body, if it has one.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Clone)]
pub struct GoogleApiClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
}

impl GoogleApiClient {
    pub fn new(auth: ServiceAccountAuth) -> Self {
        Self {
            client: Client::new(),
            auth: Arc::new(auth),
        }
    }

    pub fn url(base: &str, segments: &[&str]) -> Result<Url, GoogleApiError> {
        let mut url = Url::parse(base).map_err(|e| GoogleApiError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GoogleApiError::Decode(format!("{} cannot take path segments", base)))?
            .extend(segments);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, GoogleApiError> {
        self.send::<T, ()>(Method::GET, url, query, None).await
    }

    pub async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, GoogleApiError> {
        self.send(method, url, query, Some(body)).await
    }

    async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, GoogleApiError> {
        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|e| GoogleApiError::Auth(e.to_string()))?;

        tracing::debug!(method = %method, path = url.path(), "Google API request");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(GoogleApiError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| GoogleApiError::Decode(e.to_string()))
    }
}
