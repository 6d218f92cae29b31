//! Minimal client for the Gemini `generateContent` endpoint.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Failed to reach Gemini: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Gemini API error")]
    Status { status: u16, body: String },
    #[error("Failed to decode Gemini response: {0}")]
    Decode(String),
    #[error("No candidates in Gemini response")]
    NoCandidates,
    #[error("No content in Gemini response")]
    NoContent,
    #[error("No parts in Gemini response")]
    NoParts,
    #[error("No text in Gemini response")]
    NoText,
}

impl From<GeminiError> for AppError {
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::Status { status, body } => AppError::Provider {
                message: "Gemini API error".to_string(),
                status,
                body,
            },
            other => AppError::Upstream(other.to_string()),
        }
    }
}

/// Sampling settings sent as `generationConfig`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    /// Structured itinerary output.
    pub const PLAN: GenerationConfig = GenerationConfig {
        temperature: 0.6,
        top_k: 40,
        top_p: 0.9,
        max_output_tokens: 8192,
    };

    /// Free-form prose.
    pub const BLOG: GenerationConfig = GenerationConfig {
        temperature: 0.75,
        top_k: 40,
        top_p: 0.95,
        max_output_tokens: 2048,
    };
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(http: Client, config: &GeminiConfig) -> Self {
        GeminiClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Sends one prompt and returns the text of the first candidate's first part.
    pub async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, GeminiError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": config,
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "calling Gemini");
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gemini returned an error");
            return Err(GeminiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GeminiError::Decode(e.to_string()))?;
        first_text(&payload)
    }
}

fn first_text(payload: &Value) -> Result<String, GeminiError> {
    let candidate = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .ok_or(GeminiError::NoCandidates)?;

    let content = candidate.get("content").ok_or(GeminiError::NoContent)?;

    let part = content
        .get("parts")
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .ok_or(GeminiError::NoParts)?;

    part.get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(GeminiError::NoText)
}

/// Removes a surrounding ```json ... ``` fence, if the model added one.
pub fn strip_json_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}
