//! Gemini client and detection review dispatcher
//!
//! # Features
//! - `generateContent` calls against the Gemini API (or any compatible root)
//! - Per-call credentials: the key is passed in, never stored on the client
//! - Error classification into authentication, rate limit, network and
//!   remote-service failures
//! - The [`Dispatcher`] that turns a detection rule into feedback

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use async_trait::async_trait;
use detection_core::{Credential, DetectionError, RedactionEngine, Result};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

pub mod classify;
pub mod dispatch;
pub mod endpoint;
pub mod prompts;

pub use dispatch::*;
pub use endpoint::*;
pub use prompts::*;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Request timeout used when the caller does not set one
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Something that turns a prompt into text
///
/// Implemented by [`GeminiClient`]; tests substitute their own.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model id requests are sent to
    fn model(&self) -> &str;

    /// Send `prompt` once, authenticated with `credential`
    async fn generate(&self, credential: &Credential, prompt: &str) -> Result<Completion>;
}

/// Text returned by a single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Concatenated text parts of the first candidate, untrimmed
    pub text: String,
    /// Token accounting, when the service reports it
    pub usage: Option<TokenUsage>,
    /// Why generation stopped (e.g. `STOP`, `MAX_TOKENS`)
    pub finish_reason: Option<String>,
}

/// Token counts for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the response
    pub response_tokens: u32,
    /// Total tokens billed
    pub total_tokens: u32,
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root (e.g. "https://generativelanguage.googleapis.com/v1beta")
    pub base_url: String,
    /// Model id
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}


/// `generateContent` request body
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    /// Conversation turns; always a single user turn here
    pub contents: Vec<Content>,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part; only text parts are used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// `generateContent` response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Present when the prompt itself was blocked
    pub prompt_feedback: Option<PromptFeedback>,
    /// Token usage statistics
    pub usage_metadata: Option<UsageMetadata>,
}

/// Generated candidate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content
    pub content: Option<Content>,
    /// Reason for finishing (e.g. "STOP", "SAFETY")
    pub finish_reason: Option<String>,
}

/// Prompt-level safety feedback
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Why the prompt was blocked
    pub block_reason: Option<String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Tokens across all candidates
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Total tokens used
    #[serde(default)]
    pub total_token_count: u32,
}

impl GenerateContentResponse {
    /// Pull the first candidate's text out, or explain why there is none
    fn into_completion(self) -> Result<Completion> {
        let usage = self.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            response_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = self.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());

        let text: String = candidate
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            let detail = match (block_reason, &finish_reason) {
                (Some(reason), _) => format!("the prompt was blocked ({reason})"),
                (None, Some(reason)) => format!("the response contained no text ({reason})"),
                (None, None) => "the response contained no text".to_string(),
            };
            return Err(DetectionError::RemoteService {
                status: Some(200),
                detail,
            });
        }

        Ok(Completion {
            text,
            usage,
            finish_reason,
        })
    }
}

/// Gemini `generateContent` client
///
/// Holds no credential; each call receives one.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    model: String,
    http: reqwest::Client,
    redaction: RedactionEngine,
}

impl GeminiClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = sanitize_base_url(&config.base_url)?;
        let model = normalize_model(&config.model)?;

        info!(
            "Creating Gemini client for host: {}",
            base_url.host_str().unwrap_or("unknown")
        );

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|_| DetectionError::Network("could not initialise the HTTP client".to_string()))?;

        Ok(Self {
            base_url,
            model,
            http,
            redaction: RedactionEngine::new(),
        })
    }

    /// Normalized API root
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build request headers
    fn build_headers(&self, credential: &Credential) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        // shape validation already restricts the key to header-safe characters
        let mut key = HeaderValue::from_str(credential.expose_secret())
            .map_err(|_| DetectionError::Authentication)?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key);

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Ok(headers)
    }

    /// Send a single `generateContent` request
    #[instrument(skip(self, credential, prompt), fields(model = %self.model))]
    pub async fn generate_content(
        &self,
        credential: &Credential,
        prompt: &str,
    ) -> Result<Completion> {
        let url = generate_content_url(&self.base_url, &self.model);
        let headers = self.build_headers(credential)?;
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        debug!(prompt_chars = prompt.len(), "Sending generateContent request to {}", url);

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                debug!(timeout = e.is_timeout(), connect = e.is_connect(), "Request failed");
                classify::transport_error(&e)
            })?;

        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(|e| classify::transport_error(&e))?;
            let parsed: GenerateContentResponse =
                serde_json::from_str(&body).map_err(|_| DetectionError::RemoteService {
                    status: Some(status.as_u16()),
                    detail: "the response could not be decoded".to_string(),
                })?;
            let completion = parsed.into_completion()?;
            info!(
                "Generation successful: {} tokens used",
                completion.usage.map(|u| u.total_tokens).unwrap_or(0)
            );
            Ok(completion)
        } else {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            // full body stays in the debug log, after redaction
            debug!("API error ({}): {}", status, self.redaction.redact(&body));

            let err = classify::status_error(status, retry_after.as_deref(), &body);
            info!(%status, "Remote service returned an error");
            Err(err)
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, credential: &Credential, prompt: &str) -> Result<Completion> {
        self.generate_content(credential, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn new_rejects_bad_model() {
        let config = ClientConfig {
            model: "../../admin".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            GeminiClient::new(config),
            Err(DetectionError::InvalidModel(_))
        ));
    }

    #[test]
    fn request_serializes_single_user_turn() -> anyhow::Result<()> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some("hello".to_string()),
                }],
            }],
        };
        let json = serde_json::to_value(&request)?;
        assert_eq!(
            json,
            serde_json::json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]})
        );
        Ok(())
    }

    #[test]
    fn completion_joins_text_parts_and_reads_usage() -> anyhow::Result<()> {
        let body = r#"{
          "candidates": [{
            "content": {"role": "model", "parts": [{"text": "1. Add "}, {"text": "coverage."}]},
            "finishReason": "STOP"
          }],
          "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 40, "totalTokenCount": 160}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body)?;
        let completion = parsed.into_completion()?;
        assert_eq!(completion.text, "1. Add coverage.");
        assert_eq!(completion.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                prompt_tokens: 120,
                response_tokens: 40,
                total_tokens: 160
            })
        );
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_remote_service_error() -> anyhow::Result<()> {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body)?;
        match parsed.into_completion() {
            Err(DetectionError::RemoteService { detail, .. }) => {
                assert!(detail.contains("SAFETY"));
            }
            other => panic!("expected remote service error, got {other:?}"),
        }
        Ok(())
    }
}
