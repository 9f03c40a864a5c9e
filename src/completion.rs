//! Completion client adapter.
//!
//! The conversation orchestrator talks to the completion provider through
//! the [`Completer`] trait; the OpenAI chat-completions implementation
//! shares the embedding adapter's retry discipline. A turn fails as a whole
//! when the completion call fails; retries happen here, inside the
//! adapter, never by replaying the turn.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{Error, ProviderErrorKind, Result};

/// One message in a chat prompt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Run one chat completion and return the assistant's text.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Completion client for the OpenAI chat completions API.
pub struct OpenAiCompleter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiCompleter {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::provider(ProviderErrorKind::Auth, "OPENAI_API_KEY not set")
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::provider(ProviderErrorKind::Transient, e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            Error::provider(ProviderErrorKind::Transient, e.to_string())
                        })?;
                        return parse_completion_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = Error::provider_from_status(status, body_text);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(Error::provider(ProviderErrorKind::Transient, e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::provider(ProviderErrorKind::Transient, "completion failed after retries")
        }))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            Error::provider(
                ProviderErrorKind::InvalidRequest,
                "invalid completion response: missing choices[0].message.content",
            )
        })
}
