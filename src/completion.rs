//! Remote completion capability.
//!
//! Defines the [`CompletionProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: always fails; used when `completion.provider = "disabled"`.
//! - **[`OpenAiProvider`]**: calls the OpenAI-compatible `POST /chat/completions` endpoint.
//!
//! Each turn makes exactly one request. There is no retry or backoff; any
//! provider-level failure (auth, rate limit, network, malformed body) comes
//! back as a [`CompletionError`] and the session decides what to do with it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::{CompletionError, ConfigError};
use crate::session::{Message, Role};

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    /// Send the full ordered message log and return the assistant reply.
    async fn complete(&self, messages: &[Message]) -> Result<Message, CompletionError>;
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[Message]) -> Result<Message, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

// ============ OpenAI Provider ============

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default = "assistant_role")]
    role: Role,
    #[serde(default)]
    content: Option<String>,
}

fn assistant_role() -> Role {
    Role::Assistant
}

impl OpenAiProvider {
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::Missing("completion API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Message, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        parse_chat_response(&text)
    }
}

/// Extract `choices[0].message` from a chat-completions response body.
fn parse_chat_response(body: &str) -> Result<Message, CompletionError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".to_string()))?;
    let content = choice
        .message
        .content
        .ok_or_else(|| CompletionError::InvalidResponse("reply has no content".to_string()))?;
    Ok(Message {
        role: choice.message.role,
        content,
    })
}

/// Create the configured provider.
///
/// `api_key` is required for `openai`; its absence is a configuration error so
/// a session never starts without a usable credential.
pub fn create_provider(
    config: &CompletionConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn CompletionProvider>, ConfigError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => {
            let key = api_key.ok_or_else(|| {
                ConfigError::Missing(format!(
                    "no API key for provider 'openai' (set {} or secrets completion.api_key)",
                    config.api_key_env
                ))
            })?;
            Ok(Arc::new(OpenAiProvider::new(config, key)?))
        }
        other => Err(ConfigError::Invalid(format!(
            "Unknown completion provider: {}",
            other
        ))),
    }
}
