//! Card-description generation via a Workers AI chat model.
//!
//! The `/prompt` route feeds arbitrary card data through a fixed instruction
//! template and returns the model's one-phrase semantic description. The
//! description is later embedded alongside the card's rules text, so the
//! template asks for embedding-friendly output rather than prose.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cloudflare::{ApiEnvelope, CloudflareConfig};
use crate::config::ChatConfig;

pub const SEMANTIC_METADATA_PROMPT: &str = "In a phrase, semantically and accurately describe the effects and behaviours of this Magic: The Gathering card. Omit proper grammar in favour of a shorter response with clear meaning for a text-embedded vector db. Do not wrap it in speechmarks.";

pub const CHAT_SYSTEM_PERSONA: &str = "You are a Magic: The Gathering player who is prone to using both generic and magic-specific terminology";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Build the fixed message pair for card-description generation.
/// Double quotes in the serialized payload are swapped for single quotes so
/// the card JSON reads as plain text inside the instruction.
pub fn card_prompt_messages(payload: &serde_json::Value) -> Vec<ChatMessage> {
    let serialized = payload.to_string().replace('"', "'");
    vec![
        ChatMessage::system(CHAT_SYSTEM_PERSONA),
        ChatMessage::user(format!("{}{}", SEMANTIC_METADATA_PROMPT, serialized)),
    ]
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: i64, message: String },

    #[error("Missing response text in chat output")]
    MissingResponse,

    #[error("Missing API token")]
    MissingApiToken,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatOutput {
    response: Option<String>,
}

/// Workers AI chat client. One-shot per request — generation is not
/// idempotent, so unlike the embedding client there is no retry loop.
#[derive(Debug, Clone)]
pub struct WorkersAiChatClient {
    client: Client,
    cloudflare: CloudflareConfig,
    config: ChatConfig,
}

impl WorkersAiChatClient {
    pub fn new(cloudflare: CloudflareConfig, config: ChatConfig) -> Result<Self, ChatError> {
        if cloudflare.api_token.is_empty() {
            return Err(ChatError::MissingApiToken);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            cloudflare,
            config,
        })
    }

    /// Run the chat model and return its response text.
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let url = self.cloudflare.ai_run_url(&self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.cloudflare.api_token)
            .json(&ChatRequest { messages })
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) =
                match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&error_body) {
                    Ok(envelope) if !envelope.errors.is_empty() => envelope.first_error(),
                    _ => (i64::from(status.as_u16()), error_body),
                };

            tracing::error!(code = code, message = %message, "Workers AI chat error");

            return Err(ChatError::Api { code, message });
        }

        let envelope: ApiEnvelope<ChatOutput> = response.json().await?;

        if !envelope.success {
            let (code, message) = envelope.first_error();
            return Err(ChatError::Api { code, message });
        }

        envelope
            .result
            .and_then(|output| output.response)
            .ok_or(ChatError::MissingResponse)
    }
}
