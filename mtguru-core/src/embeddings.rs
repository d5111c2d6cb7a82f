//! Embedding generation via Cloudflare Workers AI.
//!
//! Provides an `EmbeddingBackend` trait plus the `WorkersAiEmbeddingClient`
//! implementation that calls the hosted text-embedding model over REST. The
//! platform accepts a batch of texts and returns one vector per text, in
//! input order; callers that need a single vector take the first element.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::cloudflare::{ApiEnvelope, CloudflareConfig};
use crate::config::EmbeddingConfig;

/// Dimensions of the default `@cf/baai/bge-base-en-v1.5` model.
pub const BGE_BASE_DIMENSIONS: usize = 768;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts. Returns one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Returns the embedding dimension (e.g., 768).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: i64, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding data in response")]
    MissingEmbedding,

    #[error("Missing API token")]
    MissingApiToken,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Workers AI wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    data: Vec<Vec<f32>>,
}

// ============================================================================
// WorkersAiEmbeddingClient
// ============================================================================

/// Workers AI embedding client — calls the hosted text-embedding model.
#[derive(Debug, Clone)]
pub struct WorkersAiEmbeddingClient {
    client: Client,
    cloudflare: CloudflareConfig,
    config: EmbeddingConfig,
}

impl WorkersAiEmbeddingClient {
    pub fn new(
        cloudflare: CloudflareConfig,
        config: EmbeddingConfig,
    ) -> Result<Self, EmbeddingError> {
        if cloudflare.api_token.is_empty() {
            return Err(EmbeddingError::MissingApiToken);
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

    /// Generate embeddings for the given texts, retrying transient failures.
    pub async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.embed_once(texts)).await;

        match result {
            Ok(vectors) => Ok(vectors),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All embedding retry attempts failed"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = self.cloudflare.ai_run_url(&self.config.model);
        let request = EmbeddingRequest { text: texts };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.cloudflare.api_token)
            .json(&request)
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

            tracing::error!(code = code, message = %message, "Workers AI embedding error");

            return Err(EmbeddingError::Api { code, message });
        }

        let envelope: ApiEnvelope<EmbeddingData> = response.json().await?;

        if !envelope.success {
            let (code, message) = envelope.first_error();
            return Err(EmbeddingError::Api { code, message });
        }

        let data = envelope.result.ok_or(EmbeddingError::MissingEmbedding)?;

        if data.data.is_empty() {
            return Err(EmbeddingError::MissingEmbedding);
        }

        for vector in &data.data {
            if vector.len() != self.config.dimensions {
                return Err(EmbeddingError::InvalidDimensions {
                    expected: self.config.dimensions,
                    actual: vector.len(),
                });
            }
        }

        Ok(data.data)
    }
}

#[async_trait]
impl EmbeddingBackend for WorkersAiEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_raw(texts).await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "workers-ai"
    }
}

// ============================================================================
// TESTS
// ============================================================================
