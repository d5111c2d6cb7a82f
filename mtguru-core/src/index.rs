//! Vectorize index client — nearest-neighbor storage for card embeddings.
//!
//! Wraps the Vectorize v2 REST surface (upsert + query). Platform responses
//! are decoded into the crate's own types at this boundary; callers never see
//! the raw envelope, so the proxy's public contract survives upstream shape
//! changes.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::cloudflare::{ApiEnvelope, CloudflareConfig};
use crate::config::IndexConfig;
use crate::models::search::SearchFilters;

// ============================================================================
// Types
// ============================================================================

/// One index entry: identifier, vector values, and the metadata mapping
/// stored alongside them and returned verbatim on match.
#[derive(Debug, Clone, Serialize)]
pub struct VectorEntry {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Acknowledgment for an upsert batch.
#[derive(Debug, Clone)]
pub struct UpsertAck {
    pub mutation_id: String,
}

/// One nearest-neighbor match as decoded from the index.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: i64, message: String },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Missing result in index response")]
    MissingResult,

    #[error("Missing API token")]
    MissingApiToken,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: u32,
    return_values: bool,
    return_metadata: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UpsertResult {
    #[serde(rename = "mutationId")]
    mutation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f64,
    metadata: Option<serde_json::Value>,
}

// ============================================================================
// Metadata filter
// ============================================================================

/// Translate the structured search filters into a Vectorize metadata filter.
/// Empty fields are unconstrained; an entirely empty filter set yields `None`
/// so the query carries no `filter` key at all.
pub fn metadata_filter(filters: &SearchFilters) -> Option<serde_json::Value> {
    let mut clauses = serde_json::Map::new();

    if !filters.set_type.is_empty() {
        clauses.insert(
            "set_type".to_string(),
            serde_json::json!({ "$eq": filters.set_type }),
        );
    }
    if !filters.rarity.is_empty() {
        clauses.insert(
            "rarity".to_string(),
            serde_json::json!({ "$eq": filters.rarity }),
        );
    }
    if !filters.colors.is_empty() {
        clauses.insert(
            "colors".to_string(),
            serde_json::json!({ "$in": [filters.colors] }),
        );
    }

    if clauses.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(clauses))
    }
}

// ============================================================================
// VectorizeIndexClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct VectorizeIndexClient {
    client: Client,
    cloudflare: CloudflareConfig,
    config: IndexConfig,
}

impl VectorizeIndexClient {
    pub fn new(cloudflare: CloudflareConfig, config: IndexConfig) -> Result<Self, IndexError> {
        if cloudflare.api_token.is_empty() {
            return Err(IndexError::MissingApiToken);
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

    /// Configured top-K for nearest-neighbor queries.
    pub fn top_k(&self) -> u32 {
        self.config.top_k
    }

    /// Upsert a batch of entries. Entries sharing an id overwrite each other
    /// per the platform's last-write-wins semantics.
    pub async fn upsert(&self, entries: &[VectorEntry]) -> Result<UpsertAck, IndexError> {
        let body = Self::to_ndjson(entries)?;
        let retry_strategy = self.retry_strategy();

        let result = Retry::spawn(retry_strategy, || self.upsert_once(&body)).await;

        match result {
            Ok(ack) => Ok(ack),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All upsert retry attempts failed"
                );
                Err(IndexError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    /// Nearest-neighbor query: top-K matches with metadata included and
    /// vector values excluded.
    pub async fn query(
        &self,
        vector: &[f32],
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let retry_strategy = self.retry_strategy();

        let result =
            Retry::spawn(retry_strategy, || self.query_once(vector, filter.clone())).await;

        match result {
            Ok(matches) => Ok(matches),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All query retry attempts failed"
                );
                Err(IndexError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries)
    }

    /// Vectorize upserts take NDJSON, one entry object per line.
    fn to_ndjson(entries: &[VectorEntry]) -> Result<String, IndexError> {
        let mut body = String::new();
        for entry in entries {
            body.push_str(&serde_json::to_string(entry)?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn upsert_once(&self, ndjson: &str) -> Result<UpsertAck, IndexError> {
        let url = self.cloudflare.vectorize_url(&self.config.name, "upsert");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.cloudflare.api_token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(ndjson.to_string())
            .send()
            .await?;

        let envelope: ApiEnvelope<UpsertResult> = Self::decode(response).await?;
        let result = envelope.result.ok_or(IndexError::MissingResult)?;

        Ok(UpsertAck {
            mutation_id: result.mutation_id.unwrap_or_default(),
        })
    }

    async fn query_once(
        &self,
        vector: &[f32],
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let url = self.cloudflare.vectorize_url(&self.config.name, "query");

        let request = QueryRequest {
            vector,
            top_k: self.config.top_k,
            return_values: false,
            return_metadata: "all",
            filter,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.cloudflare.api_token)
            .json(&request)
            .send()
            .await?;

        let envelope: ApiEnvelope<QueryResult> = Self::decode(response).await?;
        let result = envelope.result.ok_or(IndexError::MissingResult)?;

        Ok(result
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, IndexError> {
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) =
                match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&error_body) {
                    Ok(envelope) if !envelope.errors.is_empty() => envelope.first_error(),
                    _ => (i64::from(status.as_u16()), error_body),
                };

            tracing::error!(code = code, message = %message, "Vectorize API error");

            return Err(IndexError::Api { code, message });
        }

        let envelope: ApiEnvelope<T> = response.json().await?;

        if !envelope.success {
            let (code, message) = envelope.first_error();
            return Err(IndexError::Api { code, message });
        }

        Ok(envelope)
    }
}

// ============================================================================
// TESTS
// ============================================================================
