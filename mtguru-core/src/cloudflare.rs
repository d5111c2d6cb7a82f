//! Shared plumbing for the Cloudflare v4 REST API.
//!
//! Every account-scoped endpoint wraps its payload in the same envelope:
//! `{ "result": ..., "success": bool, "errors": [{code, message}] }`.
//! The Workers AI and Vectorize clients decode that envelope here and hand
//! their callers crate-owned types only — raw platform payloads never cross
//! this boundary.

use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Generic Cloudflare response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub result: Option<T>,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    pub code: i64,
    pub message: String,
}

impl<T> ApiEnvelope<T> {
    /// First error entry, or a placeholder when Cloudflare reports failure
    /// without populating `errors`.
    pub fn first_error(&self) -> (i64, String) {
        self.errors
            .first()
            .map(|e| (e.code, e.message.clone()))
            .unwrap_or((0, "upstream reported failure without detail".to_string()))
    }
}

/// Credentials and addressing for account-scoped REST calls.
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    pub api_base: String,
    pub account_id: String,
    pub api_token: String,
}

impl CloudflareConfig {
    /// Build runtime credentials from config values, falling back to the
    /// `CLOUDFLARE_API_TOKEN` environment variable for the token.
    pub fn new(
        api_base: impl Into<String>,
        account_id: impl Into<String>,
        api_token: Option<String>,
    ) -> Self {
        let api_token = api_token
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("CLOUDFLARE_API_TOKEN").ok())
            .unwrap_or_default();

        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_token,
        }
    }

    pub fn from_settings(settings: &crate::config::CloudflareSettings) -> Self {
        Self::new(
            settings.api_base.clone(),
            settings.account_id.clone(),
            Some(settings.api_token.clone()),
        )
    }

    /// URL for running a Workers AI model.
    pub fn ai_run_url(&self, model: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.api_base, self.account_id, model
        )
    }

    /// URL for a Vectorize v2 index operation (`upsert`, `query`, ...).
    pub fn vectorize_url(&self, index: &str, operation: &str) -> String {
        format!(
            "{}/accounts/{}/vectorize/v2/indexes/{}/{}",
            self.api_base, self.account_id, index, operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_run_url_includes_model_path() {
        let cf = CloudflareConfig::new(
            "https://api.example.com/client/v4",
            "acct-1",
            Some("token".to_string()),
        );
        assert_eq!(
            cf.ai_run_url("@cf/baai/bge-base-en-v1.5"),
            "https://api.example.com/client/v4/accounts/acct-1/ai/run/@cf/baai/bge-base-en-v1.5"
        );
    }

    #[test]
    fn test_vectorize_url() {
        let cf = CloudflareConfig::new("https://api.example.com/client/v4/", "acct-1", None);
        assert_eq!(
            cf.vectorize_url("mtguru-cards", "query"),
            "https://api.example.com/client/v4/accounts/acct-1/vectorize/v2/indexes/mtguru-cards/query"
        );
    }

    #[test]
    fn test_envelope_first_error_placeholder() {
        let env: ApiEnvelope<serde_json::Value> = serde_json::from_str(
            r#"{"result": null, "success": false, "errors": []}"#,
        )
        .unwrap();
        let (code, message) = env.first_error();
        assert_eq!(code, 0);
        assert!(message.contains("without detail"));
    }

    #[test]
    fn test_envelope_first_error_entry() {
        let env: ApiEnvelope<serde_json::Value> = serde_json::from_str(
            r#"{"result": null, "success": false, "errors": [{"code": 7003, "message": "no such index"}]}"#,
        )
        .unwrap();
        let (code, message) = env.first_error();
        assert_eq!(code, 7003);
        assert_eq!(message, "no such index");
    }
}
