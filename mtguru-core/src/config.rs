use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct MtguruConfig {
    pub service: ServiceConfig,
    pub cloudflare: CloudflareSettings,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

/// Cloudflare account addressing. The API token is usually supplied via the
/// `CLOUDFLARE_API_TOKEN` environment variable rather than the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct CloudflareSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub account_id: String,
    #[serde(default)]
    pub api_token: String,
}

fn default_api_base() -> String {
    crate::cloudflare::DEFAULT_API_BASE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origin: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            allowed_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "@cf/baai/bge-base-en-v1.5".to_string(),
            dimensions: crate::embeddings::BGE_BASE_DIMENSIONS,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "@cf/meta/llama-4-scout-17b-16e-instruct".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub name: String,
    pub top_k: u32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: "mtguru-cards".to_string(),
            top_k: 3,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 30,
        }
    }
}

impl MtguruConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder().add_source(File::with_name(path)).build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_defaults_match_bge_base() {
        let c = EmbeddingConfig::default();
        assert_eq!(c.model, "@cf/baai/bge-base-en-v1.5");
        assert_eq!(c.dimensions, 768);
        assert_eq!(c.max_retries, 3);
    }

    #[test]
    fn test_index_defaults_top_k_is_three() {
        let c = IndexConfig::default();
        assert_eq!(c.top_k, 3);
        assert_eq!(c.name, "mtguru-cards");
    }

    #[test]
    fn test_http_defaults() {
        let c = HttpConfig::default();
        assert_eq!(c.port, 8787);
        assert_eq!(c.allowed_origin, "*");
    }
}
