pub mod chat;
pub mod cloudflare;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;

pub use chat::{ChatError, WorkersAiChatClient};
pub use cloudflare::CloudflareConfig;
pub use config::MtguruConfig;
pub use embeddings::{
    EmbeddingBackend, EmbeddingError, WorkersAiEmbeddingClient, BGE_BASE_DIMENSIONS,
};
pub use error::MtguruError;
pub use index::{IndexError, IndexMatch, UpsertAck, VectorEntry, VectorizeIndexClient};
