use thiserror::Error;

#[derive(Error, Debug)]
pub enum MtguruError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),

    #[error("Vector index error: {0}")]
    Index(#[from] crate::index::IndexError),

    #[error("Prompt generation error: {0}")]
    Chat(#[from] crate::chat::ChatError),

    #[error("Other error: {0}")]
    Other(String),
}
