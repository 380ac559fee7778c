use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Wraps a database-layer failure, keeping the full context chain
    #[inline]
    pub fn database(error: &anyhow::Error) -> Self {
        Self::Database(format!("{:#}", error))
    }

    /// Wraps an embedding or generation service failure
    #[inline]
    pub fn upstream(error: &anyhow::Error) -> Self {
        Self::Upstream(format!("{:#}", error))
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod registry;
pub mod search;
pub mod server;
pub mod synthesis;
pub mod text;
