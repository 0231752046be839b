use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepairError>;

/// Errors that abort a run before its first state transition.
///
/// Failures inside an attempt never surface here; they become verdicts.
#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] mender_code_chunker::ChunkerError),

    #[error("Indexer error: {0}")]
    IndexerError(#[from] mender_indexer::IndexerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] mender_vector_store::VectorStoreError),

    #[error("Search error: {0}")]
    SearchError(#[from] mender_search::SearchError),

    #[error("{0}")]
    Other(String),
}

impl RepairError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
