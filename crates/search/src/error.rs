use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] mender_vector_store::VectorStoreError),

    #[error("Empty query")]
    EmptyQuery,

    #[error("Retrieval mode '{0}' needs a vector store")]
    MissingVectorStore(&'static str),

    #[error("Vector store already holds {0} chunks")]
    StoreNotEmpty(usize),

    #[error("Unknown retrieval mode '{0}' (expected lexical, semantic or hybrid)")]
    UnknownMode(String),
}
