//! Error types for aalap-index.

/// Errors raised while extracting, chunking, embedding, indexing or retrieving.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Invalid chunking parameters, names or options. Raised before any write.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported content: {0}")]
    Unsupported(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "pdf")]
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    /// Embedding service failure, including timeouts.
    #[error("embedding failed: {0}")]
    Embedding(#[from] aalap_llm::LlmError),

    #[error("embedding dimension changed: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("store error: {0}")]
    Store(#[from] aalap_store::StoreError),

    #[error("database error: {0}")]
    Database(#[from] aalap_db::DbError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IndexError {
    /// True for organization-isolation breaches, which callers must never mask.
    #[must_use]
    pub fn is_isolation_violation(&self) -> bool {
        matches!(
            self,
            Self::Store(aalap_store::StoreError::IsolationViolation { .. })
        )
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
