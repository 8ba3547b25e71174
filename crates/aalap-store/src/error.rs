#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Invalid organization/collection name or out-of-range configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A read resolved to data outside the requested organization or collection.
    #[error("isolation violation: requested {requested}, got {actual}")]
    IsolationViolation { requested: String, actual: String },

    #[error("vector dimension mismatch in {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
