#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("unsupported connection url (expected sqlite:, postgres:, postgresql: or mysql:): {0}")]
    UnsupportedUrl(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
