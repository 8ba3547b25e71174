use aalap_db::DbError;
use aalap_index::IndexError;
use aalap_llm::LlmError;

/// Why a natural-language query stopped.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no schema context found in collection {collection}; index the database first")]
    NoSchemaContext { collection: String },

    #[error("the model did not produce a usable query")]
    QuerySynthesisFailed,

    #[error("query execution failed: {message}")]
    QueryExecutionFailed { message: String },

    #[error("completion service error: {0}")]
    Service(#[from] LlmError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
}

impl From<DbError> for QueryError {
    fn from(e: DbError) -> Self {
        Self::QueryExecutionFailed {
            message: e.to_string(),
        }
    }
}

/// Errors from the [`KnowledgeBase`](crate::KnowledgeBase) facade outside the query path.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] aalap_store::StoreError),

    #[error(transparent)]
    Database(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;
