//! Application layer: configuration, the natural-language query engine and the
//! [`KnowledgeBase`] facade that ties indexing, retrieval and querying to one
//! organization at a time.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod query;
pub mod secret;

pub use config::Config;
pub use error::{KnowledgeError, QueryError};
pub use knowledge::{IndexOptions, KnowledgeBase, RetrieveOverrides};
pub use query::{QueryEngine, QueryEngineConfig, QueryFailure, QueryRecord, QueryStage};
pub use secret::Secret;
