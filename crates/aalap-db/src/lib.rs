//! Relational database access for schema indexing and query execution.
//!
//! A [`DatabaseConnection`] is session-scoped: it is never persisted, and the
//! credentials in its [`ConnectionSpec`] only live in memory.

pub mod connection;
pub mod error;
mod introspect;
pub mod rows;
pub mod schema;

pub use connection::{ConnectionSpec, DatabaseConnection, DatabaseKind};
pub use error::DbError;
pub use rows::QueryRows;
pub use schema::{ColumnInfo, ForeignKey, IndexInfo, TableSchema};
