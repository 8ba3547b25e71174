//! Per-organization vector collections.
//!
//! Every operation is addressed by a [`CollectionKey`] (organization plus collection
//! name) or an [`OrgId`]; no backend has a shared default collection. The persistent
//! layout lives under `{data_dir}/orgs/{org}/`.

pub mod error;
pub mod in_memory_store;
pub mod org;
pub mod org_config;
pub mod qdrant_store;
pub mod sqlite_store;
pub mod types;
pub mod vector_store;

pub use error::StoreError;
pub use in_memory_store::InMemoryVectorStore;
pub use org::{CollectionKey, DEFAULT_ORG, OrgId};
pub use org_config::{OrgConfig, OrgConfigStore};
pub use qdrant_store::QdrantVectorStore;
pub use sqlite_store::SqliteVectorStore;
pub use types::{
    ChunkMetadata, CollectionStats, ContentKind, NewChunk, ReplaceOutcome, StoredChunk,
    StoredMatch,
};
pub use vector_store::VectorStore;
