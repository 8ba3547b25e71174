//! Indexing and retrieval pipeline.
//!
//! Write path: [`loader`] extracts text, [`chunker`] splits it into overlapping word
//! windows, an [`embedder::Embedder`] maps chunks to vectors, and
//! [`indexer::DocumentIndexer`] swaps them into a collection keyed by document
//! identity. [`schema_indexer::SchemaIndexer`] feeds rendered database schemas
//! through the same path.
//!
//! Read path: [`retriever::Retriever`] searches an organization's collections,
//! applies the similarity threshold and reranks; [`context::build_context`] turns the
//! result into a cited prompt block.

pub mod chunker;
pub mod context;
pub mod document;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod loader;
pub mod rerank;
pub mod retriever;
pub mod schema_indexer;
pub mod schema_render;

pub use chunker::{Chunker, ChunkerConfig};
pub use context::{BuiltContext, build_context, estimate_tokens};
pub use document::Document;
pub use embedder::{Embedder, ProviderEmbedder};
pub use error::IndexError;
pub use indexer::{DocumentIndexer, DocumentOutcome, IndexStats, IndexerConfig};
pub use loader::ContentHint;
pub use rerank::{LexicalOverlapReranker, Reranker};
pub use retriever::{CollectionSelection, Retrieval, RetrievalResult, RetrieveOptions, Retriever};
pub use schema_indexer::{SchemaIndexOptions, SchemaIndexStats, SchemaIndexer, TableSelection};
