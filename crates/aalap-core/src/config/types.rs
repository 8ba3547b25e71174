use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secret::Secret;

/// Completion and embedding backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    #[cfg(feature = "mock")]
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            #[cfg(feature = "mock")]
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where vector collections are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
    Qdrant,
}

impl StorageBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
            Self::Qdrant => "qdrant",
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama3.1:8b".into()
}

pub(crate) fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./.aalap")
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root of the per-organization layout (`orgs/{org}/config.toml`, `vectors.db`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

fn default_concurrency() -> usize {
    aalap_index::indexer::DEFAULT_CONCURRENCY
}

fn default_max_file_size() -> u64 {
    aalap_index::loader::DEFAULT_MAX_FILE_SIZE
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Bytes; larger files are reported as errors instead of being read.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_schema_collection() -> String {
    aalap_index::schema_indexer::DEFAULT_SCHEMA_COLLECTION.into()
}

fn default_row_display_cap() -> usize {
    20
}

fn default_summary_sample_rows() -> usize {
    100
}

fn default_schema_context_tokens() -> usize {
    4000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_schema_collection")]
    pub schema_collection: String,
    /// Rows kept on a [`QueryRecord`](crate::query::QueryRecord); every row is still
    /// counted.
    #[serde(default = "default_row_display_cap")]
    pub row_display_cap: usize,
    /// Rows shown to the model when summarizing.
    #[serde(default = "default_summary_sample_rows")]
    pub summary_sample_rows: usize,
    /// Token budget for the schema context handed to query synthesis.
    #[serde(default = "default_schema_context_tokens")]
    pub schema_context_tokens: usize,
    #[serde(default)]
    pub allow_writes: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            schema_collection: default_schema_collection(),
            row_display_cap: default_row_display_cap(),
            summary_sample_rows: default_summary_sample_rows(),
            schema_context_tokens: default_schema_context_tokens(),
            allow_writes: false,
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            embedding_seconds: default_embedding_timeout(),
        }
    }
}

fn default_org() -> String {
    aalap_store::DEFAULT_ORG.into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultsConfig {
    /// Organization used when a command does not name one.
    #[serde(default = "default_org")]
    pub org: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { org: default_org() }
    }
}

/// Values that only ever come from the environment and are never serialized.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    pub api_key: Option<Secret>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}
