use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::org::OrgId;

const CONFIG_FILE: &str = "config.toml";

fn default_similarity_threshold() -> f32 {
    0.0
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    5
}

fn default_rerank_enabled() -> bool {
    true
}

fn default_max_context_tokens() -> usize {
    3000
}

/// Retrieval and chunking parameters owned by one organization.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrgConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rerank_enabled")]
    pub rerank_enabled: bool,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Collections searched when a retrieval does not name any. Empty means all.
    #[serde(default)]
    pub enabled_collections: Vec<String>,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            rerank_enabled: default_rerank_enabled(),
            max_context_tokens: default_max_context_tokens(),
            enabled_collections: Vec::new(),
        }
    }
}

impl OrgConfig {
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(StoreError::Configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.chunk_size == 0 {
            return Err(StoreError::Configuration(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(StoreError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(StoreError::Configuration(
                "top_k must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Loads and saves `{data_dir}/orgs/{org}/config.toml`.
#[derive(Debug, Clone)]
pub struct OrgConfigStore {
    root: PathBuf,
}

impl OrgConfigStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("orgs"),
        }
    }

    #[must_use]
    pub fn path(&self, org: &OrgId) -> PathBuf {
        self.root.join(org.as_str()).join(CONFIG_FILE)
    }

    /// Load the organization's config, or defaults if it has none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub async fn load(&self, org: &OrgId) -> Result<OrgConfig, StoreError> {
        let path = self.path(org);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(OrgConfig::default());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let config: OrgConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and persist `config` for `org`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for invalid values (nothing is written),
    /// or an I/O / serialization error.
    pub async fn save(&self, org: &OrgId, config: &OrgConfig) -> Result<(), StoreError> {
        config.validate()?;
        let path = self.path(org);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, toml::to_string_pretty(config)?).await?;
        tracing::info!(org = %org, path = %path.display(), "saved organization config");
        Ok(())
    }
}
