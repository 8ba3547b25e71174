mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file, then apply `AALAP_*` environment overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// resulting values are out of range.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first out-of-range value.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            bail!("storage.data_dir must not be empty");
        }
        if self.index.concurrency == 0 {
            bail!("index.concurrency must be at least 1");
        }
        if self.query.row_display_cap == 0 {
            bail!("query.row_display_cap must be at least 1");
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            bail!("timeouts must be at least 1 second");
        }
        aalap_store::OrgId::new(self.defaults.org.as_str())
            .context("invalid defaults.org")?;
        Ok(())
    }

    /// Effective configuration as TOML. Secrets are never included.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}

/// Priority: `--config <path>` argument > `AALAP_CONFIG` env > `aalap.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("AALAP_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("aalap.toml")
}
