use super::Config;
use crate::secret::Secret;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_storage();
        self.apply_env_overrides_runtime();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("AALAP_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid AALAP_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("AALAP_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("AALAP_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("AALAP_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("AALAP_API_KEY")
            && !v.is_empty()
        {
            self.secrets.api_key = Some(Secret::new(v));
        }
    }

    fn apply_env_overrides_storage(&mut self) {
        if let Ok(v) = std::env::var("AALAP_STORAGE_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.storage.backend = backend;
            } else {
                tracing::warn!("ignoring invalid AALAP_STORAGE_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("AALAP_DATA_DIR") {
            self.storage.data_dir = v.into();
        }
        if let Ok(v) = std::env::var("AALAP_QDRANT_URL") {
            self.storage.qdrant_url = v;
        }
    }

    fn apply_env_overrides_runtime(&mut self) {
        if let Ok(v) = std::env::var("AALAP_INDEX_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.concurrency = n;
        }
        if let Ok(v) = std::env::var("AALAP_QUERY_ROW_CAP")
            && let Ok(cap) = v.parse::<usize>()
        {
            self.query.row_display_cap = cap;
        }
        if let Ok(v) = std::env::var("AALAP_QUERY_ALLOW_WRITES")
            && let Ok(allow) = v.parse::<bool>()
        {
            self.query.allow_writes = allow;
        }
        if let Ok(v) = std::env::var("AALAP_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("AALAP_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
        if let Ok(v) = std::env::var("AALAP_ORG") {
            self.defaults.org = v;
        }
    }
}
