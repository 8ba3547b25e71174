//! Building the runtime pieces from a [`Config`].

use std::sync::Arc;

use aalap_llm::any::AnyProvider;
use aalap_llm::ollama::OllamaProvider;
use aalap_llm::openai::OpenAiProvider;
use aalap_store::{InMemoryVectorStore, OrgId, QdrantVectorStore, SqliteVectorStore, VectorStore};
use anyhow::Context;

use crate::config::{Config, ProviderKind, StorageBackend};
use crate::knowledge::KnowledgeBase;

#[must_use]
pub fn create_provider(config: &Config) -> AnyProvider {
    match config.llm.provider {
        ProviderKind::Ollama => AnyProvider::Ollama(OllamaProvider::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        )),
        ProviderKind::OpenAi => {
            let api_key = config
                .secrets
                .api_key
                .as_ref()
                .map(|s| s.expose().to_owned());
            if api_key.is_none() {
                tracing::warn!("AALAP_API_KEY is not set, sending unauthenticated requests");
            }
            AnyProvider::OpenAi(OpenAiProvider::new(
                api_key,
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Some(config.llm.embedding_model.clone()),
            ))
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => AnyProvider::Mock(aalap_llm::mock::MockProvider::default()),
    }
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be built from the configured URL.
pub fn create_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(SqliteVectorStore::new(config.storage.data_dir.clone())),
        StorageBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        StorageBackend::Qdrant => Arc::new(
            QdrantVectorStore::new(&config.storage.qdrant_url)
                .context("failed to create Qdrant client")?,
        ),
    };
    tracing::debug!(backend = %config.storage.backend, "vector store ready");
    Ok(store)
}

/// # Errors
///
/// Returns an error if the store cannot be created.
pub fn create_knowledge_base(config: &Config) -> anyhow::Result<KnowledgeBase<AnyProvider>> {
    let provider = create_provider(config);
    let store = create_store(config)?;
    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        storage = %config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        "knowledge base ready"
    );
    Ok(KnowledgeBase::new(provider, store, config))
}

/// The explicit organization if given, else `defaults.org`.
///
/// # Errors
///
/// Returns an error if the identifier is not a valid organization name.
pub fn resolve_org(config: &Config, explicit: Option<&str>) -> anyhow::Result<OrgId> {
    let id = explicit.unwrap_or(&config.defaults.org);
    OrgId::new(id).with_context(|| format!("invalid organization id: {id}"))
}
