//! The organization-scoped surface the binary and embedding applications call.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aalap_db::DatabaseConnection;
use aalap_index::{
    BuiltContext, CollectionSelection, ContentHint, DocumentIndexer, IndexStats, IndexerConfig,
    ProviderEmbedder, Retrieval, RetrieveOptions, Retriever, SchemaIndexOptions,
    SchemaIndexStats, SchemaIndexer, build_context,
};
use aalap_llm::LlmProvider;
use aalap_store::{CollectionKey, OrgConfig, OrgConfigStore, OrgId, VectorStore};

use crate::config::Config;
use crate::error::Result;
use crate::query::{QueryEngine, QueryEngineConfig, QueryFailure, QueryRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub hint: ContentHint,
}

/// Per-call replacements for the organization's retrieval settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrieveOverrides {
    pub collections: Option<Vec<String>>,
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub rerank: Option<bool>,
}

impl RetrieveOverrides {
    fn apply(&self, mut options: RetrieveOptions) -> RetrieveOptions {
        if let Some(collections) = &self.collections {
            options.collections = CollectionSelection::Only(collections.clone());
        }
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }
        if let Some(threshold) = self.similarity_threshold {
            options.similarity_threshold = threshold;
        }
        if let Some(rerank) = self.rerank {
            options.rerank = rerank;
        }
        options
    }
}

pub struct KnowledgeBase<P> {
    store: Arc<dyn VectorStore>,
    org_configs: OrgConfigStore,
    indexer: DocumentIndexer,
    retriever: Arc<Retriever>,
    engine: QueryEngine<P>,
}

impl<P> std::fmt::Debug for KnowledgeBase<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("org_configs", &self.org_configs)
            .field("indexer", &self.indexer)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider + 'static> KnowledgeBase<P> {
    /// Wire indexing, retrieval and querying over one provider and one store.
    #[must_use]
    pub fn new(provider: P, store: Arc<dyn VectorStore>, config: &Config) -> Self {
        let provider = Arc::new(provider);
        let embedder = Arc::new(ProviderEmbedder::new(
            provider.clone(),
            Duration::from_secs(config.timeouts.embedding_seconds),
        ));
        let indexer = DocumentIndexer::new(
            store.clone(),
            embedder.clone(),
            IndexerConfig {
                concurrency: config.index.concurrency,
                max_file_size: config.index.max_file_size,
            },
        );
        let retriever = Arc::new(Retriever::new(store.clone(), embedder));
        let engine = QueryEngine::new(provider, retriever.clone(), QueryEngineConfig::from(config));
        Self {
            store,
            org_configs: OrgConfigStore::new(config.storage.data_dir.clone()),
            indexer,
            retriever,
            engine,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &QueryEngine<P> {
        &self.engine
    }

    /// # Errors
    ///
    /// Returns an error if the stored config cannot be read or is invalid.
    pub async fn org_config(&self, org: &OrgId) -> Result<OrgConfig> {
        Ok(self.org_configs.load(org).await?)
    }

    /// Validate and persist `config` for `org`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for out-of-range values, before anything is written.
    pub async fn save_org_config(&self, org: &OrgId, config: &OrgConfig) -> Result<()> {
        Ok(self.org_configs.save(org, config).await?)
    }

    /// Index a file or directory into `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid collection name or org config, or an unreadable
    /// path. Per-file failures are reported in [`IndexStats::errors`].
    pub async fn index(
        &self,
        path: &Path,
        org: &OrgId,
        collection: &str,
        options: &IndexOptions,
    ) -> Result<IndexStats> {
        let key = CollectionKey::new(org.clone(), collection)?;
        let config = self.org_config(org).await?;
        Ok(self.indexer.index(path, &key, options.hint, &config).await?)
    }

    /// Index the schema of the database behind `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the org config is invalid or the table list cannot be read.
    pub async fn index_schema(
        &self,
        conn: &DatabaseConnection,
        org: &OrgId,
        options: &SchemaIndexOptions,
    ) -> Result<SchemaIndexStats> {
        let config = self.org_config(org).await?;
        let indexer = SchemaIndexer::new(self.indexer.clone());
        Ok(indexer.index_schema(conn, org, options, &config).await?)
    }

    /// # Errors
    ///
    /// Returns an error on embedding or store failure, an isolation violation, or a
    /// configuration error when an override is out of range.
    pub async fn retrieve(
        &self,
        query: &str,
        org: &OrgId,
        overrides: &RetrieveOverrides,
    ) -> Result<Retrieval> {
        let config = self.org_config(org).await?;
        let options = overrides.apply(RetrieveOptions::from_config(&config));
        Ok(self.retriever.retrieve(query, org, &options).await?)
    }

    /// Retrieve with the org's settings and pack the results into its token budget.
    ///
    /// # Errors
    ///
    /// Same as [`Self::retrieve`].
    pub async fn build_context(&self, query: &str, org: &OrgId) -> Result<BuiltContext> {
        let config = self.org_config(org).await?;
        let retrieval = self
            .retriever
            .retrieve(query, org, &RetrieveOptions::from_config(&config))
            .await?;
        Ok(build_context(&retrieval.results, config.max_context_tokens))
    }

    /// System prompt carrying the retrieved context, or `None` when nothing relevant
    /// was found.
    ///
    /// # Errors
    ///
    /// Same as [`Self::retrieve`].
    pub async fn augment_prompt(&self, query: &str, org: &OrgId) -> Result<Option<String>> {
        let context = self.build_context(query, org).await?;
        if context.is_empty() {
            return Ok(None);
        }
        tracing::debug!(
            org = %org,
            sources = context.sources.len(),
            tokens = context.token_estimate,
            "prompt augmented"
        );
        Ok(Some(format!(
            "You have access to the following relevant information from the \
             organization's knowledge base. Use it to give accurate, context-aware \
             answers.\n\n<knowledge_base>\n{}\n</knowledge_base>\n\n\
             Cite sources by their [Source N] label when you use this information.",
            context.text
        )))
    }

    /// Collection name to chunk count.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub async fn list_collections(&self, org: &OrgId) -> Result<BTreeMap<String, usize>> {
        Ok(self.store.list_collections(org).await?)
    }

    /// Drop one collection, or all of `org`'s collections. Returns the chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid collection name or on store failure.
    pub async fn clear(&self, org: &OrgId, collection: Option<&str>) -> Result<usize> {
        if let Some(name) = collection {
            CollectionKey::new(org.clone(), name)?;
        }
        let removed = self.store.clear(org, collection).await?;
        tracing::info!(org = %org, collection = ?collection, removed, "cleared");
        Ok(removed)
    }

    /// Answer `question` from the live database using the org's indexed schema.
    ///
    /// # Errors
    ///
    /// See [`QueryEngine::run_query`]. An unreadable org config fails at the idle stage.
    pub async fn run_query(
        &self,
        question: &str,
        org: &OrgId,
        conn: &DatabaseConnection,
    ) -> std::result::Result<QueryRecord, QueryFailure> {
        let config = match self.org_configs.load(org).await {
            Ok(config) => config,
            Err(e) => {
                return Err(QueryFailure {
                    stage: crate::query::QueryStage::Idle,
                    error: aalap_index::IndexError::from(e).into(),
                    synthesized_query: None,
                });
            }
        };
        self.engine.run_query(question, org, &config, conn).await
    }
}

#[cfg(test)]
mod tests {
    use aalap_index::IndexError;
    use aalap_llm::mock::MockProvider;
    use aalap_store::{InMemoryVectorStore, StoreError};

    use super::*;
    use crate::error::KnowledgeError;

    struct Fixture {
        dir: tempfile::TempDir,
        kb: KnowledgeBase<MockProvider>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        let kb = KnowledgeBase::new(
            MockProvider::default(),
            Arc::new(InMemoryVectorStore::new()),
            &config,
        );
        Fixture { dir, kb }
    }

    fn org(id: &str) -> OrgId {
        OrgId::new(id).unwrap()
    }

    fn write_docs(root: &Path) -> std::path::PathBuf {
        let docs = root.join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("refunds.md"),
            "# Refunds\n\nRefunds are issued within 14 days of purchase.",
        )
        .unwrap();
        std::fs::write(
            docs.join("shipping.txt"),
            "Shipping takes three business days.",
        )
        .unwrap();
        docs
    }

    #[tokio::test]
    async fn index_then_retrieve() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let acme = org("acme");

        let stats = f
            .kb
            .index(&docs, &acme, "documents", &IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.documents, 2);
        assert!(stats.errors.is_empty());

        let retrieval = f
            .kb
            .retrieve("refunds purchase days", &acme, &RetrieveOverrides::default())
            .await
            .unwrap();
        assert!(retrieval.results[0].source().ends_with("refunds.md"));
        assert_eq!(retrieval.results[0].collection, "documents");
    }

    #[tokio::test]
    async fn organizations_are_isolated() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let (acme, globex) = (org("acme"), org("globex"));
        f.kb.index(&docs, &acme, "documents", &IndexOptions::default())
            .await
            .unwrap();

        assert!(f.kb.list_collections(&globex).await.unwrap().is_empty());
        let retrieval = f
            .kb
            .retrieve("refunds", &globex, &RetrieveOverrides::default())
            .await
            .unwrap();
        assert!(retrieval.results.is_empty());
        assert!(f.kb.augment_prompt("refunds", &globex).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_one_org_leaves_the_other() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let (acme, globex) = (org("acme"), org("globex"));
        for o in [&acme, &globex] {
            f.kb.index(&docs, o, "documents", &IndexOptions::default())
                .await
                .unwrap();
        }

        let removed = f.kb.clear(&acme, None).await.unwrap();
        assert!(removed > 0);
        assert!(f.kb.list_collections(&acme).await.unwrap().is_empty());
        assert_eq!(f.kb.list_collections(&globex).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_rejects_invalid_collection_names() {
        let f = fixture();
        assert!(f.kb.clear(&org("acme"), Some("../x")).await.is_err());
    }

    #[tokio::test]
    async fn threshold_override_drops_everything() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let acme = org("acme");
        f.kb.index(&docs, &acme, "documents", &IndexOptions::default())
            .await
            .unwrap();

        let overrides = RetrieveOverrides {
            similarity_threshold: Some(1.0),
            ..RetrieveOverrides::default()
        };
        let retrieval = f
            .kb
            .retrieve("completely different words", &acme, &overrides)
            .await
            .unwrap();
        assert!(retrieval.results.is_empty());
        assert_eq!(retrieval.dropped_below_threshold, retrieval.candidates);
        assert!(retrieval.candidates > 0);
    }

    #[tokio::test]
    async fn out_of_range_overrides_are_rejected() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let acme = org("acme");
        f.kb.index(&docs, &acme, "documents", &IndexOptions::default())
            .await
            .unwrap();

        let threshold = RetrieveOverrides {
            similarity_threshold: Some(1.5),
            ..RetrieveOverrides::default()
        };
        let top_k = RetrieveOverrides {
            top_k: Some(0),
            ..RetrieveOverrides::default()
        };
        for overrides in [threshold, top_k] {
            let err = f.kb.retrieve("refunds", &acme, &overrides).await.unwrap_err();
            assert!(
                matches!(err, KnowledgeError::Index(IndexError::Store(StoreError::Configuration(_)))),
                "{overrides:?}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn org_config_round_trips_and_rejects_invalid_values() {
        let f = fixture();
        let acme = org("acme");
        assert_eq!(f.kb.org_config(&acme).await.unwrap(), OrgConfig::default());

        let config = OrgConfig {
            top_k: 2,
            chunk_size: 100,
            chunk_overlap: 10,
            ..OrgConfig::default()
        };
        f.kb.save_org_config(&acme, &config).await.unwrap();
        assert_eq!(f.kb.org_config(&acme).await.unwrap(), config);

        let bad = OrgConfig {
            chunk_overlap: 100,
            ..config.clone()
        };
        assert!(f.kb.save_org_config(&acme, &bad).await.is_err());
        assert_eq!(f.kb.org_config(&acme).await.unwrap(), config);

        let bad = OrgConfig {
            similarity_threshold: 1.5,
            ..config.clone()
        };
        assert!(f.kb.save_org_config(&acme, &bad).await.is_err());
    }

    #[tokio::test]
    async fn augment_prompt_wraps_cited_context() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let acme = org("acme");
        f.kb.index(&docs, &acme, "documents", &IndexOptions::default())
            .await
            .unwrap();

        let prompt = f
            .kb
            .augment_prompt("how long do refunds take", &acme)
            .await
            .unwrap()
            .unwrap();
        assert!(prompt.contains("<knowledge_base>\n[Source 1: "));
        assert!(prompt.contains("</knowledge_base>"));
        assert!(prompt.contains("[Source N]"));
    }

    #[tokio::test]
    async fn build_context_respects_the_org_budget() {
        let f = fixture();
        let docs = write_docs(f.dir.path());
        let acme = org("acme");
        f.kb.index(&docs, &acme, "documents", &IndexOptions::default())
            .await
            .unwrap();
        f.kb.save_org_config(
            &acme,
            &OrgConfig {
                max_context_tokens: 1,
                ..OrgConfig::default()
            },
        )
        .await
        .unwrap();

        let ctx = f.kb.build_context("refunds", &acme).await.unwrap();
        assert!(ctx.is_empty());
        assert!(ctx.sources.is_empty());
    }
}
