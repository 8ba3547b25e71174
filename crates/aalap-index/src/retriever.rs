//! Similarity retrieval across an organization's collections.

use std::sync::Arc;

use aalap_store::{CollectionKey, OrgConfig, OrgId, StoreError, StoredChunk, VectorStore};

use crate::embedder::Embedder;
use crate::error::Result;
use crate::rerank::{LexicalOverlapReranker, Reranker};

/// A ranked chunk with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunk: StoredChunk,
    pub collection: String,
    /// Raw cosine similarity in `[0, 1]`.
    pub similarity: f32,
    /// Ordering score; equals `similarity` unless reranked.
    pub score: f32,
}

impl RetrievalResult {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.chunk.metadata.source
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.chunk.text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CollectionSelection {
    /// Every collection the organization has.
    #[default]
    AllEnabled,
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    pub collections: CollectionSelection,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub rerank: bool,
}

impl RetrieveOptions {
    /// Options taken from the organization's config. A non-empty
    /// `enabled_collections` restricts the search to those collections.
    #[must_use]
    pub fn from_config(config: &OrgConfig) -> Self {
        Self {
            collections: if config.enabled_collections.is_empty() {
                CollectionSelection::AllEnabled
            } else {
                CollectionSelection::Only(config.enabled_collections.clone())
            },
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            rerank: config.rerank_enabled,
        }
    }

    #[must_use]
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collections = CollectionSelection::Only(vec![collection.into()]);
        self
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for a threshold outside `[0, 1]` or a zero
    /// `top_k`.
    pub fn validate(&self) -> std::result::Result<(), StoreError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(StoreError::Configuration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
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

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    /// Matches fetched from the store before thresholding.
    pub candidates: usize,
    pub dropped_below_threshold: usize,
}

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Box<dyn Reranker>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever").finish_non_exhaustive()
    }
}

impl Retriever {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            reranker: Box::new(LexicalOverlapReranker::default()),
        }
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Embed `query` once, search each target collection, drop matches below the
    /// threshold, optionally rerank, and keep the best `top_k`.
    ///
    /// # Errors
    ///
    /// Returns an error on embedding or store failure, out-of-range options, an invalid
    /// collection name, or
    /// [`StoreError::IsolationViolation`] if the store hands back a chunk from another
    /// organization or collection.
    pub async fn retrieve(
        &self,
        query: &str,
        org: &OrgId,
        options: &RetrieveOptions,
    ) -> Result<Retrieval> {
        options.validate()?;
        let collections = match &options.collections {
            CollectionSelection::Only(names) => names.clone(),
            CollectionSelection::AllEnabled => {
                self.store.list_collections(org).await?.into_keys().collect()
            }
        };
        let keys = collections
            .into_iter()
            .map(|c| CollectionKey::new(org.clone(), c))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Ok(Retrieval::default());
        }

        let vector = self.embedder.embed(query).await?;

        let mut results = Vec::new();
        for key in &keys {
            for m in self.store.query(key, &vector, options.top_k).await? {
                if &m.org != key.org() || m.collection != key.collection() {
                    return Err(StoreError::IsolationViolation {
                        requested: key.to_string(),
                        actual: format!("{}/{}", m.org, m.collection),
                    }
                    .into());
                }
                results.push(RetrievalResult {
                    chunk: m.chunk,
                    collection: m.collection,
                    similarity: m.similarity,
                    score: m.similarity,
                });
            }
        }

        let candidates = results.len();
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.retain(|r| r.similarity >= options.similarity_threshold);
        let dropped = candidates - results.len();
        if dropped > 0 {
            tracing::debug!(
                org = %org,
                dropped,
                threshold = options.similarity_threshold,
                "dropped matches below similarity threshold"
            );
        }

        if options.rerank {
            self.reranker.rerank(query, &mut results);
        }
        results.truncate(options.top_k);

        tracing::info!(
            org = %org,
            collections = keys.len(),
            candidates,
            results = results.len(),
            "retrieval finished"
        );
        Ok(Retrieval {
            results,
            candidates,
            dropped_below_threshold: dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use aalap_llm::mock::{MockProvider, hashed_embedding};
    use aalap_store::vector_store::BoxFuture;
    use aalap_store::{
        ChunkMetadata, CollectionStats, ContentKind, InMemoryVectorStore, NewChunk,
        ReplaceOutcome, StoredMatch,
    };

    use super::*;
    use crate::embedder::ProviderEmbedder;
    use crate::error::IndexError;

    fn org(name: &str) -> OrgId {
        OrgId::new(name).unwrap()
    }

    fn key(o: &str, c: &str) -> CollectionKey {
        CollectionKey::new(org(o), c).unwrap()
    }

    fn chunk(doc: &str, text: &str) -> NewChunk {
        NewChunk {
            text: text.to_owned(),
            vector: hashed_embedding(text),
            metadata: ChunkMetadata {
                source: format!("{doc}.md"),
                doc_id: doc.to_owned(),
                fingerprint: "fp".into(),
                chunk_index: 0,
                kind: ContentKind::Markdown,
                extra: BTreeMap::new(),
            },
        }
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(ProviderEmbedder::new(
            Arc::new(MockProvider::default()),
            Duration::from_secs(5),
        ))
    }

    async fn seeded() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .insert(
                &key("acme", "documents"),
                vec![
                    chunk("refunds", "refunds are processed within five days"),
                    chunk("shipping", "shipping takes two weeks overseas"),
                ],
            )
            .await
            .unwrap();
        store
            .insert(
                &key("acme", "code"),
                vec![chunk("billing", "fn process_refunds computes refunds totals")],
            )
            .await
            .unwrap();
        store
            .insert(
                &key("globex", "documents"),
                vec![chunk("secret", "refunds are processed within five days")],
            )
            .await
            .unwrap();
        store
    }

    fn options() -> RetrieveOptions {
        RetrieveOptions::from_config(&OrgConfig::default())
    }

    #[tokio::test]
    async fn searches_all_collections_of_the_org() {
        let retriever = Retriever::new(seeded().await, embedder());
        let r = retriever
            .retrieve("how are refunds processed", &org("acme"), &options())
            .await
            .unwrap();
        assert_eq!(r.candidates, 3);
        assert_eq!(r.results[0].source(), "refunds.md");
        let collections: Vec<_> = r.results.iter().map(|x| x.collection.as_str()).collect();
        assert!(collections.contains(&"code"));
        assert!(r.results.iter().all(|x| x.chunk.metadata.doc_id != "secret"));
    }

    #[tokio::test]
    async fn explicit_collection_selection() {
        let retriever = Retriever::new(seeded().await, embedder());
        let r = retriever
            .retrieve("refunds", &org("acme"), &options().in_collection("code"))
            .await
            .unwrap();
        assert_eq!(r.results.len(), 1);
        assert_eq!(r.results[0].collection, "code");
    }

    #[tokio::test]
    async fn enabled_collections_restrict_default_search() {
        let config = OrgConfig {
            enabled_collections: vec!["documents".into()],
            ..OrgConfig::default()
        };
        let retriever = Retriever::new(seeded().await, embedder());
        let r = retriever
            .retrieve("refunds", &org("acme"), &RetrieveOptions::from_config(&config))
            .await
            .unwrap();
        assert!(r.results.iter().all(|x| x.collection == "documents"));
    }

    #[tokio::test]
    async fn threshold_drops_and_reports() {
        let retriever = Retriever::new(seeded().await, embedder());
        let opts = RetrieveOptions {
            similarity_threshold: 1.0,
            ..options()
        };
        let r = retriever
            .retrieve("totally different question", &org("acme"), &opts)
            .await
            .unwrap();
        assert!(r.results.is_empty());
        assert_eq!(r.dropped_below_threshold, 3);
    }

    #[tokio::test]
    async fn results_never_below_threshold() {
        let retriever = Retriever::new(seeded().await, embedder());
        let opts = RetrieveOptions {
            similarity_threshold: 0.3,
            rerank: false,
            ..options()
        };
        let r = retriever.retrieve("refunds", &org("acme"), &opts).await.unwrap();
        assert!(r.results.iter().all(|x| x.similarity >= 0.3));
        assert_eq!(r.results.len() + r.dropped_below_threshold, r.candidates);
    }

    #[tokio::test]
    async fn empty_org_returns_nothing() {
        let retriever = Retriever::new(seeded().await, embedder());
        let r = retriever
            .retrieve("refunds", &org("initech"), &options())
            .await
            .unwrap();
        assert_eq!(r, Retrieval::default());
    }

    #[tokio::test]
    async fn top_k_truncates() {
        let retriever = Retriever::new(seeded().await, embedder());
        let opts = RetrieveOptions {
            top_k: 1,
            ..options()
        };
        let r = retriever.retrieve("refunds", &org("acme"), &opts).await.unwrap();
        assert_eq!(r.results.len(), 1);
    }

    #[tokio::test]
    async fn without_rerank_score_equals_similarity() {
        let retriever = Retriever::new(seeded().await, embedder());
        let opts = RetrieveOptions {
            rerank: false,
            ..options()
        };
        let r = retriever.retrieve("refunds", &org("acme"), &opts).await.unwrap();
        assert!(r.results.iter().all(|x| (x.score - x.similarity).abs() < f32::EPSILON));
        assert!(r.results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    /// Answers every query with a chunk stamped as another organization's.
    struct LeakyStore;

    impl VectorStore for LeakyStore {
        fn insert<'a>(&'a self, _: &'a CollectionKey, _: Vec<NewChunk>) -> BoxFuture<'a, aalap_store::error::Result<Vec<String>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn replace_document<'a>(&'a self, _: &'a CollectionKey, _: &'a str, _: Vec<NewChunk>) -> BoxFuture<'a, aalap_store::error::Result<ReplaceOutcome>> {
            Box::pin(async { Ok(ReplaceOutcome::default()) })
        }
        fn delete_by_document<'a>(&'a self, _: &'a CollectionKey, _: &'a str) -> BoxFuture<'a, aalap_store::error::Result<usize>> {
            Box::pin(async { Ok(0) })
        }
        fn document_fingerprint<'a>(&'a self, _: &'a CollectionKey, _: &'a str) -> BoxFuture<'a, aalap_store::error::Result<Option<String>>> {
            Box::pin(async { Ok(None) })
        }
        fn document_ids<'a>(&'a self, _: &'a CollectionKey) -> BoxFuture<'a, aalap_store::error::Result<Vec<String>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn query<'a>(&'a self, _: &'a CollectionKey, _: &'a [f32], _: usize) -> BoxFuture<'a, aalap_store::error::Result<Vec<StoredMatch>>> {
            Box::pin(async {
                let c = chunk("leak", "refunds");
                Ok(vec![StoredMatch {
                    org: org("globex"),
                    collection: "documents".into(),
                    chunk: StoredChunk {
                        id: "x".into(),
                        text: c.text,
                        metadata: c.metadata,
                    },
                    similarity: 0.9,
                }])
            })
        }
        fn stats<'a>(&'a self, _: &'a CollectionKey) -> BoxFuture<'a, aalap_store::error::Result<CollectionStats>> {
            Box::pin(async { Ok(CollectionStats::default()) })
        }
        fn list_collections<'a>(&'a self, _: &'a OrgId) -> BoxFuture<'a, aalap_store::error::Result<BTreeMap<String, usize>>> {
            Box::pin(async { Ok(BTreeMap::from([("documents".to_owned(), 1)])) })
        }
        fn clear<'a>(&'a self, _: &'a OrgId, _: Option<&'a str>) -> BoxFuture<'a, aalap_store::error::Result<usize>> {
            Box::pin(async { Ok(0) })
        }
    }

    #[tokio::test]
    async fn foreign_chunks_raise_isolation_violation() {
        let retriever = Retriever::new(Arc::new(LeakyStore), embedder());
        let err = retriever
            .retrieve("refunds", &org("acme"), &options())
            .await
            .unwrap_err();
        assert!(err.is_isolation_violation());
        assert!(matches!(err, IndexError::Store(StoreError::IsolationViolation { .. })));
    }

    #[tokio::test]
    async fn out_of_range_options_are_configuration_errors() {
        let retriever = Retriever::new(seeded().await, embedder());
        for opts in [
            RetrieveOptions {
                similarity_threshold: 1.5,
                ..options()
            },
            RetrieveOptions {
                similarity_threshold: -0.1,
                ..options()
            },
            RetrieveOptions {
                similarity_threshold: f32::NAN,
                ..options()
            },
            RetrieveOptions {
                top_k: 0,
                ..options()
            },
        ] {
            let err = retriever.retrieve("refunds", &org("acme"), &opts).await.unwrap_err();
            assert!(
                matches!(err, IndexError::Store(StoreError::Configuration(_))),
                "{opts:?}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn invalid_collection_name_is_configuration_error() {
        let retriever = Retriever::new(seeded().await, embedder());
        let err = retriever
            .retrieve("q", &org("acme"), &options().in_collection("no way"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Store(StoreError::Configuration(_))));
    }
}
