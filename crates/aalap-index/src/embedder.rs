use std::sync::{Arc, OnceLock};
use std::time::Duration;

use aalap_llm::{LlmError, LlmProvider};
use aalap_store::vector_store::BoxFuture;

use crate::error::{IndexError, Result};

/// Text to vector mapping used by indexing and retrieval.
///
/// Object-safe so indexers and retrievers can share one `Arc<dyn Embedder>` without
/// naming the provider type.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    /// Embeddings for `texts`, in order.
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Adapts an [`LlmProvider`] into an [`Embedder`] with a per-call timeout and a
/// fixed output dimension (learned from the first successful call).
pub struct ProviderEmbedder<P> {
    provider: Arc<P>,
    timeout: Duration,
    dimension: OnceLock<usize>,
}

impl<P> std::fmt::Debug for ProviderEmbedder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEmbedder")
            .field("timeout", &self.timeout)
            .field("dimension", &self.dimension.get())
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> ProviderEmbedder<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            dimension: OnceLock::new(),
        }
    }

    /// Output dimension, once known.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        let expected = *self.dimension.get_or_init(|| vector.len());
        if vector.len() == expected {
            Ok(())
        } else {
            Err(IndexError::EmbeddingDimension {
                expected,
                actual: vector.len(),
            })
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, LlmError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(IndexError::Embedding(LlmError::Timeout {
                operation: "embedding",
                seconds: self.timeout.as_secs(),
            })),
        }
    }
}

impl<P: LlmProvider> Embedder for ProviderEmbedder<P> {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(async move {
            let vector = self.bounded(self.provider.embed(text)).await?;
            self.check_dimension(&vector)?;
            Ok(vector)
        })
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let vectors = self.bounded(self.provider.embed_batch(texts)).await?;
            if vectors.len() != texts.len() {
                return Err(IndexError::Embedding(LlmError::Other(format!(
                    "{} returned {} embeddings for {} texts",
                    self.provider.name(),
                    vectors.len(),
                    texts.len()
                ))));
            }
            for v in &vectors {
                self.check_dimension(v)?;
            }
            tracing::debug!(count = vectors.len(), "embedded batch");
            Ok(vectors)
        })
    }
}
