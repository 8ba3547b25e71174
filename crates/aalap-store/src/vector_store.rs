use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;
use crate::org::{CollectionKey, OrgId};
use crate::types::{CollectionStats, NewChunk, ReplaceOutcome, StoredMatch};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Nearest-neighbour storage partitioned by organization and collection.
///
/// Collections are created on first insert. Queries against a collection that does not
/// exist return an empty list.
pub trait VectorStore: Send + Sync {
    /// Append chunks and return their assigned ids.
    fn insert<'a>(
        &'a self,
        key: &'a CollectionKey,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;

    /// Remove every chunk of `doc_id` and insert `chunks` as one atomic unit.
    ///
    /// Readers observe either the old chunk set or the new one, never a mix.
    fn replace_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<ReplaceOutcome, StoreError>>;

    fn delete_by_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<usize, StoreError>>;

    /// Fingerprint stored with the chunks of `doc_id`, if the document is present.
    fn document_fingerprint<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

    /// Distinct document ids stored in a collection, sorted.
    fn document_ids<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;

    /// Top `top_k` chunks by similarity; ties keep insertion order.
    fn query<'a>(
        &'a self,
        key: &'a CollectionKey,
        vector: &'a [f32],
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredMatch>, StoreError>>;

    fn stats<'a>(&'a self, key: &'a CollectionKey)
    -> BoxFuture<'a, Result<CollectionStats, StoreError>>;

    /// Collection name to chunk count, for one organization only.
    fn list_collections<'a>(
        &'a self,
        org: &'a OrgId,
    ) -> BoxFuture<'a, Result<BTreeMap<String, usize>, StoreError>>;

    /// Irreversibly drop one collection, or every collection of `org`. Returns the
    /// number of chunks removed.
    fn clear<'a>(
        &'a self,
        org: &'a OrgId,
        collection: Option<&'a str>,
    ) -> BoxFuture<'a, Result<usize, StoreError>>;
}

/// Cosine similarity clamped to `[0, 1]`; zero vectors score 0.
#[must_use]
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Check that every chunk has the same dimension as `expected` (or as the first chunk
/// when the collection is new). Returns the dimension of the batch.
///
/// # Errors
///
/// Returns [`StoreError::DimensionMismatch`] on the first differing vector.
pub fn check_dimensions(
    key: &CollectionKey,
    expected: Option<usize>,
    chunks: &[NewChunk],
) -> Result<Option<usize>, StoreError> {
    let Some(first) = chunks.first() else {
        return Ok(expected);
    };
    let dim = expected.unwrap_or(first.vector.len());
    for chunk in chunks {
        if chunk.vector.len() != dim {
            return Err(StoreError::DimensionMismatch {
                collection: key.to_string(),
                expected: dim,
                actual: chunk.vector.len(),
            });
        }
    }
    Ok(Some(dim))
}

/// Stable descending sort by similarity followed by truncation.
pub fn rank(matches: &mut Vec<StoredMatch>, top_k: usize) {
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches.truncate(top_k);
}
