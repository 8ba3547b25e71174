use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use crate::error::StoreError;
use crate::org::{CollectionKey, OrgId};
use crate::types::{CollectionStats, NewChunk, ReplaceOutcome, StoredChunk, StoredMatch};
use crate::vector_store::{BoxFuture, VectorStore, check_dimensions, rank, similarity};

struct Entry {
    vector: Vec<f32>,
    chunk: StoredChunk,
}

#[derive(Default)]
struct Collection {
    dimension: Option<usize>,
    /// Insertion order is the tie-break order for equal scores.
    entries: Vec<Entry>,
}

impl Collection {
    fn append(&mut self, key: &CollectionKey, chunks: Vec<NewChunk>) -> Result<Vec<String>, StoreError> {
        self.dimension = check_dimensions(key, self.dimension, &chunks)?;
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = uuid::Uuid::new_v4().to_string();
            ids.push(id.clone());
            self.entries.push(Entry {
                vector: chunk.vector,
                chunk: StoredChunk {
                    id,
                    text: chunk.text,
                    metadata: chunk.metadata,
                },
            });
        }
        Ok(ids)
    }

    fn remove_document(&mut self, doc_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.chunk.metadata.doc_id != doc_id);
        before - self.entries.len()
    }
}

type OrgCollections = BTreeMap<String, Collection>;

/// Volatile store for tests and throwaway sessions.
pub struct InMemoryVectorStore {
    orgs: RwLock<HashMap<OrgId, OrgCollections>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            orgs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn insert<'a>(
        &'a self,
        key: &'a CollectionKey,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let mut orgs = self.orgs.write().map_err(|_| StoreError::Poisoned)?;
            orgs.entry(key.org().clone())
                .or_default()
                .entry(key.collection().to_owned())
                .or_default()
                .append(key, chunks)
        })
    }

    fn replace_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<ReplaceOutcome, StoreError>> {
        Box::pin(async move {
            let mut orgs = self.orgs.write().map_err(|_| StoreError::Poisoned)?;
            if chunks.is_empty() {
                let removed = orgs
                    .get_mut(key.org())
                    .and_then(|cols| cols.get_mut(key.collection()))
                    .map_or(0, |c| c.remove_document(doc_id));
                return Ok(ReplaceOutcome { removed, inserted: 0 });
            }
            let collection = orgs
                .entry(key.org().clone())
                .or_default()
                .entry(key.collection().to_owned())
                .or_default();
            // Validate before removing anything so a rejected batch leaves the old set.
            check_dimensions(key, collection.dimension, &chunks)?;
            let removed = collection.remove_document(doc_id);
            let inserted = collection.append(key, chunks)?.len();
            Ok(ReplaceOutcome { removed, inserted })
        })
    }

    fn delete_by_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut orgs = self.orgs.write().map_err(|_| StoreError::Poisoned)?;
            Ok(orgs
                .get_mut(key.org())
                .and_then(|cols| cols.get_mut(key.collection()))
                .map_or(0, |c| c.remove_document(doc_id)))
        })
    }

    fn document_fingerprint<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let orgs = self.orgs.read().map_err(|_| StoreError::Poisoned)?;
            Ok(orgs
                .get(key.org())
                .and_then(|cols| cols.get(key.collection()))
                .and_then(|c| {
                    c.entries
                        .iter()
                        .find(|e| e.chunk.metadata.doc_id == doc_id)
                        .map(|e| e.chunk.metadata.fingerprint.clone())
                }))
        })
    }

    fn document_ids<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let orgs = self.orgs.read().map_err(|_| StoreError::Poisoned)?;
            Ok(orgs
                .get(key.org())
                .and_then(|c| c.get(key.collection()))
                .map(|c| {
                    c.entries
                        .iter()
                        .map(|e| e.chunk.metadata.doc_id.clone())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn query<'a>(
        &'a self,
        key: &'a CollectionKey,
        vector: &'a [f32],
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredMatch>, StoreError>> {
        Box::pin(async move {
            let orgs = self.orgs.read().map_err(|_| StoreError::Poisoned)?;
            let Some(collection) = orgs.get(key.org()).and_then(|c| c.get(key.collection()))
            else {
                return Ok(Vec::new());
            };
            let mut matches: Vec<StoredMatch> = collection
                .entries
                .iter()
                .map(|e| StoredMatch {
                    org: key.org().clone(),
                    collection: key.collection().to_owned(),
                    chunk: e.chunk.clone(),
                    similarity: similarity(vector, &e.vector),
                })
                .collect();
            rank(&mut matches, top_k);
            Ok(matches)
        })
    }

    fn stats<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<CollectionStats, StoreError>> {
        Box::pin(async move {
            let orgs = self.orgs.read().map_err(|_| StoreError::Poisoned)?;
            Ok(orgs
                .get(key.org())
                .and_then(|c| c.get(key.collection()))
                .map_or_else(CollectionStats::default, |c| CollectionStats {
                    chunk_count: c.entries.len(),
                    document_count: c
                        .entries
                        .iter()
                        .map(|e| e.chunk.metadata.doc_id.as_str())
                        .collect::<HashSet<_>>()
                        .len(),
                }))
        })
    }

    fn list_collections<'a>(
        &'a self,
        org: &'a OrgId,
    ) -> BoxFuture<'a, Result<BTreeMap<String, usize>, StoreError>> {
        Box::pin(async move {
            let orgs = self.orgs.read().map_err(|_| StoreError::Poisoned)?;
            Ok(orgs
                .get(org)
                .map(|cols| {
                    cols.iter()
                        .map(|(name, c)| (name.clone(), c.entries.len()))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn clear<'a>(
        &'a self,
        org: &'a OrgId,
        collection: Option<&'a str>,
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut orgs = self.orgs.write().map_err(|_| StoreError::Poisoned)?;
            let removed = match collection {
                Some(name) => orgs
                    .get_mut(org)
                    .and_then(|cols| cols.remove(name))
                    .map_or(0, |c| c.entries.len()),
                None => orgs
                    .remove(org)
                    .map_or(0, |cols| cols.values().map(|c| c.entries.len()).sum()),
            };
            Ok(removed)
        })
    }
}
