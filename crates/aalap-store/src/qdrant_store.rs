//! Qdrant backend: one Qdrant collection per (organization, collection).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointId, PointStruct, PointsIdsList, RetrievedPoint, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder, point_id::PointIdOptions,
    value::Kind,
};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::org::{CollectionKey, OrgId};
use crate::types::{
    ChunkMetadata, CollectionStats, NewChunk, ReplaceOutcome, StoredChunk, StoredMatch,
};
use crate::vector_store::{BoxFuture, VectorStore, check_dimensions};

const PREFIX: &str = "aalap";
const SEPARATOR: &str = "__";
const PAGE: u32 = 256;

/// `aalap__{org length}__{org}__{collection}`. Names may themselves contain `__`, so
/// the length pins where the org ends and no two keys share a name or a prefix.
fn qdrant_name(key: &CollectionKey) -> String {
    format!("{}{}", org_prefix(key.org()), key.collection())
}

fn org_prefix(org: &OrgId) -> String {
    let org = org.as_str();
    format!("{PREFIX}{SEPARATOR}{}{SEPARATOR}{org}{SEPARATOR}", org.len())
}

fn doc_filter(doc_id: &str) -> Filter {
    Filter::must(vec![Condition::matches("doc_id", doc_id.to_owned())])
}

fn next_seq_base() -> i64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_micros());
    i64::try_from(micros.saturating_mul(1000)).unwrap_or(i64::MAX / 2)
}

pub struct QdrantVectorStore {
    client: Qdrant,
    /// Serializes delete-then-insert against readers within this process.
    gate: RwLock<()>,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore").finish_non_exhaustive()
    }
}

impl QdrantVectorStore {
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be built for `url`.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self {
            client,
            gate: RwLock::new(()),
        })
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.client.collection_exists(name).await.map_err(Box::new)?)
    }

    async fn ensure(&self, name: &str, dim: usize) -> Result<(), StoreError> {
        if self.exists(name).await? {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(u64::try_from(dim)?, Distance::Cosine)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    async fn upsert(&self, key: &CollectionKey, chunks: Vec<NewChunk>) -> Result<Vec<String>, StoreError> {
        let Some(dim) = check_dimensions(key, None, &chunks)? else {
            return Ok(Vec::new());
        };
        let name = qdrant_name(key);
        self.ensure(&name, dim).await?;

        let base = next_seq_base();
        let mut ids = Vec::with_capacity(chunks.len());
        let mut points = Vec::with_capacity(chunks.len());
        for (offset, chunk) in chunks.into_iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            let payload = chunk_payload(key, &chunk, base + i64::try_from(offset)?)?;
            points.push(PointStruct::new(id.clone(), chunk.vector, payload));
            ids.push(id);
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(&name, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(ids)
    }

    async fn scroll(
        &self,
        name: &str,
        filter: Option<Filter>,
        limit: Option<u32>,
    ) -> Result<Vec<RetrievedPoint>, StoreError> {
        let mut out = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(name)
                .with_payload(true)
                .with_vectors(false)
                .limit(limit.unwrap_or(PAGE));
            if let Some(ref f) = filter {
                builder = builder.filter(f.clone());
            }
            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }
            let response = self.client.scroll(builder).await.map_err(Box::new)?;
            out.extend(response.result);
            match response.next_page_offset {
                Some(next) if limit.is_none() => offset = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn remove_document(&self, key: &CollectionKey, doc_id: &str) -> Result<usize, StoreError> {
        let name = qdrant_name(key);
        if !self.exists(&name).await? {
            return Ok(0);
        }
        let ids: Vec<PointId> = self
            .scroll(&name, Some(doc_filter(doc_id)), None)
            .await?
            .into_iter()
            .filter_map(|p| p.id)
            .collect();
        let removed = ids.len();
        if removed > 0 {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&name)
                        .points(PointsIdsList { ids })
                        .wait(true),
                )
                .await
                .map_err(Box::new)?;
        }
        Ok(removed)
    }

    async fn count(&self, name: &str) -> Result<usize, StoreError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(Box::new)?;
        Ok(usize::try_from(response.result.map_or(0, |r| r.count))?)
    }

    async fn org_collections(&self, org: &OrgId) -> Result<Vec<(String, String)>, StoreError> {
        let prefix = org_prefix(org);
        let response = self.client.list_collections().await.map_err(Box::new)?;
        Ok(response
            .collections
            .into_iter()
            .filter_map(|c| {
                c.name
                    .strip_prefix(&prefix)
                    .map(|short| (short.to_owned(), c.name.clone()))
            })
            .collect())
    }
}

fn chunk_payload(
    key: &CollectionKey,
    chunk: &NewChunk,
    seq: i64,
) -> Result<HashMap<String, Value>, StoreError> {
    let meta = &chunk.metadata;
    let mut payload = HashMap::with_capacity(10);
    payload.insert("org".to_owned(), Value::from(key.org().as_str()));
    payload.insert("collection".to_owned(), Value::from(key.collection()));
    payload.insert("doc_id".to_owned(), Value::from(meta.doc_id.as_str()));
    payload.insert("fingerprint".to_owned(), Value::from(meta.fingerprint.as_str()));
    payload.insert(
        "chunk_index".to_owned(),
        Value::from(i64::try_from(meta.chunk_index)?),
    );
    payload.insert("source".to_owned(), Value::from(meta.source.as_str()));
    payload.insert("kind".to_owned(), Value::from(meta.kind.as_str()));
    payload.insert(
        "extra".to_owned(),
        Value::from(serde_json::to_string(&meta.extra)?),
    );
    payload.insert("text".to_owned(), Value::from(chunk.text.as_str()));
    payload.insert("seq".to_owned(), Value::from(seq));
    Ok(payload)
}

fn payload_str(payload: &HashMap<String, Value>, field: &str) -> String {
    match payload.get(field).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn payload_int(payload: &HashMap<String, Value>, field: &str) -> i64 {
    match payload.get(field).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => *i,
        _ => 0,
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn payload_to_chunk(id: String, payload: &HashMap<String, Value>) -> Result<StoredChunk, StoreError> {
    let extra = payload_str(payload, "extra");
    Ok(StoredChunk {
        id,
        text: payload_str(payload, "text"),
        metadata: ChunkMetadata {
            source: payload_str(payload, "source"),
            doc_id: payload_str(payload, "doc_id"),
            fingerprint: payload_str(payload, "fingerprint"),
            chunk_index: usize::try_from(payload_int(payload, "chunk_index"))?,
            kind: payload_str(payload, "kind")
                .parse()
                .map_err(StoreError::Configuration)?,
            extra: if extra.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&extra)?
            },
        },
    })
}

impl VectorStore for QdrantVectorStore {
    fn insert<'a>(
        &'a self,
        key: &'a CollectionKey,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.write().await;
            self.upsert(key, chunks).await
        })
    }

    fn replace_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<ReplaceOutcome, StoreError>> {
        Box::pin(async move {
            check_dimensions(key, None, &chunks)?;
            let _guard = self.gate.write().await;
            let removed = self.remove_document(key, doc_id).await?;
            let inserted = self.upsert(key, chunks).await?.len();
            Ok(ReplaceOutcome { removed, inserted })
        })
    }

    fn delete_by_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.write().await;
            self.remove_document(key, doc_id).await
        })
    }

    fn document_fingerprint<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.read().await;
            let name = qdrant_name(key);
            if !self.exists(&name).await? {
                return Ok(None);
            }
            let points = self.scroll(&name, Some(doc_filter(doc_id)), Some(1)).await?;
            Ok(points
                .first()
                .map(|p| payload_str(&p.payload, "fingerprint")))
        })
    }

    fn document_ids<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.read().await;
            let name = qdrant_name(key);
            if !self.exists(&name).await? {
                return Ok(Vec::new());
            }
            let ids: BTreeSet<String> = self
                .scroll(&name, None, None)
                .await?
                .iter()
                .map(|p| payload_str(&p.payload, "doc_id"))
                .collect();
            Ok(ids.into_iter().collect())
        })
    }

    fn query<'a>(
        &'a self,
        key: &'a CollectionKey,
        vector: &'a [f32],
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredMatch>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.read().await;
            let name = qdrant_name(key);
            if top_k == 0 || !self.exists(&name).await? {
                return Ok(Vec::new());
            }
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&name, vector.to_vec(), u64::try_from(top_k)?)
                        .with_payload(true),
                )
                .await
                .map_err(Box::new)?;

            let mut scored = Vec::with_capacity(response.result.len());
            for point in response.result {
                let seq = payload_int(&point.payload, "seq");
                let org = payload_str(&point.payload, "org");
                let collection = payload_str(&point.payload, "collection");
                let chunk = payload_to_chunk(point_id_string(point.id), &point.payload)?;
                scored.push((
                    seq,
                    StoredMatch {
                        org: OrgId::new(org)?,
                        collection,
                        chunk,
                        similarity: point.score.clamp(0.0, 1.0),
                    },
                ));
            }
            scored.sort_by(|a, b| {
                b.1.similarity
                    .total_cmp(&a.1.similarity)
                    .then(a.0.cmp(&b.0))
            });
            Ok(scored.into_iter().map(|(_, m)| m).collect())
        })
    }

    fn stats<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<CollectionStats, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.read().await;
            let name = qdrant_name(key);
            if !self.exists(&name).await? {
                return Ok(CollectionStats::default());
            }
            let points = self.scroll(&name, None, None).await?;
            let docs: HashSet<String> = points
                .iter()
                .map(|p| payload_str(&p.payload, "doc_id"))
                .collect();
            Ok(CollectionStats {
                chunk_count: points.len(),
                document_count: docs.len(),
            })
        })
    }

    fn list_collections<'a>(
        &'a self,
        org: &'a OrgId,
    ) -> BoxFuture<'a, Result<BTreeMap<String, usize>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.read().await;
            let mut out = BTreeMap::new();
            for (short, full) in self.org_collections(org).await? {
                out.insert(short, self.count(&full).await?);
            }
            Ok(out)
        })
    }

    fn clear<'a>(
        &'a self,
        org: &'a OrgId,
        collection: Option<&'a str>,
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.write().await;
            let targets: Vec<String> = match collection {
                Some(name) => {
                    let full = qdrant_name(&CollectionKey::new(org.clone(), name)?);
                    if self.exists(&full).await? {
                        vec![full]
                    } else {
                        Vec::new()
                    }
                }
                None => self
                    .org_collections(org)
                    .await?
                    .into_iter()
                    .map(|(_, full)| full)
                    .collect(),
            };
            let mut removed = 0;
            for full in targets {
                removed += self.count(&full).await?;
                self.client.delete_collection(full.as_str()).await.map_err(Box::new)?;
            }
            tracing::info!(org = %org, collection = ?collection, removed, "cleared vector data");
            Ok(removed)
        })
    }
}
