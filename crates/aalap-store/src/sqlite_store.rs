use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::org::{CollectionKey, OrgId};
use crate::types::{
    ChunkMetadata, CollectionStats, NewChunk, ReplaceOutcome, StoredChunk, StoredMatch,
};
use crate::vector_store::{BoxFuture, VectorStore, check_dimensions, rank, similarity};

const DB_FILE: &str = "vectors.db";

type ChunkRow = (
    String,
    String,
    String,
    i64,
    String,
    String,
    String,
    String,
    Vec<u8>,
);

/// Persistent store with one `SQLite` database per organization.
///
/// Pools are opened lazily and kept in a registry keyed by organization; within a
/// database the `collections` table is the authoritative list of collections.
pub struct SqliteVectorStore {
    root: PathBuf,
    pools: Mutex<HashMap<OrgId, SqlitePool>>,
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl SqliteVectorStore {
    /// `data_dir` is the application data directory; databases land in
    /// `{data_dir}/orgs/{org}/vectors.db`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into().join("orgs"),
            pools: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn database_path(&self, org: &OrgId) -> PathBuf {
        self.root.join(org.as_str()).join(DB_FILE)
    }

    /// Pool for `org`. With `create == false` an organization that has never been
    /// written yields `None` instead of creating an empty database.
    async fn pool(&self, org: &OrgId, create: bool) -> Result<Option<SqlitePool>, StoreError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(org) {
            return Ok(Some(pool.clone()));
        }

        let path = self.database_path(org);
        if !create && !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let pool = open_pool(&path).await?;
        tracing::debug!(org = %org, path = %path.display(), "opened organization store");
        pools.insert(org.clone(), pool.clone());
        Ok(Some(pool))
    }

    /// Close every open pool.
    pub async fn close(&self) {
        let mut pools = self.pools.lock().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
    }
}

async fn open_pool(path: &Path) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(opts)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

async fn collection_dimension(
    conn: &mut sqlx::SqliteConnection,
    collection: &str,
) -> Result<Option<usize>, StoreError> {
    let dim: Option<i64> = sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?")
        .bind(collection)
        .fetch_optional(&mut *conn)
        .await?;
    dim.map(usize::try_from).transpose().map_err(Into::into)
}

/// Insert `chunks`, registering the collection if needed. Runs inside the caller's
/// transaction.
async fn insert_rows(
    conn: &mut sqlx::SqliteConnection,
    key: &CollectionKey,
    chunks: Vec<NewChunk>,
) -> Result<Vec<String>, StoreError> {
    let existing = collection_dimension(conn, key.collection()).await?;
    let Some(dim) = check_dimensions(key, existing, &chunks)? else {
        return Ok(Vec::new());
    };
    if existing.is_none() {
        sqlx::query("INSERT INTO collections (name, dimension) VALUES (?, ?)")
            .bind(key.collection())
            .bind(i64::try_from(dim)?)
            .execute(&mut *conn)
            .await?;
    }

    let mut ids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let id = uuid::Uuid::new_v4().to_string();
        let meta = &chunk.metadata;
        sqlx::query(
            "INSERT INTO chunks \
             (id, collection, doc_id, fingerprint, chunk_index, source, kind, extra, content, vector) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(key.collection())
        .bind(&meta.doc_id)
        .bind(&meta.fingerprint)
        .bind(i64::try_from(meta.chunk_index)?)
        .bind(&meta.source)
        .bind(meta.kind.as_str())
        .bind(serde_json::to_string(&meta.extra)?)
        .bind(&chunk.text)
        .bind(encode_vector(&chunk.vector))
        .execute(&mut *conn)
        .await?;
        ids.push(id);
    }
    Ok(ids)
}

async fn delete_rows(
    conn: &mut sqlx::SqliteConnection,
    key: &CollectionKey,
    doc_id: &str,
) -> Result<usize, StoreError> {
    let result = sqlx::query("DELETE FROM chunks WHERE collection = ? AND doc_id = ?")
        .bind(key.collection())
        .bind(doc_id)
        .execute(&mut *conn)
        .await?;
    Ok(usize::try_from(result.rows_affected())?)
}

fn row_to_chunk(row: ChunkRow) -> Result<(StoredChunk, Vec<f32>), StoreError> {
    let (id, doc_id, fingerprint, chunk_index, source, kind, extra, content, vector) = row;
    let kind = kind.parse().map_err(StoreError::Configuration)?;
    Ok((
        StoredChunk {
            id,
            text: content,
            metadata: ChunkMetadata {
                source,
                doc_id,
                fingerprint,
                chunk_index: usize::try_from(chunk_index)?,
                kind,
                extra: serde_json::from_str(&extra)?,
            },
        },
        decode_vector(&vector),
    ))
}

impl VectorStore for SqliteVectorStore {
    fn insert<'a>(
        &'a self,
        key: &'a CollectionKey,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), true).await? else {
                return Ok(Vec::new());
            };
            let mut tx = pool.begin().await?;
            let ids = insert_rows(&mut tx, key, chunks).await?;
            tx.commit().await?;
            Ok(ids)
        })
    }

    fn replace_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
        chunks: Vec<NewChunk>,
    ) -> BoxFuture<'a, Result<ReplaceOutcome, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), true).await? else {
                return Ok(ReplaceOutcome::default());
            };
            let mut tx = pool.begin().await?;
            let removed = delete_rows(&mut tx, key, doc_id).await?;
            let inserted = insert_rows(&mut tx, key, chunks).await?.len();
            tx.commit().await?;
            Ok(ReplaceOutcome { removed, inserted })
        })
    }

    fn delete_by_document<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), false).await? else {
                return Ok(0);
            };
            let mut conn = pool.acquire().await?;
            delete_rows(&mut conn, key, doc_id).await
        })
    }

    fn document_fingerprint<'a>(
        &'a self,
        key: &'a CollectionKey,
        doc_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), false).await? else {
                return Ok(None);
            };
            let fp = sqlx::query_scalar(
                "SELECT fingerprint FROM chunks WHERE collection = ? AND doc_id = ? LIMIT 1",
            )
            .bind(key.collection())
            .bind(doc_id)
            .fetch_optional(&pool)
            .await?;
            Ok(fp)
        })
    }

    fn document_ids<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), false).await? else {
                return Ok(Vec::new());
            };
            let ids = sqlx::query_scalar(
                "SELECT DISTINCT doc_id FROM chunks WHERE collection = ? ORDER BY doc_id",
            )
            .bind(key.collection())
            .fetch_all(&pool)
            .await?;
            Ok(ids)
        })
    }

    fn query<'a>(
        &'a self,
        key: &'a CollectionKey,
        vector: &'a [f32],
        top_k: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredMatch>, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), false).await? else {
                return Ok(Vec::new());
            };
            let rows: Vec<ChunkRow> = sqlx::query_as(
                "SELECT id, doc_id, fingerprint, chunk_index, source, kind, extra, content, vector \
                 FROM chunks WHERE collection = ? ORDER BY seq",
            )
            .bind(key.collection())
            .fetch_all(&pool)
            .await?;

            let mut matches = Vec::with_capacity(rows.len());
            for row in rows {
                let (chunk, stored) = row_to_chunk(row)?;
                matches.push(StoredMatch {
                    org: key.org().clone(),
                    collection: key.collection().to_owned(),
                    similarity: similarity(vector, &stored),
                    chunk,
                });
            }
            rank(&mut matches, top_k);
            Ok(matches)
        })
    }

    fn stats<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> BoxFuture<'a, Result<CollectionStats, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(key.org(), false).await? else {
                return Ok(CollectionStats::default());
            };
            let (chunks, docs): (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COUNT(DISTINCT doc_id) FROM chunks WHERE collection = ?",
            )
            .bind(key.collection())
            .fetch_one(&pool)
            .await?;
            Ok(CollectionStats {
                chunk_count: usize::try_from(chunks)?,
                document_count: usize::try_from(docs)?,
            })
        })
    }

    fn list_collections<'a>(
        &'a self,
        org: &'a OrgId,
    ) -> BoxFuture<'a, Result<BTreeMap<String, usize>, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(org, false).await? else {
                return Ok(BTreeMap::new());
            };
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT c.name, COUNT(k.seq) FROM collections c \
                 LEFT JOIN chunks k ON k.collection = c.name \
                 GROUP BY c.name ORDER BY c.name",
            )
            .fetch_all(&pool)
            .await?;
            rows.into_iter()
                .map(|(name, count)| Ok((name, usize::try_from(count)?)))
                .collect()
        })
    }

    fn clear<'a>(
        &'a self,
        org: &'a OrgId,
        collection: Option<&'a str>,
    ) -> BoxFuture<'a, Result<usize, StoreError>> {
        Box::pin(async move {
            let Some(pool) = self.pool(org, false).await? else {
                return Ok(0);
            };
            let mut tx = pool.begin().await?;
            let removed = match collection {
                Some(name) => {
                    let r = sqlx::query("DELETE FROM chunks WHERE collection = ?")
                        .bind(name)
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("DELETE FROM collections WHERE name = ?")
                        .bind(name)
                        .execute(&mut *tx)
                        .await?;
                    r.rows_affected()
                }
                None => {
                    let r = sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
                    sqlx::query("DELETE FROM collections")
                        .execute(&mut *tx)
                        .await?;
                    r.rows_affected()
                }
            };
            tx.commit().await?;
            tracing::info!(org = %org, collection = ?collection, removed, "cleared vector data");
            Ok(usize::try_from(removed)?)
        })
    }
}
