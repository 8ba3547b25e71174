//! Document indexing: walk → extract → chunk → embed → replace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aalap_store::{ChunkMetadata, CollectionKey, NewChunk, OrgConfig, VectorStore};
use futures::StreamExt;
use serde::Serialize;

use crate::chunker::{Chunker, ChunkerConfig};
use crate::document::{Document, fingerprint, normalize};
use crate::embedder::Embedder;
use crate::error::Result;
use crate::loader::{self, ContentHint, DEFAULT_MAX_FILE_SIZE};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// First time this identity was seen.
    Indexed { chunks: usize },
    /// Content changed; the previous chunk set was swapped out.
    Replaced { removed: usize, inserted: usize },
    /// Same fingerprint as the stored chunks; nothing written.
    Unchanged,
    /// Extracted text was empty; any previous chunks were removed.
    Emptied { removed: usize },
}

/// Totals for one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub replaced: usize,
    /// `"{path}: {error}"` per failed document or unreadable path.
    pub errors: Vec<String>,
}

impl IndexStats {
    pub fn record(&mut self, outcome: DocumentOutcome) {
        self.documents += 1;
        match outcome {
            DocumentOutcome::Indexed { chunks } => self.chunks += chunks,
            DocumentOutcome::Replaced { inserted, .. } => {
                self.replaced += 1;
                self.chunks += inserted;
            }
            DocumentOutcome::Unchanged => self.unchanged += 1,
            DocumentOutcome::Emptied { .. } => {}
        }
    }

    pub fn merge(&mut self, other: IndexStats) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.skipped += other.skipped;
        self.unchanged += other.unchanged;
        self.replaced += other.replaced;
        self.errors.extend(other.errors);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexerConfig {
    pub concurrency: usize,
    pub max_file_size: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Indexes files and prepared documents into one collection at a time.
#[derive(Clone)]
pub struct DocumentIndexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: IndexerConfig,
}

impl std::fmt::Debug for DocumentIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndexer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DocumentIndexer {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Index a file, or every supported file under a directory.
    ///
    /// Per-file failures are collected in [`IndexStats::errors`].
    ///
    /// # Errors
    ///
    /// Returns an error if the chunking parameters are invalid or `path` cannot be
    /// resolved.
    pub async fn index(
        &self,
        path: &Path,
        key: &CollectionKey,
        hint: ContentHint,
        config: &OrgConfig,
    ) -> Result<IndexStats> {
        let chunker = Chunker::new(ChunkerConfig::from(config))?;
        let root = tokio::fs::canonicalize(path).await?;
        let mut stats = IndexStats::default();

        let walk = collect_files(&root);
        for error in &walk.errors {
            tracing::warn!(collection = %key, error = %error, "could not walk path");
        }
        stats.errors.extend(walk.errors);

        let mut targets = Vec::new();
        for (file, label) in walk.files {
            if loader::resolve_kind(&file, hint).is_some() {
                targets.push((file, label));
            } else {
                tracing::debug!(file = %label, "unsupported file type, skipping");
                stats.skipped += 1;
            }
        }

        let total = targets.len();
        tracing::info!(collection = %key, total, "indexing started");

        let outcomes: Vec<(String, Result<DocumentOutcome>)> = futures::stream::iter(targets)
            .map(|(file, label)| {
                let chunker = &chunker;
                async move {
                    let outcome = self.index_file(&file, &label, key, hint, chunker).await;
                    (label, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (label, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    tracing::debug!(file = %label, ?outcome, "document processed");
                    stats.record(outcome);
                }
                Err(e) => {
                    tracing::warn!(file = %label, error = %e, "failed to index file");
                    stats.errors.push(format!("{label}: {e}"));
                }
            }
        }

        tracing::info!(
            org = %key.org(),
            collection = key.collection(),
            documents = stats.documents,
            chunks = stats.chunks,
            unchanged = stats.unchanged,
            errors = stats.errors.len(),
            "indexing finished"
        );
        Ok(stats)
    }

    /// Index one prepared document, skipping it when its fingerprint is unchanged.
    ///
    /// All embeddings are computed before the store is touched, so a failure here
    /// leaves the previous chunk set intact.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid chunking parameters, embedding failures or store
    /// failures.
    pub async fn index_document(
        &self,
        document: Document,
        key: &CollectionKey,
        config: &OrgConfig,
    ) -> Result<DocumentOutcome> {
        let chunker = Chunker::new(ChunkerConfig::from(config))?;
        self.index_with(document, key, &chunker).await
    }

    /// Distinct document ids currently stored in `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn document_ids(&self, key: &CollectionKey) -> Result<Vec<String>> {
        Ok(self.store.document_ids(key).await?)
    }

    /// Drop every chunk of `doc_id`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn remove_document(&self, key: &CollectionKey, doc_id: &str) -> Result<usize> {
        Ok(self.store.delete_by_document(key, doc_id).await?)
    }

    async fn index_file(
        &self,
        path: &Path,
        label: &str,
        key: &CollectionKey,
        hint: ContentHint,
        chunker: &Chunker,
    ) -> Result<DocumentOutcome> {
        let extracted = loader::load(path, hint, self.config.max_file_size).await?;
        let document = Document {
            doc_id: path.display().to_string(),
            source: label.to_owned(),
            kind: extracted.kind,
            content: extracted.content,
            extra: extracted.extra,
        };
        self.index_with(document, key, chunker).await
    }

    async fn index_with(
        &self,
        document: Document,
        key: &CollectionKey,
        chunker: &Chunker,
    ) -> Result<DocumentOutcome> {
        let normalized = normalize(&document.content);
        let fp = fingerprint(&normalized, &chunker.config());

        let stored = self.store.document_fingerprint(key, &document.doc_id).await?;
        if stored.as_deref() == Some(fp.as_str()) {
            return Ok(DocumentOutcome::Unchanged);
        }

        let texts = chunker.split(&normalized);
        if texts.is_empty() {
            let removed = self.store.delete_by_document(key, &document.doc_id).await?;
            return Ok(DocumentOutcome::Emptied { removed });
        }

        let vectors = self.embedder.embed_batch(&texts).await?;

        let chunks: Vec<NewChunk> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (text, vector))| NewChunk {
                text,
                vector,
                metadata: ChunkMetadata {
                    source: document.source.clone(),
                    doc_id: document.doc_id.clone(),
                    fingerprint: fp.clone(),
                    chunk_index,
                    kind: document.kind,
                    extra: document.extra.clone(),
                },
            })
            .collect();

        let outcome = self
            .store
            .replace_document(key, &document.doc_id, chunks)
            .await?;
        Ok(if outcome.removed == 0 {
            DocumentOutcome::Indexed {
                chunks: outcome.inserted,
            }
        } else {
            DocumentOutcome::Replaced {
                removed: outcome.removed,
                inserted: outcome.inserted,
            }
        })
    }
}

/// Files found under an indexing root, plus the paths that could not be read.
#[derive(Debug, Default)]
struct Walk {
    files: Vec<(PathBuf, String)>,
    errors: Vec<String>,
}

fn label_for(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Regular files under `root` (or `root` itself) with their display labels.
fn collect_files(root: &Path) -> Walk {
    if root.is_file() {
        let label = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
        return Walk {
            files: vec![(root.to_path_buf(), label)],
            errors: Vec::new(),
        };
    }
    gather(root, walker(root))
}

fn walker(root: &Path) -> ignore::Walk {
    ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build()
}

fn gather(
    root: &Path,
    entries: impl IntoIterator<Item = std::result::Result<ignore::DirEntry, ignore::Error>>,
) -> Walk {
    let mut walk = Walk::default();
    for entry in entries {
        match entry {
            Ok(e) if e.file_type().is_some_and(|ft| ft.is_file()) => {
                let label = label_for(root, e.path());
                walk.files.push((e.into_path(), label));
            }
            Ok(_) => {}
            Err(e) => walk.errors.push(walk_error(root, &e)),
        }
    }
    walk.files.sort_by(|a, b| a.1.cmp(&b.1));
    walk
}

fn walk_error(root: &Path, error: &ignore::Error) -> String {
    match error {
        ignore::Error::WithPath { path, err } => format!("{}: {err}", label_for(root, path)),
        ignore::Error::WithDepth { err, .. } => walk_error(root, err),
        other => format!("{}: {other}", root.display()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use aalap_llm::mock::MockProvider;
    use aalap_store::{InMemoryVectorStore, OrgId};

    use super::*;
    use crate::embedder::ProviderEmbedder;
    use crate::error::IndexError;

    fn key() -> CollectionKey {
        CollectionKey::new(OrgId::new("acme").unwrap(), "documents").unwrap()
    }

    fn indexer_with(provider: MockProvider) -> (Arc<InMemoryVectorStore>, DocumentIndexer) {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(ProviderEmbedder::new(Arc::new(provider), Duration::from_secs(5)));
        let indexer = DocumentIndexer::new(store.clone(), embedder, IndexerConfig::default());
        (store, indexer)
    }

    fn small_chunks() -> OrgConfig {
        OrgConfig {
            chunk_size: 8,
            chunk_overlap: 2,
            ..OrgConfig::default()
        }
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("notes.txt"), "customers place orders every week").unwrap();
        std::fs::write(root.join("guide.md"), "# Guide\n\nHow refunds are processed.").unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() { println!(\"hi\"); }").unwrap();
        std::fs::write(root.join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join(".secret.txt"), "hidden").unwrap();
        std::fs::write(root.join(".gitignore"), "build/\n").unwrap();
        std::fs::create_dir_all(root.join("build")).unwrap();
        std::fs::write(root.join("build/out.txt"), "generated").unwrap();
        dir
    }

    #[tokio::test]
    async fn indexes_supported_files_and_skips_the_rest() {
        let dir = tree();
        let (store, indexer) = indexer_with(MockProvider::default());
        let stats = indexer
            .index(dir.path(), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap();

        assert_eq!(stats.documents, 3, "{stats:?}");
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.skipped, 1);
        assert!(stats.errors.is_empty());

        let hits = store
            .query(&key(), &aalap_llm::mock::hashed_embedding("refunds processed"), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.metadata.source, "guide.md");
        assert_eq!(hits[0].chunk.metadata.extra["title"], "Guide");
    }

    #[tokio::test]
    async fn code_files_keep_relative_source_and_language() {
        let dir = tree();
        let (store, indexer) = indexer_with(MockProvider::default());
        indexer
            .index(dir.path(), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap();
        let hits = store
            .query(&key(), &aalap_llm::mock::hashed_embedding("fn main println hi"), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.metadata.source, "src/main.rs");
        assert_eq!(hits[0].chunk.metadata.extra["language"], "rust");
    }

    #[tokio::test]
    async fn reindexing_unchanged_content_writes_nothing() {
        let dir = tree();
        let (store, indexer) = indexer_with(MockProvider::default());
        let config = OrgConfig::default();
        indexer.index(dir.path(), &key(), ContentHint::Auto, &config).await.unwrap();
        let before = store.stats(&key()).await.unwrap();

        let again = indexer.index(dir.path(), &key(), ContentHint::Auto, &config).await.unwrap();
        assert_eq!(again.unchanged, 3);
        assert_eq!(again.chunks, 0);
        assert_eq!(store.stats(&key()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn modified_file_replaces_only_its_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let long: String = (0..20).map(|i| format!("word{i} ")).collect();
        std::fs::write(dir.path().join("a.txt"), &long).unwrap();
        std::fs::write(dir.path().join("b.txt"), "stable content").unwrap();
        let (store, indexer) = indexer_with(MockProvider::default());
        let config = small_chunks();

        let first = indexer.index(dir.path(), &key(), ContentHint::Auto, &config).await.unwrap();
        assert_eq!(first.chunks, 4);

        std::fs::write(dir.path().join("a.txt"), "short now").unwrap();
        let second = indexer.index(dir.path(), &key(), ContentHint::Auto, &config).await.unwrap();
        assert_eq!(second.replaced, 1);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.chunks, 1);

        let stats = store.stats(&key()).await.unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.document_count, 2);
    }

    #[tokio::test]
    async fn changing_chunk_size_retires_old_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let long: String = (0..20).map(|i| format!("word{i} ")).collect();
        std::fs::write(dir.path().join("a.txt"), &long).unwrap();
        let (store, indexer) = indexer_with(MockProvider::default());

        indexer.index(dir.path(), &key(), ContentHint::Auto, &small_chunks()).await.unwrap();
        let stats = indexer
            .index(dir.path(), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.replaced, 1);
        assert_eq!(store.stats(&key()).await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn bad_file_is_recorded_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{oops").unwrap();
        std::fs::write(dir.path().join("good.txt"), "fine").unwrap();
        let (_, indexer) = indexer_with(MockProvider::default());

        let stats = indexer
            .index(dir.path(), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("bad.json: "), "{:?}", stats.errors);
    }

    #[test]
    fn walk_errors_are_reported_with_relative_paths() {
        let dir = tree();
        let root = dir.path();
        let denied = ignore::Error::WithDepth {
            depth: 1,
            err: Box::new(ignore::Error::WithPath {
                path: root.join("locked"),
                err: Box::new(ignore::Error::Io(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                ))),
            }),
        };

        let walk = gather(root, walker(root).chain(std::iter::once(Err(denied))));
        let labels: Vec<_> = walk.files.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(labels, ["guide.md", "logo.png", "notes.txt", "src/main.rs"]);
        assert_eq!(walk.errors.len(), 1);
        assert!(walk.errors[0].starts_with("locked: "), "{:?}", walk.errors);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_directory_is_recorded() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.txt"), "readable words").unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("hidden.txt"), "cannot see me").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // privileged users read through mode bits; nothing to observe then
        let readable = std::fs::read_dir(&locked).is_ok();

        let (_, indexer) = indexer_with(MockProvider::default());
        let stats = indexer
            .index(dir.path(), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        if readable {
            assert_eq!(stats.documents, 2);
            return;
        }
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.errors.len(), 1, "{:?}", stats.errors);
        assert!(stats.errors[0].starts_with("locked"), "{:?}", stats.errors);
    }

    #[tokio::test]
    async fn emptied_document_loses_its_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "some words").unwrap();
        let (store, indexer) = indexer_with(MockProvider::default());
        let config = OrgConfig::default();
        indexer.index(&file, &key(), ContentHint::Auto, &config).await.unwrap();

        std::fs::write(&file, "   \n").unwrap();
        let stats = indexer.index(&file, &key(), ContentHint::Auto, &config).await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 0);
        assert_eq!(store.stats(&key()).await.unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn embedding_failure_leaves_store_untouched() {
        let dir = tree();
        let (store, indexer) = indexer_with(MockProvider::default().with_failing_embeddings());
        let stats = indexer
            .index(dir.path(), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.errors.len(), 3);
        assert!(store.list_collections(key().org()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_chunking_rejected_before_any_work() {
        let dir = tree();
        let (store, indexer) = indexer_with(MockProvider::default());
        let config = OrgConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            ..OrgConfig::default()
        };
        let err = indexer
            .index(dir.path(), &key(), ContentHint::Auto, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Configuration(_)));
        assert!(store.list_collections(key().org()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let (_, indexer) = indexer_with(MockProvider::default());
        let err = indexer
            .index(Path::new("/definitely/not/here"), &key(), ContentHint::Auto, &OrgConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[tokio::test]
    async fn index_document_versions_by_identity() {
        let (store, indexer) = indexer_with(MockProvider::default());
        let config = OrgConfig::default();
        let doc = Document::new("schema:shop:customers", "database:shop/customers", aalap_store::ContentKind::Schema, "# Database Table: customers");

        assert_eq!(
            indexer.index_document(doc.clone(), &key(), &config).await.unwrap(),
            DocumentOutcome::Indexed { chunks: 1 }
        );
        assert_eq!(
            indexer.index_document(doc.clone(), &key(), &config).await.unwrap(),
            DocumentOutcome::Unchanged
        );
        let changed = Document {
            content: "# Database Table: customers\n\nid INTEGER".into(),
            ..doc
        };
        assert_eq!(
            indexer.index_document(changed, &key(), &config).await.unwrap(),
            DocumentOutcome::Replaced { removed: 1, inserted: 1 }
        );
        assert_eq!(store.stats(&key()).await.unwrap().chunk_count, 1);
    }

    #[test]
    fn stats_merge_adds_up() {
        let mut a = IndexStats {
            documents: 1,
            errors: vec!["x".into()],
            ..IndexStats::default()
        };
        a.merge(IndexStats {
            documents: 2,
            chunks: 5,
            errors: vec!["y".into()],
            ..IndexStats::default()
        });
        assert_eq!(a.documents, 3);
        assert_eq!(a.chunks, 5);
        assert_eq!(a.errors, ["x", "y"]);
    }
}
