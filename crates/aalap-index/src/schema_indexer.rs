//! Database schemas as searchable documents.

use aalap_db::DatabaseConnection;
use aalap_store::{CollectionKey, ContentKind, OrgConfig, OrgId};
use serde::Serialize;

use crate::chunker::{Chunker, ChunkerConfig};
use crate::document::Document;
use crate::error::Result;
use crate::indexer::{DocumentIndexer, IndexStats};
use crate::schema_render::{render_overview, render_samples, render_table};

pub const DEFAULT_SCHEMA_COLLECTION: &str = "database";
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TableSelection {
    #[default]
    All,
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIndexOptions {
    pub collection: String,
    pub tables: TableSelection,
    pub include_samples: bool,
    pub sample_rows: usize,
}

impl Default for SchemaIndexOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_SCHEMA_COLLECTION.to_owned(),
            tables: TableSelection::All,
            include_samples: true,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaIndexStats {
    pub index: IndexStats,
    pub tables_indexed: usize,
    pub schemas_indexed: usize,
    pub sample_documents: usize,
    /// Documents of tables that no longer exist, dropped on full runs.
    pub stale_removed: usize,
    /// Per-table introspection, sampling or indexing failures.
    pub errors: Vec<String>,
}

/// Renders each table into schema and sample documents and indexes them through
/// [`DocumentIndexer::index_document`], so unchanged tables are skipped on re-runs.
///
/// A run over [`TableSelection::All`] also rewrites the database overview and drops
/// documents of tables that were removed from the database. A run over
/// [`TableSelection::Only`] leaves the overview and other tables untouched.
#[derive(Debug, Clone)]
pub struct SchemaIndexer {
    indexer: DocumentIndexer,
}

impl SchemaIndexer {
    #[must_use]
    pub fn new(indexer: DocumentIndexer) -> Self {
        Self { indexer }
    }

    /// # Errors
    ///
    /// Returns an error for an invalid collection name or chunking parameters, or when
    /// the table list itself cannot be read. Per-table failures land in
    /// [`SchemaIndexStats::errors`].
    pub async fn index_schema(
        &self,
        conn: &DatabaseConnection,
        org: &OrgId,
        options: &SchemaIndexOptions,
        config: &OrgConfig,
    ) -> Result<SchemaIndexStats> {
        let key = CollectionKey::new(org.clone(), options.collection.clone())?;
        Chunker::new(ChunkerConfig::from(config))?;

        let database = conn.database_name().await?;
        let dialect = conn.dialect();
        let available = conn.list_tables().await?;
        let mut stats = SchemaIndexStats::default();

        let full_run = matches!(options.tables, TableSelection::All);
        let tables: Vec<String> = match &options.tables {
            TableSelection::All => available,
            TableSelection::Only(wanted) => wanted
                .iter()
                .filter(|t| {
                    let found = available.contains(*t);
                    if !found {
                        stats.errors.push(format!("{t}: table not found"));
                    }
                    found
                })
                .cloned()
                .collect(),
        };

        tracing::info!(
            org = %org,
            database = %database,
            target = %conn.target(),
            tables = tables.len(),
            "schema indexing started"
        );

        let mut overview = Vec::with_capacity(tables.len());
        for table in &tables {
            let schema = match conn.describe_table(table).await {
                Ok(schema) => schema,
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "failed to describe table");
                    stats.errors.push(format!("{table}: {e}"));
                    continue;
                }
            };
            overview.push((table.clone(), schema.columns.len()));

            let doc = Document::new(
                format!("schema:{database}:{table}"),
                format!("database:{database}/{table}"),
                ContentKind::Schema,
                render_table(&database, dialect, &schema),
            )
            .with_extra("table", table.as_str())
            .with_extra("database", database.as_str())
            .with_extra("database_type", conn.kind().to_string());
            if self.index_one(doc, &key, config, &mut stats).await {
                stats.schemas_indexed += 1;
            }
            stats.tables_indexed += 1;

            if options.include_samples && options.sample_rows > 0 {
                match conn.sample_rows(table, options.sample_rows).await {
                    Ok(rows) if rows.rows.is_empty() => {
                        tracing::debug!(table = %table, "table is empty, no sample document");
                        let doc_id = format!("data:{database}:{table}");
                        self.remove_one(&doc_id, &key, &mut stats).await;
                    }
                    Ok(rows) => {
                        let doc = Document::new(
                            format!("data:{database}:{table}"),
                            format!("database:{database}/{table} (samples)"),
                            ContentKind::SampleRows,
                            render_samples(table, &rows),
                        )
                        .with_extra("table", table.as_str())
                        .with_extra("database", database.as_str());
                        if self.index_one(doc, &key, config, &mut stats).await {
                            stats.sample_documents += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(table = %table, error = %e, "failed to sample table");
                        stats.errors.push(format!("{table}: sampling failed: {e}"));
                    }
                }
            }
        }

        if full_run {
            self.prune(&database, &tables, &key, &mut stats).await;
        }

        if full_run && overview.is_empty() {
            self.remove_one(&format!("overview:{database}"), &key, &mut stats).await;
        } else if full_run {
            let doc = Document::new(
                format!("overview:{database}"),
                format!("database:{database}"),
                ContentKind::Overview,
                render_overview(&database, dialect, &overview),
            )
            .with_extra("database", database.as_str());
            self.index_one(doc, &key, config, &mut stats).await;
        }

        tracing::info!(
            org = %org,
            database = %database,
            tables = stats.tables_indexed,
            chunks = stats.index.chunks,
            errors = stats.errors.len(),
            "schema indexing finished"
        );
        Ok(stats)
    }

    /// Drop schema and sample documents of `database` whose table is not in `tables`.
    async fn prune(
        &self,
        database: &str,
        tables: &[String],
        key: &CollectionKey,
        stats: &mut SchemaIndexStats,
    ) {
        let ids = match self.indexer.document_ids(key).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(collection = %key, error = %e, "cannot list documents to prune");
                stats.errors.push(format!("{key}: {e}"));
                return;
            }
        };
        let prefixes = [format!("schema:{database}:"), format!("data:{database}:")];
        for doc_id in ids {
            let stale = prefixes.iter().any(|prefix| {
                doc_id
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|table| !tables.iter().any(|t| t == table))
            });
            if stale {
                self.remove_one(&doc_id, key, stats).await;
            }
        }
    }

    async fn remove_one(&self, doc_id: &str, key: &CollectionKey, stats: &mut SchemaIndexStats) {
        match self.indexer.remove_document(key, doc_id).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(doc_id = %doc_id, removed, "removed stale schema document");
                stats.stale_removed += 1;
            }
            Err(e) => {
                tracing::warn!(doc_id = %doc_id, error = %e, "failed to remove schema document");
                stats.errors.push(format!("{doc_id}: {e}"));
            }
        }
    }

    async fn index_one(
        &self,
        doc: Document,
        key: &CollectionKey,
        config: &OrgConfig,
        stats: &mut SchemaIndexStats,
    ) -> bool {
        let doc_id = doc.doc_id.clone();
        match self.indexer.index_document(doc, key, config).await {
            Ok(outcome) => {
                stats.index.record(outcome);
                true
            }
            Err(e) => {
                tracing::warn!(doc_id = %doc_id, error = %e, "failed to index schema document");
                stats.errors.push(format!("{doc_id}: {e}"));
                false
            }
        }
    }
}
