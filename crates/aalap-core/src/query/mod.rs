//! Natural-language questions answered against a live database.
//!
//! A query moves through [`QueryStage`]s: schema chunks are retrieved from the
//! organization's schema collection, the model writes one statement, the statement runs
//! with a display cap, and the model summarizes the rows. A failure keeps the furthest
//! stage reached and any statement already synthesized.

pub mod extract;
pub mod format;
mod prompt;

use std::sync::Arc;
use std::time::Duration;

use aalap_db::DatabaseConnection;
use aalap_index::{Retriever, RetrieveOptions, build_context};
use aalap_llm::provider::completion_messages;
use aalap_llm::{LlmError, LlmProvider};
use aalap_store::{OrgConfig, OrgId};
use serde::Serialize;
use serde_json::Value;

use crate::config::{Config, QueryConfig};
use crate::error::QueryError;

pub use extract::{FencedSqlExtractor, QueryExtractor, is_read_only};
pub use format::format_rows;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Idle,
    SchemaRetrieved,
    QuerySynthesized,
    Executed,
    Summarized,
}

impl QueryStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SchemaRetrieved => "schema_retrieved",
            Self::QuerySynthesized => "query_synthesized",
            Self::Executed => "executed",
            Self::Summarized => "summarized",
        }
    }
}

impl std::fmt::Display for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed query. `summary` is `None` when summarization failed; the
/// reason is in `summary_degraded` and the rows are still here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub question: String,
    /// Schema documents the statement was synthesized from.
    pub schema_sources: Vec<String>,
    pub query: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    /// First `row_display_cap` rows.
    pub rows: Vec<Vec<Value>>,
    pub summary: Option<String>,
    pub summary_degraded: Option<String>,
}

impl QueryRecord {
    #[must_use]
    pub fn schema_sources_used(&self) -> usize {
        self.schema_sources.len()
    }

    #[must_use]
    pub fn truncated(&self) -> bool {
        self.row_count > self.rows.len()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("query failed at stage {stage}: {error}")]
pub struct QueryFailure {
    /// Furthest stage reached before the failure.
    pub stage: QueryStage,
    #[source]
    pub error: QueryError,
    pub synthesized_query: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryEngineConfig {
    pub schema_collection: String,
    pub row_display_cap: usize,
    pub summary_sample_rows: usize,
    pub schema_context_tokens: usize,
    pub allow_writes: bool,
    pub llm_timeout: Duration,
}

impl Default for QueryEngineConfig {
    fn default() -> Self {
        Self::from_parts(&QueryConfig::default(), Duration::from_secs(120))
    }
}

impl QueryEngineConfig {
    fn from_parts(query: &QueryConfig, llm_timeout: Duration) -> Self {
        Self {
            schema_collection: query.schema_collection.clone(),
            row_display_cap: query.row_display_cap,
            summary_sample_rows: query.summary_sample_rows,
            schema_context_tokens: query.schema_context_tokens,
            allow_writes: query.allow_writes,
            llm_timeout,
        }
    }
}

impl From<&Config> for QueryEngineConfig {
    fn from(config: &Config) -> Self {
        Self::from_parts(
            &config.query,
            Duration::from_secs(config.timeouts.llm_seconds),
        )
    }
}

/// Runs the retrieve, synthesize, execute, summarize loop for one question.
pub struct QueryEngine<P> {
    provider: Arc<P>,
    retriever: Arc<Retriever>,
    extractor: Box<dyn QueryExtractor>,
    config: QueryEngineConfig,
}

impl<P> std::fmt::Debug for QueryEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Failure builder that remembers how far the query got.
struct Progress {
    stage: QueryStage,
    query: Option<String>,
}

impl Progress {
    fn fail(&self, error: impl Into<QueryError>) -> QueryFailure {
        QueryFailure {
            stage: self.stage,
            error: error.into(),
            synthesized_query: self.query.clone(),
        }
    }
}

impl<P: LlmProvider> QueryEngine<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, retriever: Arc<Retriever>, config: QueryEngineConfig) -> Self {
        Self {
            provider,
            retriever,
            extractor: Box::new(FencedSqlExtractor),
            config,
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn QueryExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn config(&self) -> &QueryEngineConfig {
        &self.config
    }

    /// Answer `question` against `conn` using the schema indexed for `org`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryFailure`] when no schema context exists, the model produces no
    /// statement, the statement is rejected or fails to execute, or the completion
    /// service fails during synthesis. A failed summary is not an error.
    pub async fn run_query(
        &self,
        question: &str,
        org: &OrgId,
        org_config: &OrgConfig,
        conn: &DatabaseConnection,
    ) -> Result<QueryRecord, QueryFailure> {
        let mut progress = Progress {
            stage: QueryStage::Idle,
            query: None,
        };

        let options =
            RetrieveOptions::from_config(org_config).in_collection(&self.config.schema_collection);
        let retrieval = self
            .retriever
            .retrieve(question, org, &options)
            .await
            .map_err(|e| progress.fail(e))?;
        if retrieval.results.is_empty() {
            tracing::warn!(
                org = %org,
                collection = %self.config.schema_collection,
                dropped = retrieval.dropped_below_threshold,
                "no schema context for question"
            );
            return Err(progress.fail(QueryError::NoSchemaContext {
                collection: self.config.schema_collection.clone(),
            }));
        }
        let context = build_context(&retrieval.results, self.config.schema_context_tokens);
        progress.stage = QueryStage::SchemaRetrieved;
        tracing::info!(
            org = %org,
            sources = context.sources.len(),
            tokens = context.token_estimate,
            "schema context retrieved"
        );

        let response = self
            .complete(
                &prompt::synthesis_prompt(&context.text, question),
                &prompt::synthesis_system(conn.dialect()),
            )
            .await
            .map_err(|e| progress.fail(e))?;
        let Some(query) = self.extractor.extract(&response) else {
            tracing::warn!(org = %org, "model response contained no statement");
            return Err(progress.fail(QueryError::QuerySynthesisFailed));
        };
        progress.stage = QueryStage::QuerySynthesized;
        progress.query = Some(query.clone());
        tracing::debug!(org = %org, query = %query, "query synthesized");

        if !self.config.allow_writes && !is_read_only(&query) {
            return Err(progress.fail(QueryError::QueryExecutionFailed {
                message: "statement is not read-only and writes are disabled".into(),
            }));
        }

        let fetch_cap = self
            .config
            .row_display_cap
            .max(self.config.summary_sample_rows);
        let executed = if self.config.allow_writes {
            conn.execute(&query, fetch_cap).await
        } else {
            conn.execute_read_only(&query, fetch_cap).await
        };
        let mut rows = executed.map_err(|e| progress.fail(e))?;
        progress.stage = QueryStage::Executed;
        tracing::info!(
            org = %org,
            target = %conn.target(),
            rows = rows.total_rows,
            "query executed"
        );

        let results = format_rows(
            &rows.columns,
            &rows.rows,
            rows.total_rows,
            self.config.summary_sample_rows,
        );
        let (summary, summary_degraded) = match self
            .complete(
                &prompt::summary_prompt(question, &query, &results),
                prompt::SUMMARY_SYSTEM,
            )
            .await
        {
            Ok(text) if !text.trim().is_empty() => (Some(text.trim().to_owned()), None),
            Ok(_) => {
                tracing::warn!(org = %org, "summary degraded: empty response");
                (None, Some("empty summary response".to_owned()))
            }
            Err(e) => {
                tracing::warn!(org = %org, error = %e, "summary degraded");
                (None, Some(e.to_string()))
            }
        };

        rows.rows.truncate(self.config.row_display_cap);
        Ok(QueryRecord {
            question: question.to_owned(),
            schema_sources: context.sources,
            query,
            columns: rows.columns,
            row_count: rows.total_rows,
            rows: rows.rows,
            summary,
            summary_degraded,
        })
    }

    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let messages = completion_messages(prompt, Some(system));
        match tokio::time::timeout(self.config.llm_timeout, self.provider.chat(&messages)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                operation: "completion",
                seconds: self.config.llm_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
