use std::path::PathBuf;

use aalap_db::ConnectionSpec;
use aalap_index::{
    DocumentIndexer, IndexerConfig, ProviderEmbedder, SchemaIndexOptions, SchemaIndexer,
};
use aalap_llm::Role;
use aalap_llm::mock::MockProvider;
use aalap_store::{InMemoryVectorStore, VectorStore};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::*;

async fn shop_db(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("shop.db");
    let pool = SqlitePoolOptions::new()
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true),
        )
        .await
        .unwrap();
    for sql in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), total REAL)",
        "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL)",
        "INSERT INTO customers (name) VALUES ('Ada'), ('Grace')",
        "INSERT INTO orders (customer_id, total) VALUES (1, 12.5), (2, 30.0)",
    ] {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool.close().await;
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    conn: DatabaseConnection,
    retriever: Arc<Retriever>,
    org: OrgId,
}

async fn fixture(index_schema: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let conn = DatabaseConnection::connect(ConnectionSpec::sqlite(shop_db(&dir).await))
        .await
        .unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(ProviderEmbedder::new(
        Arc::new(MockProvider::default()),
        Duration::from_secs(5),
    ));
    let org = OrgId::new("acme").unwrap();
    if index_schema {
        let indexer = DocumentIndexer::new(store.clone(), embedder.clone(), IndexerConfig::default());
        let stats = SchemaIndexer::new(indexer)
            .index_schema(
                &conn,
                &org,
                &SchemaIndexOptions::default(),
                &OrgConfig::default(),
            )
            .await
            .unwrap();
        assert!(stats.errors.is_empty(), "{:?}", stats.errors);
    }
    Fixture {
        _dir: dir,
        conn,
        retriever: Arc::new(Retriever::new(store, embedder)),
        org,
    }
}

fn engine(f: &Fixture, chat: &MockProvider, config: QueryEngineConfig) -> QueryEngine<MockProvider> {
    QueryEngine::new(Arc::new(chat.clone()), f.retriever.clone(), config)
}

fn scripted(replies: &[&str]) -> MockProvider {
    MockProvider::with_responses(replies.iter().map(|s| (*s).to_owned()).collect())
}

async fn run(
    f: &Fixture,
    chat: &MockProvider,
    config: QueryEngineConfig,
    question: &str,
) -> Result<QueryRecord, QueryFailure> {
    engine(f, chat, config)
        .run_query(question, &f.org, &OrgConfig::default(), &f.conn)
        .await
}

#[tokio::test]
async fn answers_a_count_question() {
    let f = fixture(true).await;
    let chat = scripted(&[
        "```sql\nSELECT COUNT(*) AS total FROM customers;\n```",
        "You have 2 customers.",
    ]);

    let record = run(&f, &chat, QueryEngineConfig::default(), "how many customers do we have?")
        .await
        .unwrap();

    assert_eq!(record.query, "SELECT COUNT(*) AS total FROM customers");
    assert!(record.schema_sources_used() >= 1);
    assert!(
        record
            .schema_sources
            .iter()
            .any(|s| s == "database:shop/customers")
    );
    assert_eq!(record.columns, ["total"]);
    assert_eq!(record.row_count, 1);
    assert_eq!(record.rows, vec![vec![json!(2)]]);
    assert_eq!(record.summary.as_deref(), Some("You have 2 customers."));
    assert!(record.summary_degraded.is_none());

    let calls = chat.chat_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][0].role, Role::System);
    assert!(calls[0][0].content.contains("exactly one SQLite query"));
    assert!(calls[0][1].content.contains("# Database Table: customers"));
    assert!(calls[1][1].content.contains("Total rows: 1"));
    assert!(calls[1][1].content.contains("SQL query: SELECT COUNT(*) AS total FROM customers"));
}

#[tokio::test]
async fn no_schema_context_stops_before_the_model() {
    let f = fixture(false).await;
    let chat = scripted(&["SELECT 1"]);

    let failure = run(&f, &chat, QueryEngineConfig::default(), "how many customers?")
        .await
        .unwrap_err();

    assert!(matches!(failure.error, QueryError::NoSchemaContext { .. }));
    assert_eq!(failure.stage, QueryStage::Idle);
    assert!(failure.synthesized_query.is_none());
    assert!(chat.chat_calls().is_empty());
}

#[tokio::test]
async fn prose_only_response_is_a_synthesis_failure() {
    let f = fixture(true).await;
    let chat = scripted(&["I am not sure which table holds that."]);

    let failure = run(&f, &chat, QueryEngineConfig::default(), "who is the CEO?")
        .await
        .unwrap_err();

    assert!(matches!(failure.error, QueryError::QuerySynthesisFailed));
    assert_eq!(failure.stage, QueryStage::SchemaRetrieved);
    assert!(failure.synthesized_query.is_none());
    assert_eq!(chat.chat_calls().len(), 1);
}

#[tokio::test]
async fn execution_error_keeps_the_query() {
    let f = fixture(true).await;
    let chat = scripted(&["SELECT * FROM invoices"]);

    let failure = run(&f, &chat, QueryEngineConfig::default(), "list invoices")
        .await
        .unwrap_err();

    assert!(matches!(failure.error, QueryError::QueryExecutionFailed { .. }));
    assert_eq!(failure.stage, QueryStage::QuerySynthesized);
    assert_eq!(
        failure.synthesized_query.as_deref(),
        Some("SELECT * FROM invoices")
    );
    // never retried, never summarized
    assert_eq!(chat.chat_calls().len(), 1);
}

#[tokio::test]
async fn writes_are_refused_without_touching_the_database() {
    let f = fixture(true).await;
    let chat = scripted(&["DELETE FROM customers"]);

    let failure = run(&f, &chat, QueryEngineConfig::default(), "remove all customers")
        .await
        .unwrap_err();

    assert!(matches!(failure.error, QueryError::QueryExecutionFailed { .. }));
    assert_eq!(failure.synthesized_query.as_deref(), Some("DELETE FROM customers"));
    let count = f.conn.execute("SELECT COUNT(*) FROM customers", 1).await.unwrap();
    assert_eq!(count.rows[0][0], json!(2));
}

#[tokio::test]
async fn write_behind_a_cte_is_refused() {
    let f = fixture(true).await;
    let chat = scripted(&["WITH doomed AS (SELECT 1) UPDATE customers SET name = 'pwned'"]);

    let failure = run(&f, &chat, QueryEngineConfig::default(), "rename every customer")
        .await
        .unwrap_err();

    assert!(matches!(failure.error, QueryError::QueryExecutionFailed { .. }));
    assert_eq!(failure.stage, QueryStage::QuerySynthesized);
    let pwned = f
        .conn
        .execute("SELECT COUNT(*) FROM customers WHERE name = 'pwned'", 1)
        .await
        .unwrap();
    assert_eq!(pwned.rows[0][0], json!(0));
}

#[tokio::test]
async fn literal_semicolon_survives_to_execution() {
    let f = fixture(true).await;
    let chat = scripted(&[
        "SELECT COUNT(*) AS n FROM customers WHERE name = 'a;b';",
        "Nobody by that name.",
    ]);

    let record = run(&f, &chat, QueryEngineConfig::default(), "how many customers are called a;b?")
        .await
        .unwrap();
    assert_eq!(record.query, "SELECT COUNT(*) AS n FROM customers WHERE name = 'a;b'");
    assert_eq!(record.rows, vec![vec![json!(0)]]);
}

#[tokio::test]
async fn empty_result_still_names_its_columns() {
    let f = fixture(true).await;
    let chat = scripted(&["SELECT id, name FROM customers WHERE id > 100", "No such customers."]);

    let record = run(&f, &chat, QueryEngineConfig::default(), "customers above id 100?")
        .await
        .unwrap();
    assert_eq!(record.row_count, 0);
    assert_eq!(record.columns, ["id", "name"]);
}

#[tokio::test]
async fn writes_run_when_allowed() {
    let f = fixture(true).await;
    let chat = scripted(&["UPDATE products SET price = 1", "Nothing to update."]);
    let config = QueryEngineConfig {
        allow_writes: true,
        ..QueryEngineConfig::default()
    };

    let record = run(&f, &chat, config, "set every product price to 1")
        .await
        .unwrap();
    assert_eq!(record.row_count, 0);
    assert!(record.rows.is_empty());
}

#[tokio::test]
async fn summary_failure_still_returns_rows() {
    let f = fixture(true).await;
    let chat = scripted(&["SELECT name FROM customers ORDER BY id"]).then_fail("summarizer down");

    let record = run(&f, &chat, QueryEngineConfig::default(), "list customer names")
        .await
        .unwrap();

    assert_eq!(record.row_count, 2);
    assert_eq!(record.rows, vec![vec![json!("Ada")], vec![json!("Grace")]]);
    assert!(record.summary.is_none());
    assert!(
        record
            .summary_degraded
            .as_deref()
            .is_some_and(|r| r.contains("summarizer down"))
    );
}

#[tokio::test]
async fn empty_summary_is_degraded() {
    let f = fixture(true).await;
    let chat = scripted(&["SELECT name FROM customers", "   "]);

    let record = run(&f, &chat, QueryEngineConfig::default(), "list customer names")
        .await
        .unwrap();
    assert!(record.summary.is_none());
    assert!(record.summary_degraded.is_some());
}

#[tokio::test]
async fn display_cap_keeps_the_full_count() {
    let f = fixture(true).await;
    let chat = scripted(&["SELECT * FROM customers", "Two customers."]);
    let config = QueryEngineConfig {
        row_display_cap: 1,
        ..QueryEngineConfig::default()
    };

    let record = run(&f, &chat, config, "show customers").await.unwrap();
    assert_eq!(record.row_count, 2);
    assert_eq!(record.rows.len(), 1);
    assert!(record.truncated());
    // the summary still sees every row
    assert!(chat.chat_calls()[1][1].content.contains("Row 2:"));
}

#[tokio::test]
async fn completion_failure_is_a_service_error() {
    let f = fixture(true).await;
    let chat = MockProvider::failing();

    let failure = run(&f, &chat, QueryEngineConfig::default(), "how many orders?")
        .await
        .unwrap_err();
    assert!(matches!(failure.error, QueryError::Service(_)));
    assert_eq!(failure.stage, QueryStage::SchemaRetrieved);
}

#[tokio::test]
async fn completion_timeout_is_a_service_error() {
    let f = fixture(true).await;
    let chat = scripted(&["SELECT 1"]).with_delay(500);
    let config = QueryEngineConfig {
        llm_timeout: Duration::from_millis(20),
        ..QueryEngineConfig::default()
    };

    let failure = run(&f, &chat, config, "how many orders?").await.unwrap_err();
    assert!(matches!(
        failure.error,
        QueryError::Service(LlmError::Timeout {
            operation: "completion",
            ..
        })
    ));
}

#[tokio::test]
async fn custom_extractor_is_used() {
    struct Fixed;
    impl QueryExtractor for Fixed {
        fn extract(&self, _response: &str) -> Option<String> {
            Some("SELECT COUNT(*) FROM orders".into())
        }
    }

    let f = fixture(true).await;
    let chat = scripted(&["whatever", "Two orders."]);
    let record = engine(&f, &chat, QueryEngineConfig::default())
        .with_extractor(Box::new(Fixed))
        .run_query("how many orders?", &f.org, &OrgConfig::default(), &f.conn)
        .await
        .unwrap();
    assert_eq!(record.query, "SELECT COUNT(*) FROM orders");
    assert_eq!(record.rows, vec![vec![json!(2)]]);
}

#[test]
fn failure_display_names_the_stage() {
    let failure = QueryFailure {
        stage: QueryStage::QuerySynthesized,
        error: QueryError::QueryExecutionFailed {
            message: "no such table: invoices".into(),
        },
        synthesized_query: Some("SELECT * FROM invoices".into()),
    };
    assert_eq!(
        failure.to_string(),
        "query failed at stage query_synthesized: query execution failed: no such table: invoices"
    );
}
