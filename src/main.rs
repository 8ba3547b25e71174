//! `aalap`: organization-scoped knowledge base and natural-language database queries.
//!
//! ```bash
//! aalap index ./docs --collection documents
//! aalap index-schema sqlite://shop.db
//! aalap search "refund policy"
//! aalap query "how many customers do we have?" --db sqlite://shop.db
//! ```

mod output;

use std::path::PathBuf;

use aalap_core::bootstrap::{create_knowledge_base, resolve_org};
use aalap_core::config::{Config, resolve_config_path};
use aalap_core::{IndexOptions, RetrieveOverrides};
use aalap_db::DatabaseConnection;
use aalap_index::{ContentHint, SchemaIndexOptions, TableSelection};
use aalap_store::OrgConfig;
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aalap", version, about = "Organization-scoped knowledge base and natural-language database queries")]
struct Cli {
    /// Configuration file (TOML). Falls back to `AALAP_CONFIG`, then `aalap.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Organization to operate on. Defaults to `defaults.org`.
    #[arg(long, global = true)]
    org: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a file or directory.
    Index {
        path: PathBuf,
        #[arg(long, default_value = "documents")]
        collection: String,
        /// auto, text, markdown, code, json or pdf.
        #[arg(long = "type", default_value = "auto")]
        content_type: ContentHint,
    },

    /// Index a database schema (and sample rows) for natural-language queries.
    IndexSchema {
        /// sqlite://path, postgres://... or mysql://...
        url: String,
        /// Only these tables (comma separated).
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        #[arg(long)]
        no_samples: bool,
        #[arg(long, default_value_t = aalap_index::schema_indexer::DEFAULT_SAMPLE_ROWS)]
        sample_rows: usize,
    },

    /// Search the knowledge base.
    Search {
        query: String,
        /// Restrict to these collections (repeatable).
        #[arg(long)]
        collection: Vec<String>,
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        top_k: Option<usize>,
        /// Minimum similarity in [0, 1].
        #[arg(long, value_parser = parse_threshold)]
        threshold: Option<f32>,
        #[arg(long)]
        no_rerank: bool,
        /// Print the prompt context block instead of a result list.
        #[arg(long)]
        context: bool,
    },

    /// List collections and their chunk counts.
    Collections,

    /// Irreversibly delete one collection or every collection of the organization.
    Clear {
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        yes: bool,
    },

    /// Ask a question of a live database.
    Query {
        question: String,
        /// Connection URL of the database to query.
        #[arg(long)]
        db: String,
        /// Print the full record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show or change configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective application configuration.
    Show,
    /// Print the organization's retrieval settings.
    Org,
    /// Update organization settings, e.g. `top_k=8 similarity_threshold=0.3`.
    SetOrg {
        #[arg(required = true)]
        settings: Vec<String>,
    },
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();
    let config = Config::load(&resolve_config_path(cli.config.as_deref()))?;
    let org = resolve_org(&config, cli.org.as_deref())?;

    let kb = create_knowledge_base(&config)?;
    match cli.command {
        Command::Index {
            path,
            collection,
            content_type,
        } => {
            let stats = kb
                .index(&path, &org, &collection, &IndexOptions { hint: content_type })
                .await?;
            output::print_index_stats(&stats);
        }
        Command::IndexSchema {
            url,
            tables,
            no_samples,
            sample_rows,
        } => {
            let conn = DatabaseConnection::connect_url(&url).await?;
            let options = SchemaIndexOptions {
                collection: config.query.schema_collection.clone(),
                tables: if tables.is_empty() {
                    TableSelection::All
                } else {
                    TableSelection::Only(tables)
                },
                include_samples: !no_samples,
                sample_rows,
            };
            let result = kb.index_schema(&conn, &org, &options).await;
            conn.close().await;
            output::print_schema_stats(&result?);
        }
        Command::Search {
            query,
            collection,
            top_k,
            threshold,
            no_rerank,
            context,
        } => {
            if context {
                match kb.augment_prompt(&query, &org).await? {
                    Some(prompt) => println!("{prompt}"),
                    None => println!("No relevant context found."),
                }
            } else {
                let overrides = RetrieveOverrides {
                    collections: (!collection.is_empty()).then_some(collection),
                    top_k,
                    similarity_threshold: threshold,
                    rerank: no_rerank.then_some(false),
                };
                let retrieval = kb.retrieve(&query, &org, &overrides).await?;
                output::print_retrieval(&query, &retrieval);
            }
        }
        Command::Collections => {
            let collections = kb.list_collections(&org).await?;
            output::print_collections(&org, &collections);
        }
        Command::Clear { collection, yes } => {
            if !yes {
                bail!("clearing is irreversible; pass --yes to confirm");
            }
            let removed = kb.clear(&org, collection.as_deref()).await?;
            println!("Removed {removed} chunks from {org}");
        }
        Command::Query { question, db, json } => {
            let conn = DatabaseConnection::connect_url(&db).await?;
            let result = kb.run_query(&question, &org, &conn).await;
            conn.close().await;
            match result {
                Ok(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
                Ok(record) => output::print_query_record(&record),
                Err(failure) => {
                    if let Some(query) = &failure.synthesized_query {
                        eprintln!("SQL: {query}");
                    }
                    return Err(failure.into());
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Org => {
                let org_config = kb.org_config(&org).await?;
                output::print_org_config(&org, &org_config);
            }
            ConfigAction::SetOrg { settings } => {
                let mut org_config = kb.org_config(&org).await?;
                for setting in &settings {
                    apply_org_setting(&mut org_config, setting)?;
                }
                kb.save_org_config(&org, &org_config).await?;
                output::print_org_config(&org, &org_config);
            }
        },
    }
    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold: f32 = value.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(format!("{threshold} is not within [0, 1]"))
    }
}

fn apply_org_setting(config: &mut OrgConfig, setting: &str) -> anyhow::Result<()> {
    let (key, value) = setting
        .split_once('=')
        .with_context(|| format!("expected key=value, got {setting}"))?;
    let value = value.trim();
    let invalid = || format!("invalid value for {key}: {value}");
    match key.trim() {
        "similarity_threshold" => config.similarity_threshold = value.parse().with_context(invalid)?,
        "chunk_size" => config.chunk_size = value.parse().with_context(invalid)?,
        "chunk_overlap" => config.chunk_overlap = value.parse().with_context(invalid)?,
        "top_k" => config.top_k = value.parse().with_context(invalid)?,
        "rerank_enabled" => config.rerank_enabled = value.parse().with_context(invalid)?,
        "max_context_tokens" => config.max_context_tokens = value.parse().with_context(invalid)?,
        "enabled_collections" => {
            config.enabled_collections = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        other => bail!("unknown organization setting: {other}"),
    }
    Ok(())
}
