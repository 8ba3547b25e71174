use std::collections::BTreeMap;

use aalap_core::QueryRecord;
use aalap_db::rows::display_value;
use aalap_index::{IndexStats, Retrieval, SchemaIndexStats};
use aalap_store::{OrgConfig, OrgId};

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn print_errors(errors: &[String]) {
    if !errors.is_empty() {
        println!("\nErrors:");
        for e in errors {
            println!("  {e}");
        }
    }
}

pub fn print_index_stats(stats: &IndexStats) {
    println!(
        "Indexed {} documents ({} chunks): {} replaced, {} unchanged, {} skipped, {} failed",
        stats.documents,
        stats.chunks,
        stats.replaced,
        stats.unchanged,
        stats.skipped,
        stats.errors.len()
    );
    print_errors(&stats.errors);
}

pub fn print_schema_stats(stats: &SchemaIndexStats) {
    println!(
        "Indexed {} tables: {} schema documents, {} sample documents, {} chunks ({} unchanged)",
        stats.tables_indexed,
        stats.schemas_indexed,
        stats.sample_documents,
        stats.index.chunks,
        stats.index.unchanged
    );
    if stats.stale_removed > 0 {
        println!("Removed {} documents of dropped tables", stats.stale_removed);
    }
    print_errors(&stats.errors);
}

pub fn print_retrieval(query: &str, retrieval: &Retrieval) {
    println!("Results for '{query}':\n");
    if retrieval.results.is_empty() {
        println!("No results found");
    }
    for (i, r) in retrieval.results.iter().enumerate() {
        println!(
            "{}. [score {:.2}, similarity {:.2}] {} ({})",
            i + 1,
            r.score,
            r.similarity,
            r.source(),
            r.collection
        );
        println!("   {}\n", preview(r.text()));
    }
    if retrieval.dropped_below_threshold > 0 {
        println!(
            "{} of {} candidates were below the similarity threshold",
            retrieval.dropped_below_threshold, retrieval.candidates
        );
    }
}

pub fn print_collections(org: &OrgId, collections: &BTreeMap<String, usize>) {
    println!("Collections for {org}:");
    if collections.is_empty() {
        println!("  none indexed yet");
    }
    for (name, count) in collections {
        println!("  {name} ({count} chunks)");
    }
}

pub fn print_org_config(org: &OrgId, config: &OrgConfig) {
    println!("Organization: {org}");
    println!("  similarity_threshold = {}", config.similarity_threshold);
    println!("  chunk_size = {}", config.chunk_size);
    println!("  chunk_overlap = {}", config.chunk_overlap);
    println!("  top_k = {}", config.top_k);
    println!("  rerank_enabled = {}", config.rerank_enabled);
    println!("  max_context_tokens = {}", config.max_context_tokens);
    if config.enabled_collections.is_empty() {
        println!("  enabled_collections = (all)");
    } else {
        println!(
            "  enabled_collections = {}",
            config.enabled_collections.join(", ")
        );
    }
}

pub fn print_query_record(record: &QueryRecord) {
    println!("SQL: {}", record.query);
    println!(
        "Schema sources: {}\n",
        record.schema_sources.join(", ")
    );
    if record.columns.is_empty() {
        println!("(no result set)");
    } else {
        println!("{}", record.columns.join(" | "));
        for row in &record.rows {
            let cells: Vec<String> = row.iter().map(display_value).collect();
            println!("{}", cells.join(" | "));
        }
    }
    if record.truncated() {
        println!("... showing {} of {} rows", record.rows.len(), record.row_count);
    } else {
        println!("({} rows)", record.row_count);
    }
    println!();
    match (&record.summary, &record.summary_degraded) {
        (Some(summary), _) => println!("{summary}"),
        (None, Some(reason)) => println!("Summary unavailable: {reason}"),
        (None, None) => {}
    }
}
