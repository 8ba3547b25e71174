//! Markdown renderings of database schemas, sample rows and overviews.
//!
//! These documents are what the query engine retrieves as schema context, so they
//! spell out column names and ready-made query shapes.

use std::fmt::Write;

use aalap_db::rows::display_value;
use aalap_db::{QueryRows, TableSchema};

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Schema document for one table.
#[must_use]
pub fn render_table(database: &str, dialect: &str, table: &TableSchema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Database Table: {}", table.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "Database: {database} ({dialect})");
    let _ = writeln!(out);
    let _ = writeln!(out, "## Columns");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Column | Type | Nullable | Default | Key |");
    let _ = writeln!(out, "|--------|------|----------|---------|-----|");
    for col in &table.columns {
        let key = if col.primary_key {
            "PRIMARY KEY"
        } else if table.foreign_keys.iter().any(|fk| fk.column == col.name) {
            "FOREIGN KEY"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            cell(&col.name),
            cell(&col.data_type),
            if col.nullable { "YES" } else { "NO" },
            cell(col.default.as_deref().unwrap_or("")),
            key
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Available Columns");
    let _ = writeln!(out);
    for col in &table.columns {
        let _ = writeln!(out, "- {} ({})", col.name, col.data_type);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Query Hints");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Count rows: `SELECT COUNT(*) FROM {};`", table.name);
    let _ = writeln!(out, "- All columns: `SELECT * FROM {} LIMIT 10;`", table.name);
    if let Some(pk) = table.primary_keys().next() {
        let _ = writeln!(
            out,
            "- Lookup by key: `SELECT * FROM {} WHERE {} = ?;`",
            table.name, pk.name
        );
    }

    if !table.indexes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Indexes");
        let _ = writeln!(out);
        for idx in &table.indexes {
            let _ = writeln!(
                out,
                "- {}{}",
                idx.name,
                if idx.unique { " (unique)" } else { "" }
            );
        }
    }

    if !table.foreign_keys.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Foreign Keys");
        let _ = writeln!(out);
        for fk in &table.foreign_keys {
            let _ = writeln!(
                out,
                "- {} -> {}.{}",
                fk.column, fk.references_table, fk.references_column
            );
            let _ = writeln!(
                out,
                "  Join: `SELECT * FROM {t} JOIN {rt} ON {t}.{c} = {rt}.{rc};`",
                t = table.name,
                c = fk.column,
                rt = fk.references_table,
                rc = fk.references_column
            );
        }
    }

    out
}

/// Sample rows document, one `Row n:` block per row.
#[must_use]
pub fn render_samples(table: &str, rows: &QueryRows) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Sample Data: {table}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Columns: {}", rows.columns.join(", "));
    for (i, record) in rows.records().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Row {}:", i + 1);
        for (column, value) in record {
            let _ = writeln!(out, "  {column}: {}", display_value(value));
        }
    }
    out
}

/// Overview of every indexed table with its column count.
#[must_use]
pub fn render_overview(database: &str, dialect: &str, tables: &[(String, usize)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Database Overview: {database}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Engine: {dialect}");
    let _ = writeln!(out, "Tables: {}", tables.len());
    let _ = writeln!(out);
    for (name, columns) in tables {
        let _ = writeln!(out, "- {name} ({columns} columns)");
    }
    out
}
