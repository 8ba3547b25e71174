//! Per-engine catalog queries.

use sqlx::{MySqlPool, PgPool, SqlitePool};

use crate::error::DbError;
use crate::schema::{ColumnInfo, ForeignKey, IndexInfo, TableSchema};

pub(crate) async fn sqlite_tables(pool: &SqlitePool) -> Result<Vec<String>, DbError> {
    Ok(sqlx::query_scalar(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?)
}

pub(crate) async fn sqlite_table(pool: &SqlitePool, table: &str) -> Result<TableSchema, DbError> {
    let cols: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;
    if cols.is_empty() {
        return Err(DbError::TableNotFound(table.to_owned()));
    }

    let indexes: Vec<(String, i64)> =
        sqlx::query_as("SELECT name, \"unique\" FROM pragma_index_list(?) ORDER BY seq")
            .bind(table)
            .fetch_all(pool)
            .await?;

    let fks: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?) ORDER BY id, seq",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(TableSchema {
        name: table.to_owned(),
        columns: cols
            .into_iter()
            .map(|(name, data_type, notnull, default, pk)| ColumnInfo {
                name,
                data_type,
                nullable: notnull == 0 && pk == 0,
                default,
                primary_key: pk > 0,
            })
            .collect(),
        indexes: indexes
            .into_iter()
            .map(|(name, unique)| IndexInfo {
                name,
                unique: unique != 0,
            })
            .collect(),
        foreign_keys: fks
            .into_iter()
            .map(|(column, references_table, to)| ForeignKey {
                column,
                references_table,
                // An omitted target column means the referenced table's primary key.
                references_column: to.unwrap_or_else(|| "id".to_owned()),
            })
            .collect(),
    })
}

pub(crate) async fn postgres_database(pool: &PgPool) -> Result<String, DbError> {
    Ok(sqlx::query_scalar("SELECT current_database()::text")
        .fetch_one(pool)
        .await?)
}

pub(crate) async fn postgres_tables(pool: &PgPool) -> Result<Vec<String>, DbError> {
    Ok(sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await?)
}

pub(crate) async fn postgres_table(pool: &PgPool, table: &str) -> Result<TableSchema, DbError> {
    let cols: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
        "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;
    if cols.is_empty() {
        return Err(DbError::TableNotFound(table.to_owned()));
    }

    let pks: Vec<String> = sqlx::query_scalar(
        "SELECT kcu.column_name::text \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         WHERE tc.constraint_type = 'PRIMARY KEY' \
           AND tc.table_schema = current_schema() AND tc.table_name = $1",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let indexes: Vec<(String, String)> = sqlx::query_as(
        "SELECT indexname::text, indexdef::text FROM pg_indexes \
         WHERE schemaname = current_schema() AND tablename = $1 ORDER BY indexname",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let fks: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT kcu.column_name::text, ccu.table_name::text, ccu.column_name::text \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         JOIN information_schema.constraint_column_usage ccu \
           ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
         WHERE tc.constraint_type = 'FOREIGN KEY' \
           AND tc.table_schema = current_schema() AND tc.table_name = $1",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(TableSchema {
        name: table.to_owned(),
        columns: cols
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| ColumnInfo {
                primary_key: pks.contains(&name),
                name,
                data_type,
                nullable: is_nullable.eq_ignore_ascii_case("yes"),
                default,
            })
            .collect(),
        indexes: indexes
            .into_iter()
            .map(|(name, def)| IndexInfo {
                name,
                unique: def.to_ascii_uppercase().contains("UNIQUE"),
            })
            .collect(),
        foreign_keys: fks
            .into_iter()
            .map(|(column, references_table, references_column)| ForeignKey {
                column,
                references_table,
                references_column,
            })
            .collect(),
    })
}

pub(crate) async fn mysql_database(pool: &MySqlPool) -> Result<String, DbError> {
    let name: Option<String> = sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)")
        .fetch_one(pool)
        .await?;
    Ok(name.unwrap_or_default())
}

pub(crate) async fn mysql_tables(pool: &MySqlPool) -> Result<Vec<String>, DbError> {
    Ok(sqlx::query_scalar(
        "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
    )
    .fetch_all(pool)
    .await?)
}

pub(crate) async fn mysql_table(pool: &MySqlPool, table: &str) -> Result<TableSchema, DbError> {
    let cols: Vec<(String, String, String, Option<String>, String)> = sqlx::query_as(
        "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), CAST(IS_NULLABLE AS CHAR), \
                CAST(COLUMN_DEFAULT AS CHAR), CAST(COLUMN_KEY AS CHAR) \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;
    if cols.is_empty() {
        return Err(DbError::TableNotFound(table.to_owned()));
    }

    let indexes: Vec<(String, i64)> = sqlx::query_as(
        "SELECT DISTINCT CAST(INDEX_NAME AS CHAR), CAST(NON_UNIQUE AS SIGNED) \
         FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY 1",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let fks: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT CAST(COLUMN_NAME AS CHAR), CAST(REFERENCED_TABLE_NAME AS CHAR), \
                CAST(REFERENCED_COLUMN_NAME AS CHAR) \
         FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
           AND REFERENCED_TABLE_NAME IS NOT NULL",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(TableSchema {
        name: table.to_owned(),
        columns: cols
            .into_iter()
            .map(|(name, data_type, is_nullable, default, key)| ColumnInfo {
                name,
                data_type,
                nullable: is_nullable.eq_ignore_ascii_case("yes"),
                default,
                primary_key: key == "PRI",
            })
            .collect(),
        indexes: indexes
            .into_iter()
            .map(|(name, non_unique)| IndexInfo {
                name,
                unique: non_unique == 0,
            })
            .collect(),
        foreign_keys: fks
            .into_iter()
            .map(|(column, references_table, references_column)| ForeignKey {
                column,
                references_table,
                references_column,
            })
            .collect(),
    })
}
