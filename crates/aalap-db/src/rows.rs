use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo};

/// Result set with a display cap: `total_rows` counts everything the statement
/// produced, `rows` holds at most the cap.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub total_rows: usize,
}

impl QueryRows {
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.total_rows > self.rows.len()
    }

    /// Rows as `(column, value)` pairs.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }
}

/// Render a cell for prompts and terminal output.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn column_names<R: Row>(row: &R) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_owned()).collect()
}

fn from_f64(v: Option<f64>) -> Value {
    v.and_then(serde_json::Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

fn from_bytes(v: Option<Vec<u8>>) -> Value {
    v.map_or(Value::Null, |b| match String::from_utf8(b) {
        Ok(s) => Value::String(s),
        Err(e) => Value::String(format!("<{} bytes>", e.as_bytes().len())),
    })
}

fn unsupported<R: Row>(row: &R, idx: usize) -> Value {
    let type_name = row
        .columns()
        .get(idx)
        .map_or("unknown", |c| c.type_info().name());
    Value::String(format!("<{type_name}>"))
}

/// Try decoders in order; the first type sqlx accepts wins, `NULL` decodes as
/// `Value::Null` under any of them.
macro_rules! decode_with {
    ($row:expr, $idx:expr, $( $ty:ty => $conv:expr ),+ $(,)?) => {{
        $(
            if let Ok(v) = $row.try_get::<Option<$ty>, _>($idx) {
                return $conv(v);
            }
        )+
        unsupported($row, $idx)
    }};
}

pub(crate) fn sqlite_value(row: &SqliteRow, idx: usize) -> Value {
    decode_with!(row, idx,
        i64 => |v: Option<i64>| v.map_or(Value::Null, Value::from),
        f64 => from_f64,
        String => |v: Option<String>| v.map_or(Value::Null, Value::String),
        Vec<u8> => from_bytes,
    )
}

pub(crate) fn postgres_value(row: &PgRow, idx: usize) -> Value {
    decode_with!(row, idx,
        i64 => |v: Option<i64>| v.map_or(Value::Null, Value::from),
        i32 => |v: Option<i32>| v.map_or(Value::Null, Value::from),
        i16 => |v: Option<i16>| v.map_or(Value::Null, Value::from),
        f64 => from_f64,
        f32 => |v: Option<f32>| from_f64(v.map(f64::from)),
        bool => |v: Option<bool>| v.map_or(Value::Null, Value::Bool),
        String => |v: Option<String>| v.map_or(Value::Null, Value::String),
        Vec<u8> => from_bytes,
    )
}

pub(crate) fn mysql_value(row: &MySqlRow, idx: usize) -> Value {
    decode_with!(row, idx,
        i64 => |v: Option<i64>| v.map_or(Value::Null, Value::from),
        u64 => |v: Option<u64>| v.map_or(Value::Null, Value::from),
        i32 => |v: Option<i32>| v.map_or(Value::Null, Value::from),
        f64 => from_f64,
        f32 => |v: Option<f32>| from_f64(v.map(f64::from)),
        bool => |v: Option<bool>| v.map_or(Value::Null, Value::Bool),
        String => |v: Option<String>| v.map_or(Value::Null, Value::String),
        Vec<u8> => from_bytes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_value_formats() {
        assert_eq!(display_value(&Value::Null), "NULL");
        assert_eq!(display_value(&Value::String("x".into())), "x");
        assert_eq!(display_value(&serde_json::json!(3)), "3");
        assert_eq!(display_value(&serde_json::json!(true)), "true");
    }

    #[test]
    fn truncated_when_total_exceeds_rows() {
        let rows = QueryRows {
            columns: vec!["a".into()],
            rows: vec![vec![Value::from(1)]],
            total_rows: 3,
        };
        assert!(rows.truncated());
        let records: Vec<_> = rows.records().collect();
        assert_eq!(records[0], vec![("a", &Value::from(1))]);
    }

    #[test]
    fn non_utf8_bytes_are_summarized() {
        assert_eq!(
            from_bytes(Some(vec![0xff, 0xfe])),
            Value::String("<2 bytes>".into())
        );
    }
}
