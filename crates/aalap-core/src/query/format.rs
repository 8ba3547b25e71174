use aalap_db::rows::display_value;
use serde_json::Value;

/// Render rows for the summarization prompt as `Total rows` followed by `Row i:` blocks.
///
/// `total_rows` is the full result size; at most `max_rows` of `rows` are shown.
#[must_use]
pub fn format_rows(
    columns: &[String],
    rows: &[Vec<Value>],
    total_rows: usize,
    max_rows: usize,
) -> String {
    if total_rows == 0 {
        return "No results found.".to_owned();
    }
    let shown = rows.len().min(max_rows);
    let mut out = format!("Total rows: {total_rows}\n");
    if total_rows > shown {
        out.push_str(&format!("(Showing first {shown} rows)\n"));
    }
    out.push('\n');
    for (i, row) in rows.iter().take(shown).enumerate() {
        out.push_str(&format!("Row {}:\n", i + 1));
        for (col, value) in columns.iter().zip(row) {
            out.push_str(&format!("  {col}: {}\n", display_value(value)));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_result() {
        assert_eq!(format_rows(&[], &[], 0, 100), "No results found.");
    }

    #[test]
    fn rows_with_nulls() {
        let columns = vec!["id".to_owned(), "note".to_owned()];
        let rows = vec![vec![json!(1), Value::Null], vec![json!(2), json!("vip")]];
        assert_eq!(
            format_rows(&columns, &rows, 2, 100),
            "Total rows: 2\n\nRow 1:\n  id: 1\n  note: NULL\n\nRow 2:\n  id: 2\n  note: vip\n\n"
        );
    }

    #[test]
    fn truncation_is_announced() {
        let columns = vec!["n".to_owned()];
        let rows: Vec<_> = (0..5).map(|i| vec![json!(i)]).collect();
        let text = format_rows(&columns, &rows, 40, 2);
        assert!(text.starts_with("Total rows: 40\n(Showing first 2 rows)\n"));
        assert!(text.contains("Row 2:"));
        assert!(!text.contains("Row 3:"));
    }
}
