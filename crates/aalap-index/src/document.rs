use std::collections::BTreeMap;

use aalap_store::ContentKind;

use crate::chunker::ChunkerConfig;

/// One logical source unit: a file, a table schema, a table's sample rows or a
/// database overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identity; re-indexing the same `doc_id` replaces its chunks.
    pub doc_id: String,
    /// Label shown to users and cited in context blocks.
    pub source: String,
    pub kind: ContentKind,
    pub content: String,
    pub extra: BTreeMap<String, String>,
}

impl Document {
    #[must_use]
    pub fn new(
        doc_id: impl Into<String>,
        source: impl Into<String>,
        kind: ContentKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            source: source.into(),
            kind,
            content: content.into(),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_owned(), value.into());
        self
    }
}

/// Line endings to `\n`, trailing whitespace stripped per line, blank edge lines
/// dropped.
#[must_use]
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Content hash bound to the chunking parameters, so changing either parameter
/// invalidates previously indexed chunks.
#[must_use]
pub fn fingerprint(normalized: &str, chunking: &ChunkerConfig) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"\0");
    hasher.update(&(chunking.chunk_size as u64).to_le_bytes());
    hasher.update(&(chunking.chunk_overlap as u64).to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unifies_line_endings() {
        assert_eq!(normalize("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn normalize_trims_trailing_whitespace_and_blank_edges() {
        assert_eq!(normalize("\n\n  a  \nb\t\n\n\n"), "  a\nb");
        assert_eq!(normalize(" \n\t\n"), "");
    }

    #[test]
    fn fingerprint_ignores_insignificant_whitespace() {
        let config = ChunkerConfig::default();
        assert_eq!(
            fingerprint(&normalize("hello \r\nworld\n"), &config),
            fingerprint(&normalize("hello\nworld"), &config)
        );
    }

    #[test]
    fn fingerprint_depends_on_chunking() {
        let a = ChunkerConfig::default();
        let b = ChunkerConfig {
            chunk_size: 200,
            ..a
        };
        assert_ne!(fingerprint("text", &a), fingerprint("text", &b));
        assert_ne!(fingerprint("text", &a), fingerprint("other", &a));
    }

    #[test]
    fn with_extra_inserts() {
        let doc = Document::new("id", "src", ContentKind::Text, "x").with_extra("title", "T");
        assert_eq!(doc.extra.get("title").map(String::as_str), Some("T"));
    }
}
