use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::org::OrgId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Markdown,
    Code,
    Json,
    Pdf,
    Schema,
    SampleRows,
    Overview,
}

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Code => "code",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Schema => "schema",
            Self::SampleRows => "sample_rows",
            Self::Overview => "overview",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "code" => Ok(Self::Code),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            "schema" => Ok(Self::Schema),
            "sample_rows" => Ok(Self::SampleRows),
            "overview" => Ok(Self::Overview),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// Provenance carried by every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Human-readable origin: relative path, file name or `database:{db}/{table}`.
    pub source: String,
    /// Document identity shared by all chunks of one document.
    pub doc_id: String,
    pub fingerprint: String,
    pub chunk_index: usize,
    pub kind: ContentKind,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A nearest-neighbour hit, tagged with where it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMatch {
    pub org: OrgId,
    pub collection: String,
    pub chunk: StoredChunk,
    /// Cosine similarity clamped to `[0, 1]`.
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub chunk_count: usize,
    pub document_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub removed: usize,
    pub inserted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_round_trips_through_str() {
        for kind in [
            ContentKind::Text,
            ContentKind::Markdown,
            ContentKind::Code,
            ContentKind::Json,
            ContentKind::Pdf,
            ContentKind::Schema,
            ContentKind::SampleRows,
            ContentKind::Overview,
        ] {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_content_kind_is_rejected() {
        assert!("video".parse::<ContentKind>().is_err());
    }
}
