//! Prompt context assembled from retrieval results.

use crate::retriever::RetrievalResult;

const SEPARATOR: &str = "\n---\n";

/// Rough token count: four characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltContext {
    pub text: String,
    /// Distinct sources in first-cited order.
    pub sources: Vec<String>,
    pub token_estimate: usize,
}

impl BuiltContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Number results as `[Source N: ...]` blocks until the token budget is spent.
#[must_use]
pub fn build_context(results: &[RetrievalResult], max_tokens: usize) -> BuiltContext {
    let mut ctx = BuiltContext::default();
    let mut chars = 0;
    for (i, result) in results.iter().enumerate() {
        let block = format!("[Source {}: {}]\n{}", i + 1, result.source(), result.text());
        let addition = if ctx.text.is_empty() {
            block
        } else {
            format!("{SEPARATOR}{block}")
        };
        let next_chars = chars + addition.chars().count();
        if next_chars / 4 > max_tokens {
            tracing::debug!(
                included = i,
                total = results.len(),
                max_tokens,
                "context budget reached"
            );
            break;
        }
        chars = next_chars;
        ctx.token_estimate = chars / 4;
        ctx.text.push_str(&addition);
        if !ctx.sources.iter().any(|s| s == result.source()) {
            ctx.sources.push(result.source().to_owned());
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aalap_store::{ChunkMetadata, ContentKind, StoredChunk};

    use super::*;

    fn result(source: &str, text: &str) -> RetrievalResult {
        RetrievalResult {
            chunk: StoredChunk {
                id: "id".into(),
                text: text.into(),
                metadata: ChunkMetadata {
                    source: source.into(),
                    doc_id: source.into(),
                    fingerprint: "fp".into(),
                    chunk_index: 0,
                    kind: ContentKind::Text,
                    extra: BTreeMap::new(),
                },
            },
            collection: "documents".into(),
            similarity: 0.9,
            score: 0.9,
        }
    }

    #[test]
    fn estimate_is_chars_over_four() {
        assert_eq!(estimate_tokens("Hello, world!"), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn numbers_blocks_and_dedups_sources() {
        let ctx = build_context(
            &[
                result("a.md", "first"),
                result("b.md", "second"),
                result("a.md", "third"),
            ],
            1000,
        );
        assert_eq!(
            ctx.text,
            "[Source 1: a.md]\nfirst\n---\n[Source 2: b.md]\nsecond\n---\n[Source 3: a.md]\nthird"
        );
        assert_eq!(ctx.sources, ["a.md", "b.md"]);
        assert_eq!(ctx.token_estimate, estimate_tokens(&ctx.text));
    }

    #[test]
    fn stops_at_budget() {
        let long = "x".repeat(400);
        let ctx = build_context(&[result("a", &long), result("b", &long)], 110);
        assert!(ctx.text.contains("[Source 1: a]"));
        assert!(!ctx.text.contains("[Source 2: b]"));
        assert_eq!(ctx.sources, ["a"]);
        assert!(ctx.token_estimate <= 110);
    }

    #[test]
    fn empty_input_is_empty_context() {
        assert!(build_context(&[], 100).is_empty());
    }
}
