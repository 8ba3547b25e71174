use std::collections::HashSet;

use crate::retriever::RetrievalResult;

/// Second-pass ordering over an already retrieved candidate set.
///
/// Implementations set [`RetrievalResult::score`] and reorder; they never add or
/// remove candidates.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, results: &mut [RetrievalResult]);
}

/// Boosts candidates that share vocabulary with the query:
/// `score = similarity * (1 + 0.1 * shared_terms)`.
#[derive(Debug, Clone, Copy)]
pub struct LexicalOverlapReranker {
    pub boost_per_term: f32,
}

impl Default for LexicalOverlapReranker {
    fn default() -> Self {
        Self {
            boost_per_term: 0.1,
        }
    }
}

/// Lowercase alphanumeric words of two or more characters.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

impl Reranker for LexicalOverlapReranker {
    fn rerank(&self, query: &str, results: &mut [RetrievalResult]) {
        let query_terms = terms(query);
        for result in results.iter_mut() {
            let chunk_terms = terms(&result.chunk.text);
            #[allow(clippy::cast_precision_loss)]
            let shared = query_terms.intersection(&chunk_terms).count() as f32;
            result.score = result.similarity * (1.0 + self.boost_per_term * shared);
        }
        sort_by_score(results);
    }
}

/// Stable descending sort on `score`.
pub fn sort_by_score(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}
