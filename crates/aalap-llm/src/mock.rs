//! Test-only mock provider.
//!
//! Chat replies are scripted; embeddings are a hashed bag of words, so texts sharing
//! vocabulary land close together and identical texts always embed identically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

pub const MOCK_EMBEDDING_DIM: usize = 64;

#[derive(Debug, Clone)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
    embed_calls: Arc<Mutex<usize>>,
    pub default_response: String,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before answering a chat or embedding call.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            embed_calls: Arc::new(Mutex::new(0)),
            default_response: "mock response".into(),
            supports_embeddings: true,
            fail_chat: false,
            fail_embed: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    /// Queue a chat failure after the already scripted replies.
    #[must_use]
    pub fn then_fail(self, reason: &str) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(reason.to_owned()));
        self
    }

    #[must_use]
    pub fn with_failing_embeddings(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Every message list passed to `chat`, in call order.
    #[must_use]
    pub fn chat_calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn embed_call_count(&self) -> usize {
        *self.embed_calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

/// Deterministic bag-of-words embedding, L2-normalized.
#[must_use]
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0_f32; MOCK_EMBEDDING_DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in word.bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        #[allow(clippy::cast_possible_truncation)]
        let slot = (hash % MOCK_EMBEDDING_DIM as u64) as usize;
        v[slot] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.pause().await;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(LlmError::Other(reason)),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.pause().await;
        *self.embed_calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported { provider: "mock" });
        }
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(hashed_embedding(text))
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_then_default() {
        let p = MockProvider::with_responses(vec!["one".into()]);
        assert_eq!(p.chat(&[Message::user("a")]).await.unwrap(), "one");
        assert_eq!(p.chat(&[Message::user("b")]).await.unwrap(), "mock response");
        assert_eq!(p.chat_calls().len(), 2);
    }

    #[tokio::test]
    async fn then_fail_errors_in_order() {
        let p = MockProvider::with_responses(vec!["ok".into()]).then_fail("down");
        assert!(p.chat(&[]).await.is_ok());
        assert!(p.chat(&[]).await.is_err());
    }

    #[test]
    fn hashed_embedding_is_deterministic_and_normalized() {
        let a = hashed_embedding("customers table");
        let b = hashed_embedding("customers table");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashed_embedding_of_empty_text_is_zero() {
        assert!(hashed_embedding("  ").iter().all(|x| *x == 0.0));
    }
}
