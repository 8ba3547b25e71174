use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Build the message list for a single-shot completion with an optional system
/// instruction.
#[must_use]
pub fn completion_messages(prompt: &str, system: Option<&str>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the model and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Embed a single text into a vector.
    ///
    /// Implementations must be deterministic for identical input, otherwise content
    /// fingerprints stop meaning anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support embeddings or the request fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Embed several texts, preserving order.
    ///
    /// The default issues one request per text.
    ///
    /// # Errors
    ///
    /// Returns the first embedding failure.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_messages_with_system() {
        let msgs = completion_messages("question", Some("be brief"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1], Message::user("question"));
    }

    #[test]
    fn completion_messages_without_system() {
        let msgs = completion_messages("question", None);
        assert_eq!(msgs, vec![Message::user("question")]);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
