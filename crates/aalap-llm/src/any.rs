#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

// one arm per backend, each binding the inner provider as `$p`
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::OpenAi($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

/// The backend selected by configuration, dispatched statically.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    OpenAi(OpenAiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegates_name() {
        let p = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "m".into(),
            "e".into(),
        ));
        assert_eq!(p.name(), "ollama");

        let p = AnyProvider::OpenAi(OpenAiProvider::new(
            None,
            "http://localhost".into(),
            "m".into(),
            16,
            None,
        ));
        assert_eq!(p.name(), "openai");
        assert!(!p.supports_embeddings());
    }
}
