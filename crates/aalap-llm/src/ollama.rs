use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

const DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
        }
    }

    async fn generate_embeddings(&self, input: EmbeddingsInput) -> Result<Vec<Vec<f32>>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(self.embedding_model.clone(), input);
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama embedding request failed: {e}")))?;
        Ok(response.embeddings)
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let ollama_messages: Vec<ChatMessage> = messages.iter().map(convert_message).collect();
        let request = ChatMessageRequest::new(self.model.clone(), ollama_messages);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama chat request failed: {e}")))?;

        if response.message.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: "ollama" });
        }
        Ok(response.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.generate_embeddings(EmbeddingsInput::from(text))
            .await?
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .generate_embeddings(EmbeddingsInput::Multiple(texts.to_vec()))
            .await?;
        if vectors.len() != texts.len() {
            return Err(LlmError::Other(format!(
                "ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(msg.content.clone()),
        Role::User => ChatMessage::user(msg.content.clone()),
        Role::Assistant => ChatMessage::assistant(msg.content.clone()),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':')
        && let Ok(port) = url[colon_pos + 1..].parse::<u16>()
    {
        return (url[..colon_pos].to_string(), port);
    }
    (url.to_string(), DEFAULT_PORT)
}
