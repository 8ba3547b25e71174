use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};
use crate::retry::RateLimitRetry;

/// Provider for any endpoint speaking the OpenAI chat-completions and embeddings API.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: Option<String>,
        mut base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            max_tokens,
            embedding_model,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn post(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    async fn send_json<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<String, LlmError> {
        let response = RateLimitRetry::default()
            .run("openai", || self.post(endpoint).json(body).send())
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("OpenAI API error {status} on /{endpoint}: {text}");
            return Err(LlmError::Status {
                provider: "openai",
                status: status.as_u16(),
            });
        }
        Ok(text)
    }

    async fn embed_inputs(&self, input: EmbeddingInput<'_>) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported { provider: "openai" })?;

        let text = self
            .send_json("embeddings", &EmbeddingRequest { input, model })
            .await?;
        let mut resp: EmbeddingResponse = serde_json::from_str(&text)?;
        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let api_messages: Vec<ApiMessage<'_>> = messages
            .iter()
            .map(|m| ApiMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect();
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens: self.max_tokens,
        };

        let text = self.send_json("chat/completions", &body).await?;
        let resp: ChatResponse = serde_json::from_str(&text)?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse { provider: "openai" })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_inputs(EmbeddingInput::One(text))
            .await?
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "openai" })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embed_inputs(EmbeddingInput::Many(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(LlmError::Other(format!(
                "openai returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai"
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    One(&'a str),
    Many(&'a [String]),
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: EmbeddingInput<'a>,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
