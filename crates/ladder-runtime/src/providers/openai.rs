//! OpenAI backend: chat completions and embeddings.
//!
//! Any server speaking the OpenAI wire format works by setting `base_url`
//! in the backend options.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use super::{
    factory::ProviderFactory,
    http,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::embedding::{Encoder, EncoderError};

/// Environment variable consulted when `options.api_key` is absent.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI chat completions provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "OpenAI API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http::client()?,
        })
    }

    /// Build from backend options (`api_key`, `base_url`).
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::from_config_or_env(
                config,
                "api_key",
                OPENAI_API_KEY_ENV,
                "OpenAI API key",
            )?,
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            client: http::client()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let body: ChatResponse = http::send_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(self.credential.expose())
                .json(&request),
            config.timeout,
        )
        .await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();

        let usage = match body.usage {
            Some(u) => TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            },
            None => TokenUsage {
                prompt_tokens: messages.iter().map(|m| self.estimate_tokens(&m.content)).sum(),
                completion_tokens: self.estimate_tokens(&content),
            },
        };

        Ok(CompletionResponse {
            content,
            usage,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// OpenAI `/embeddings` encoder.
pub struct OpenAiEncoder {
    identity: String,
    model: String,
    dimension: usize,
    request_dimensions: bool,
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEncoder")
            .field("identity", &self.identity)
            .field("dimension", &self.dimension)
            .field("credential", &self.credential)
            .finish()
    }
}

impl OpenAiEncoder {
    pub fn from_config(
        model: &str,
        dimension: usize,
        config: &JsonValue,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            identity: format!("openai/{}", model),
            model: model.to_string(),
            dimension,
            request_dimensions: config["request_dimensions"].as_bool().unwrap_or(false),
            credential: ApiCredential::from_config_or_env(
                config,
                "api_key",
                OPENAI_API_KEY_ENV,
                "OpenAI API key",
            )?,
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            client: http::client()?,
        })
    }

    fn request<'a>(&'a self, texts: &'a [String]) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions.then_some(self.dimension),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    // Only the text-embedding-3 family accepts this
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Encoder for OpenAiEncoder {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        let request = self.request(texts);

        let mut body: EmbeddingResponse = http::send_json(
            self.client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(self.credential.expose())
                .json(&request),
            EMBEDDING_TIMEOUT,
        )
        .await?;

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Factory for the `openai` backend kind.
///
/// ## Options
/// ```json
/// {
///   "api_key": "sk-...",            // Optional, falls back to OPENAI_API_KEY
///   "base_url": "https://...",      // Optional, OpenAI-compatible endpoint
///   "request_dimensions": true      // Optional, ask embeddings for `dimension` values
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in options or {} env",
                OPENAI_API_KEY_ENV
            )));
        }
        http::base_url(config, DEFAULT_BASE_URL).map(|_| ())
    }

    fn create_encoder(
        &self,
        model: &str,
        dimension: usize,
        config: &JsonValue,
    ) -> Result<Arc<dyn Encoder>, ProviderError> {
        Ok(Arc::new(OpenAiEncoder::from_config(model, dimension, config)?))
    }
}
