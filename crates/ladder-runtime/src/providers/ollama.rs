//! Ollama backend: `/api/chat` and `/api/embed`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use super::{
    factory::ProviderFactory, http, secrets::ApiCredential, ChatMessage, CompletionConfig,
    CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::embedding::{Encoder, EncoderError};

/// Optional bearer token for Ollama instances behind an auth proxy.
pub const OLLAMA_API_KEY_ENV: &str = "OLLAMA_API_KEY";

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

fn with_auth(
    request: reqwest::RequestBuilder,
    credential: &Option<ApiCredential>,
) -> reqwest::RequestBuilder {
    match credential {
        Some(cred) => request.bearer_auth(cred.expose()),
        None => request,
    }
}

fn load_credential(config: &JsonValue) -> Option<ApiCredential> {
    ApiCredential::optional_from_config_or_env(
        config,
        "api_key",
        OLLAMA_API_KEY_ENV,
        "Ollama API key",
    )
}

/// Ollama chat provider.
#[derive(Debug)]
pub struct OllamaProvider {
    credential: Option<ApiCredential>,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Build from backend options (`base_url`, optional `api_key`).
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: load_credential(config),
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            client: http::client()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            stream: false,
            options: ChatOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
        };

        let body: ChatResponse = http::send_json(
            with_auth(
                self.client.post(format!("{}/api/chat", self.base_url)),
                &self.credential,
            )
            .json(&request),
            config.timeout,
        )
        .await?;

        let content = body.message.content;
        let usage = TokenUsage {
            prompt_tokens: body.prompt_eval_count.unwrap_or_else(|| {
                messages.iter().map(|m| self.estimate_tokens(&m.content)).sum()
            }),
            completion_tokens: body
                .eval_count
                .unwrap_or_else(|| self.estimate_tokens(&content)),
        };

        Ok(CompletionResponse {
            content,
            usage,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama `/api/embed` encoder.
#[derive(Debug)]
pub struct OllamaEncoder {
    identity: String,
    model: String,
    dimension: usize,
    credential: Option<ApiCredential>,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaEncoder {
    pub fn from_config(
        model: &str,
        dimension: usize,
        config: &JsonValue,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            identity: format!("ollama/{}", model),
            model: model.to_string(),
            dimension,
            credential: load_credential(config),
            base_url: http::base_url(config, DEFAULT_BASE_URL)?,
            client: http::client()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Encoder for OllamaEncoder {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let body: EmbedResponse = http::send_json(
            with_auth(
                self.client.post(format!("{}/api/embed", self.base_url)),
                &self.credential,
            )
            .json(&request),
            EMBEDDING_TIMEOUT,
        )
        .await?;

        Ok(body.embeddings)
    }
}

/// Factory for the `ollama` backend kind.
///
/// ## Options
/// ```json
/// {
///   "base_url": "http://localhost:11434",   // Optional
///   "api_key": "..."                        // Optional, falls back to OLLAMA_API_KEY
/// }
/// ```
pub struct OllamaProviderFactory;

impl ProviderFactory for OllamaProviderFactory {
    fn provider_type(&self) -> &'static str {
        "ollama"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OllamaProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        http::base_url(config, DEFAULT_BASE_URL).map(|_| ())
    }

    fn create_encoder(
        &self,
        model: &str,
        dimension: usize,
        config: &JsonValue,
    ) -> Result<Arc<dyn Encoder>, ProviderError> {
        Ok(Arc::new(OllamaEncoder::from_config(model, dimension, config)?))
    }
}
