//! Candidates: one configured model bound to its backend.

use std::sync::Arc;
use std::time::Duration;

use ladder_core::settings::GenerationSettings;
use ladder_core::CandidateDescriptor;

use crate::providers::{
    ChatMessage, CompletionConfig, LlmProvider, ProviderError, ProviderRegistry, TokenUsage,
};

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,

    /// Requested cap; the descriptor's own limit still applies
    pub max_tokens: u32,

    /// Passed to the backend as its request timeout
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GenerateOptions {
    pub fn from_settings(generation: &GenerationSettings, timeout: Duration) -> Self {
        Self {
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            timeout,
        }
    }
}

/// Text produced by one generate call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// A descriptor plus the backend that serves it.
#[derive(Clone)]
pub struct Candidate {
    descriptor: CandidateDescriptor,
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.descriptor.name)
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl Candidate {
    pub fn new(descriptor: CandidateDescriptor, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            descriptor,
            provider,
        }
    }

    /// Resolve the descriptor's backend kind through the registry.
    ///
    /// Unknown kinds fail here, at construction, never at call time.
    pub fn from_descriptor(
        descriptor: CandidateDescriptor,
        registry: &ProviderRegistry,
    ) -> Result<Self, ProviderError> {
        let provider = registry.create(&descriptor.provider, &descriptor.options)?;
        Ok(Self::new(descriptor, provider))
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &CandidateDescriptor {
        &self.descriptor
    }

    /// Output cap actually sent: the smaller of the two limits.
    pub fn effective_max_tokens(&self, options: &GenerateOptions) -> u32 {
        self.descriptor.max_tokens.min(options.max_tokens)
    }

    /// Send `prompt` as a single user message.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let config = CompletionConfig {
            model: self.descriptor.engine().to_string(),
            max_tokens: self.effective_max_tokens(options),
            temperature: options.temperature,
            timeout: options.timeout,
        };

        let response = self
            .provider
            .complete(vec![ChatMessage::user(prompt)], &config)
            .await?;

        Ok(Generation {
            text: response.content,
            usage: response.usage,
        })
    }
}
