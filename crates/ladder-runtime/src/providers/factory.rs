//! Provider factory pattern for dynamic backend registration.
//!
//! Backends register factories that build generation providers (and,
//! where the backend offers one, an embedding encoder) from the JSON
//! `options` object of a settings entry.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("ollama", &descriptor.options)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::embedding::Encoder;

/// Factory for creating backends from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Backend kind as written in settings, e.g. "openai" or "ollama".
    fn provider_type(&self) -> &'static str;

    /// Create a generation provider from backend options.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate options without creating a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Create an embedding encoder. Backends without embeddings keep the
    /// default, which refuses.
    fn create_encoder(
        &self,
        _model: &str,
        _dimension: usize,
        _config: &JsonValue,
    ) -> Result<Arc<dyn Encoder>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "'{}' does not provide embeddings",
            self.provider_type()
        )))
    }
}

/// Registry of available backend factories, keyed by backend kind.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same kind.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// Create a generation provider by backend kind.
    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(provider_type)?.create(config)
    }

    /// Create an embedding encoder by backend kind.
    pub fn create_encoder(
        &self,
        provider_type: &str,
        model: &str,
        dimension: usize,
        config: &JsonValue,
    ) -> Result<Arc<dyn Encoder>, ProviderError> {
        self.factory(provider_type)?
            .create_encoder(model, dimension, config)
    }

    /// Validate options for a backend kind.
    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    /// List registered backend kinds.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registry with every backend compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));

        #[cfg(feature = "ollama")]
        registry.register(Arc::new(super::OllamaProviderFactory));

        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
