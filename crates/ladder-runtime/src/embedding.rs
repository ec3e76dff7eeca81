//! Embedding capability shared by the router and consensus fusion.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use ladder_core::settings::EmbeddingSettings;
use ladder_core::vector::normalized;

use crate::providers::{ProviderError, ProviderRegistry};
use crate::resilience::RetryingEncoder;

/// Errors from encoders.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Embedding backend failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Encoder returned {found} vectors for {expected} inputs")]
    CountMismatch { expected: usize, found: usize },

    #[error("Encoder returned {found}-dimensional vector, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl EncoderError {
    /// Transport-level failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, EncoderError::Provider(e) if e.is_transient())
    }
}

/// Text to fixed-length vector.
///
/// Implementors supply [`Encoder::embed_raw`]; callers use
/// [`Encoder::encode`] / [`Encoder::encode_batch`], which check shape and
/// return unit-length vectors.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Identity persisted with routing artifacts, e.g. `ollama/nomic-embed-text`.
    fn identity(&self) -> &str;

    /// Length of every vector this encoder produces.
    fn dimension(&self) -> usize;

    /// One backend round trip; vectors in input order, unnormalized.
    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;

    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EncoderError::CountMismatch {
            expected: 1,
            found: 0,
        })
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        let raw = self.embed_raw(texts).await?;
        if raw.len() != texts.len() {
            return Err(EncoderError::CountMismatch {
                expected: texts.len(),
                found: raw.len(),
            });
        }

        raw.into_iter()
            .map(|v| {
                if v.len() == self.dimension() {
                    Ok(normalized(v))
                } else {
                    Err(EncoderError::DimensionMismatch {
                        expected: self.dimension(),
                        found: v.len(),
                    })
                }
            })
            .collect()
    }
}

/// Build the configured encoder, wrapped with retries for transient failures.
pub fn from_settings(
    settings: &EmbeddingSettings,
    registry: &ProviderRegistry,
) -> Result<Arc<dyn Encoder>, ProviderError> {
    let encoder = registry.create_encoder(
        &settings.provider,
        &settings.model,
        settings.dimension,
        &settings.options,
    )?;

    if encoder.identity() != settings.identity() {
        tracing::warn!(
            configured = %settings.identity(),
            reported = %encoder.identity(),
            "encoder reports a different identity than configured"
        );
    }

    if settings.retries == 0 {
        return Ok(encoder);
    }
    Ok(Arc::new(RetryingEncoder::new(encoder, settings.retries)))
}
