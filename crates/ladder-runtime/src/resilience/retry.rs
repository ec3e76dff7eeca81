//! Retry with exponential backoff for embedding calls.
//!
//! Only encoders are wrapped. Candidate and judge calls fail straight
//! through to the caller.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::{Encoder, EncoderError};

/// Encoder decorator retrying transient failures.
pub struct RetryingEncoder {
    inner: Arc<dyn Encoder>,
    retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl RetryingEncoder {
    pub fn new(inner: Arc<dyn Encoder>, retries: usize) -> Self {
        Self {
            inner,
            retries,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }

    pub fn with_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.retries)
    }
}

#[async_trait]
impl Encoder for RetryingEncoder {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        (|| async { self.inner.embed_raw(texts).await })
            .retry(self.backoff())
            .when(EncoderError::is_transient)
            .notify(|err: &EncoderError, delay: Duration| {
                tracing::warn!(
                    encoder = %self.inner.identity(),
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "embedding failed, retrying"
                );
            })
            .await
    }
}
