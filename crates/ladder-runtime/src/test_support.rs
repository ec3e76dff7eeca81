//! Scripted backends for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ladder_core::CandidateDescriptor;

use crate::candidate::Candidate;
use crate::cascade::Cascade;
use crate::embedding::{Encoder, EncoderError};
use crate::judge::Scorer;
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, TokenUsage,
};

type ErrorFn = Box<dyn Fn() -> ProviderError + Send + Sync>;

/// Shared record of which providers were called, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    names: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    fn push(&self, name: &str) {
        self.names.lock().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.names.lock().clone()
    }
}

/// Provider that always returns the same reply.
pub struct ScriptedProvider {
    name: String,
    reply: String,
    usage: TokenUsage,
    delay: Option<Duration>,
    failure: Option<ErrorFn>,
    log: Option<CallLog>,
    calls: AtomicUsize,
    last_config: Mutex<Option<CompletionConfig>>,
    last_messages: Mutex<Option<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            usage: TokenUsage::default(),
            delay: None,
            failure: None,
            log: None,
            calls: AtomicUsize::new(0),
            last_config: Mutex::new(None),
            last_messages: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.usage = TokenUsage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Every call fails with the produced error.
    pub fn failing(mut self, error: impl Fn() -> ProviderError + Send + Sync + 'static) -> Self {
        self.failure = Some(Box::new(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<CompletionConfig> {
        self.last_config.lock().clone()
    }

    pub fn last_messages(&self) -> Option<Vec<ChatMessage>> {
        self.last_messages.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(&self.name);
        }
        *self.last_config.lock() = Some(config.clone());
        *self.last_messages.lock() = Some(messages);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure());
        }

        Ok(CompletionResponse {
            content: self.reply.clone(),
            usage: self.usage,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Scorer with a fixed table from draft text to confidence; unknown
/// drafts score 0.
pub struct ScriptedScorer {
    scores: HashMap<String, f64>,
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(scores: &[(&str, f64)]) -> Self {
        Self {
            scores: scores.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
            delay: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, _prompt: &str, draft: &str) -> Result<f64, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ProviderError::ApiError {
                status: 500,
                message: "judge unavailable".to_string(),
            });
        }
        Ok(self.scores.get(draft).copied().unwrap_or(0.0))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Encoder with a fixed table; unknown texts map to all ones.
pub struct StaticEncoder {
    identity: String,
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
    failures_left: AtomicUsize,
    failure: Option<ErrorFn>,
    calls: AtomicUsize,
}

impl StaticEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            identity: "static/test".to_string(),
            dimension,
            table: HashMap::new(),
            delay: None,
            failures_left: AtomicUsize::new(0),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first `times` calls fail with the produced error.
    pub fn failing(
        mut self,
        times: usize,
        error: impl Fn() -> ProviderError + Send + Sync + 'static,
    ) -> Self {
        self.failures_left = AtomicUsize::new(times);
        self.failure = Some(Box::new(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for StaticEncoder {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = &self.failure {
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(EncoderError::Provider(failure()));
            }
        }

        Ok(texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![1.0; self.dimension])
            })
            .collect())
    }
}

/// Factory for the "scripted" backend kind.
///
/// Options: `{"name": ..., "reply": ...}`; both optional.
#[derive(Debug, Default)]
pub struct ScriptedFactory;

impl ProviderFactory for ScriptedFactory {
    fn provider_type(&self) -> &'static str {
        "scripted"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let name = config
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("scripted");
        let reply = config.get("reply").and_then(|v| v.as_str()).unwrap_or("");
        Ok(Arc::new(ScriptedProvider::new(name, reply)))
    }

    fn validate_config(&self, _config: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    fn create_encoder(
        &self,
        model: &str,
        dimension: usize,
        _config: &JsonValue,
    ) -> Result<Arc<dyn Encoder>, ProviderError> {
        Ok(Arc::new(
            StaticEncoder::new(dimension).with_identity(format!("scripted/{}", model)),
        ))
    }
}

/// Candidate named `name` that always answers `reply` and logs its calls.
pub fn scripted_candidate(name: &str, reply: &str, log: &CallLog) -> Candidate {
    Candidate::new(
        CandidateDescriptor::new(name, "scripted"),
        Arc::new(ScriptedProvider::new(name, reply).with_log(log)),
    )
}

/// Cascade over scripted candidates `(name, reply)` graded by a fixed
/// score table.
pub fn cascade_of(
    replies: &[(&str, &str)],
    scores: &[(&str, f64)],
    tau: f64,
    log: &CallLog,
) -> Cascade {
    Cascade::builder()
        .candidates(
            replies
                .iter()
                .map(|(name, reply)| scripted_candidate(name, reply, log)),
        )
        .scorer(Arc::new(ScriptedScorer::new(scores)))
        .threshold(tau)
        .build()
        .expect("scripted cascade should build")
}
