//! Scorers: confidence in a (prompt, draft) pair.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use ladder_core::{parse_confidence, Settings};

use crate::prompts::{judge_user_message, JUDGE_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError, ProviderRegistry};

/// Output cap for judge replies.
pub const JUDGE_MAX_TOKENS: u32 = 4;

/// Anything that can grade a draft.
///
/// # Contract
/// - Returns a confidence in [0, 1]
/// - A reply that is not a number is confidence 0, not an error
/// - An `Err` means the backend itself failed
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, prompt: &str, draft: &str) -> Result<f64, ProviderError>;

    /// Scorer name for logs.
    fn name(&self) -> &str;
}

/// Judge backed by a chat model.
pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    model: String,
    timeout: Duration,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve `judge_provider` / `judge_model` / `judge_options`.
    pub fn from_settings(
        settings: &Settings,
        registry: &ProviderRegistry,
    ) -> Result<Self, ProviderError> {
        let provider = registry.create(&settings.judge_provider, &settings.judge_options)?;
        Ok(Self::new(provider, settings.judge_model.clone()).with_timeout(settings.timeouts.judge))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Scorer for LlmJudge {
    async fn score(&self, prompt: &str, draft: &str) -> Result<f64, ProviderError> {
        let config = CompletionConfig {
            model: self.model.clone(),
            max_tokens: JUDGE_MAX_TOKENS,
            temperature: 0.0,
            timeout: self.timeout,
        };
        let messages = vec![
            ChatMessage::system(JUDGE_SYSTEM_PROMPT),
            ChatMessage::user(judge_user_message(prompt, draft)),
        ];

        let response = self.provider.complete(messages, &config).await?;

        Ok(match parse_confidence(&response.content) {
            Some(confidence) => confidence,
            None => {
                tracing::warn!(
                    judge = %self.model,
                    reply = %response.content.trim(),
                    "judge reply is not a number, scoring 0"
                );
                0.0
            }
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    async fn judge_with_reply(reply: &str) -> (f64, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new("judge", reply));
        let judge = LlmJudge::new(provider.clone(), "gpt-3.5-turbo");
        let score = judge.score("2+2?", "4").await.unwrap();
        (score, provider)
    }

    #[tokio::test]
    async fn test_numeric_reply() {
        let (score, _) = judge_with_reply("0.85").await;
        assert_eq!(score, 0.85);

        let (score, _) = judge_with_reply("Score: 0.7.").await;
        assert_eq!(score, 0.7);
    }

    #[tokio::test]
    async fn test_out_of_range_clamped() {
        let (score, _) = judge_with_reply("7").await;
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn test_unparseable_reply_scores_zero() {
        let (score, _) = judge_with_reply("Looks right").await;
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn test_request_is_strict_and_short() {
        let (_, provider) = judge_with_reply("1").await;

        let config = provider.last_config().unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.max_tokens, JUDGE_MAX_TOKENS);
        assert_eq!(config.temperature, 0.0);

        let messages = provider.last_messages().unwrap();
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.starts_with("Prompt:\n2+2?"));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new("judge", "").failing(|| ProviderError::AuthError));
        let judge = LlmJudge::new(provider, "gpt-3.5-turbo");
        assert!(matches!(
            judge.score("q", "a").await,
            Err(ProviderError::AuthError)
        ));
    }
}
