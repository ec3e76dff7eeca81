//! The cascade: confidence-gated escalation over ordered candidates.
//!
//! # State machine
//!
//! ```text
//! Pending -> Trying(start) -> Trying(start+1) -> ... -> Escalating -> Terminated
//!                 |                  |
//!                 +---- c >= tau ----+--------------------------> Terminated
//! ```
//!
//! - Candidates run strictly in configured order, one at a time.
//! - The first draft scoring at least tau ends the run; later candidates
//!   are never invoked.
//! - If none clears tau, every collected draft goes to fusion.
//! - Backend failures propagate to the caller. Nothing is retried.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use ladder_core::settings::{GenerationSettings, TimeoutSettings};
use ladder_core::{CandidateId, Draft, FusionError, Settings};

use crate::cancel::{guarded, CancelToken, Interrupt};
use crate::candidate::{Candidate, GenerateOptions};
use crate::embedding::{Encoder, EncoderError};
use crate::fusion::Fusion;
use crate::judge::{LlmJudge, Scorer};
use crate::providers::{ProviderError, ProviderRegistry};
use crate::resilience::{CascadeUsage, UsageTracker};
use crate::router::RouterError;

/// Which call a timeout interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Score,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Generate => write!(f, "generate"),
            Stage::Score => write!(f, "score"),
        }
    }
}

/// Errors from building or running a cascade.
#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Candidate '{candidate}' failed: {source}")]
    Provider {
        candidate: CandidateId,
        #[source]
        source: ProviderError,
    },

    #[error("Judge failed on draft from '{candidate}': {source}")]
    Judge {
        candidate: CandidateId,
        #[source]
        source: ProviderError,
    },

    #[error("{stage} call for '{candidate}' timed out after {limit:?}")]
    Timeout {
        stage: Stage,
        candidate: CandidateId,
        limit: Duration,
    },

    #[error("Encoder '{encoder}' timed out after {limit:?}")]
    EncoderTimeout { encoder: String, limit: Duration },

    #[error("Answer cancelled")]
    Cancelled,

    #[error("Fusion failed: {0}")]
    Fusion(#[from] FusionError),

    #[error("Routing failed: {0}")]
    Routing(#[from] RouterError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EncoderError),

    #[error("Unknown candidate: '{0}'")]
    UnknownCandidate(String),
}

/// How the final answer was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// A draft cleared tau
    Accepted {
        candidate: CandidateId,
        confidence: f64,
    },

    /// No draft cleared tau; fusion picked one
    Fused {
        candidate: CandidateId,
        confidence: f64,
    },
}

impl Resolution {
    pub fn candidate(&self) -> &str {
        match self {
            Resolution::Accepted { candidate, .. } | Resolution::Fused { candidate, .. } => {
                candidate
            }
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Resolution::Accepted { confidence, .. } | Resolution::Fused { confidence, .. } => {
                *confidence
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Accepted { .. } => "accepted",
            Resolution::Fused { .. } => "fused",
        }
    }
}

/// One candidate invocation within an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub candidate: CandidateId,
    pub confidence: f64,

    /// Generate plus score, wall clock
    pub latency_ms: u64,
}

/// Everything known about one answered prompt.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeOutcome {
    pub answer: String,
    pub resolution: Resolution,

    /// Attempts in invocation order
    pub attempts: Vec<Attempt>,
    pub usage: CascadeUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

enum State {
    Pending,
    Trying(usize),
    Escalating,
    Terminated(Resolution, String),
}

/// Builder for [`Cascade`].
pub struct CascadeBuilder {
    candidates: Vec<Candidate>,
    scorer: Option<Arc<dyn Scorer>>,
    tau: f64,
    fusion: Fusion,
    generation: GenerationSettings,
    timeouts: TimeoutSettings,
}

impl Default for CascadeBuilder {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            scorer: None,
            tau: ladder_core::settings::DEFAULT_CONFIDENCE_THRESHOLD,
            fusion: Fusion::Shortest,
            generation: GenerationSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl CascadeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate; call order is escalation order.
    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn candidates(mut self, candidates: impl IntoIterator<Item = Candidate>) -> Self {
        self.candidates.extend(candidates);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn threshold(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn fusion(mut self, fusion: Fusion) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutSettings) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn build(self) -> Result<Cascade, CascadeError> {
        if self.candidates.is_empty() {
            return Err(CascadeError::Config(
                "cascade needs at least one candidate".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.candidates.iter().find(|c| !seen.insert(c.name())) {
            return Err(CascadeError::Config(format!(
                "duplicate candidate '{}'",
                dup.name()
            )));
        }

        if !(0.0..=1.0).contains(&self.tau) {
            return Err(CascadeError::Config(format!(
                "confidence threshold must be within [0, 1], got {}",
                self.tau
            )));
        }

        let scorer = self
            .scorer
            .ok_or_else(|| CascadeError::Config("cascade needs a scorer".to_string()))?;

        if self
            .candidates
            .windows(2)
            .any(|w| w[1].descriptor().cost() < w[0].descriptor().cost())
        {
            tracing::warn!(
                order = ?self.candidates.iter().map(Candidate::name).collect::<Vec<_>>(),
                "candidates are not in ascending cost order; configured order is kept"
            );
        }

        Ok(Cascade {
            candidates: self.candidates,
            scorer,
            tau: self.tau,
            fusion: self.fusion,
            generation: self.generation,
            timeouts: self.timeouts,
            usage: UsageTracker::new(),
        })
    }
}

/// Sequential, confidence-gated escalation over candidates.
///
/// Immutable after construction except for the cumulative usage counter,
/// so one instance can serve concurrent answers.
pub struct Cascade {
    candidates: Vec<Candidate>,
    scorer: Arc<dyn Scorer>,
    tau: f64,
    fusion: Fusion,
    generation: GenerationSettings,
    timeouts: TimeoutSettings,
    usage: UsageTracker,
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cascade")
            .field("candidates", &self.candidates)
            .field("scorer", &self.scorer.name())
            .field("tau", &self.tau)
            .field("fusion", &self.fusion)
            .finish()
    }
}

impl Cascade {
    pub fn builder() -> CascadeBuilder {
        CascadeBuilder::new()
    }

    /// Build from settings: one candidate per configured model, the
    /// configured judge, tau, and fusion policy.
    ///
    /// Unknown backend kinds fail here.
    pub fn from_settings(
        settings: &Settings,
        registry: &ProviderRegistry,
        encoder: Option<Arc<dyn Encoder>>,
    ) -> Result<Self, CascadeError> {
        let candidates = settings
            .models
            .iter()
            .map(|descriptor| {
                Candidate::from_descriptor(descriptor.clone(), registry).map_err(|e| {
                    CascadeError::Config(format!("model '{}': {}", descriptor.name, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let judge = LlmJudge::from_settings(settings, registry)
            .map_err(|e| CascadeError::Config(format!("judge: {}", e)))?;

        Cascade::builder()
            .candidates(candidates)
            .scorer(Arc::new(judge))
            .threshold(settings.confidence_threshold())
            .fusion(Fusion::from_tie_break(settings.fusion.tie_break, encoder)?)
            .generation(settings.generation.clone())
            .timeouts(settings.timeouts.clone())
            .build()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn threshold(&self) -> f64 {
        self.tau
    }

    pub fn fusion(&self) -> &Fusion {
        &self.fusion
    }

    /// Index of a candidate in escalation order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c.name() == name)
    }

    /// Usage accumulated across every answer so far.
    pub fn usage(&self) -> CascadeUsage {
        self.usage.snapshot()
    }

    /// Answer `prompt`, returning only the text.
    pub async fn answer(&self, prompt: &str) -> Result<String, CascadeError> {
        Ok(self.answer_detailed(prompt, None, None).await?.answer)
    }

    /// Answer starting at a routed candidate. Candidates before it are
    /// skipped; the rest keep their configured order.
    pub async fn answer_from(&self, prompt: &str, start: &str) -> Result<String, CascadeError> {
        Ok(self.answer_detailed(prompt, Some(start), None).await?.answer)
    }

    /// Answer with a token that aborts whichever call is in flight.
    pub async fn answer_cancellable(
        &self,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, CascadeError> {
        Ok(self.answer_detailed(prompt, None, Some(cancel)).await?.answer)
    }

    /// Run the state machine and report how the answer was reached.
    pub async fn answer_detailed(
        &self,
        prompt: &str,
        start: Option<&str>,
        cancel: Option<&CancelToken>,
    ) -> Result<CascadeOutcome, CascadeError> {
        let first = match start {
            Some(name) => self
                .position(name)
                .ok_or_else(|| CascadeError::UnknownCandidate(name.to_string()))?,
            None => 0,
        };

        let started_at = Utc::now();
        let mut drafts: Vec<Draft> = Vec::new();
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut usage = CascadeUsage::default();

        let result = self
            .run(prompt, first, cancel, &mut drafts, &mut attempts, &mut usage)
            .await;
        // Spend is real even when the answer failed
        self.usage.record(&usage);
        let (resolution, answer) = result?;

        tracing::info!(
            resolution = resolution.kind(),
            candidate = %resolution.candidate(),
            confidence = resolution.confidence(),
            tau = self.tau,
            attempts = attempts.len(),
            "cascade terminated"
        );

        Ok(CascadeOutcome {
            answer,
            resolution,
            attempts,
            usage,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run(
        &self,
        prompt: &str,
        first: usize,
        cancel: Option<&CancelToken>,
        drafts: &mut Vec<Draft>,
        attempts: &mut Vec<Attempt>,
        usage: &mut CascadeUsage,
    ) -> Result<(Resolution, String), CascadeError> {
        let options = GenerateOptions::from_settings(&self.generation, self.timeouts.candidate);
        let mut state = State::Pending;

        loop {
            state = match state {
                State::Pending => {
                    if first >= self.candidates.len() {
                        return Err(CascadeError::Config(
                            "no candidates to try".to_string(),
                        ));
                    }
                    State::Trying(first)
                }

                State::Trying(i) => {
                    if cancel.is_some_and(CancelToken::is_cancelled) {
                        return Err(CascadeError::Cancelled);
                    }

                    let candidate = &self.candidates[i];
                    let began = Instant::now();
                    let draft = self.attempt(candidate, prompt, &options, cancel, usage).await?;
                    let latency_ms = began.elapsed().as_millis() as u64;

                    tracing::debug!(
                        candidate = %candidate.name(),
                        confidence = draft.confidence,
                        tau = self.tau,
                        elapsed_ms = latency_ms,
                        "candidate scored"
                    );
                    attempts.push(Attempt {
                        candidate: draft.candidate.clone(),
                        confidence: draft.confidence,
                        latency_ms,
                    });

                    if draft.confidence >= self.tau {
                        let resolution = Resolution::Accepted {
                            candidate: draft.candidate,
                            confidence: draft.confidence,
                        };
                        State::Terminated(resolution, draft.text)
                    } else {
                        drafts.push(draft);
                        if i + 1 < self.candidates.len() {
                            State::Trying(i + 1)
                        } else {
                            State::Escalating
                        }
                    }
                }

                State::Escalating => {
                    tracing::debug!(
                        drafts = drafts.len(),
                        tie_break = %self.fusion.tie_break(),
                        "no draft cleared threshold, fusing"
                    );
                    let winner = self
                        .fusion
                        .fuse(drafts.as_slice(), self.timeouts.embedding, cancel)
                        .await?;
                    let resolution = Resolution::Fused {
                        candidate: winner.candidate.clone(),
                        confidence: winner.confidence,
                    };
                    State::Terminated(resolution, winner.text.clone())
                }

                State::Terminated(resolution, answer) => return Ok((resolution, answer)),
            };
        }
    }

    /// Generate then score with one candidate.
    async fn attempt(
        &self,
        candidate: &Candidate,
        prompt: &str,
        options: &GenerateOptions,
        cancel: Option<&CancelToken>,
        usage: &mut CascadeUsage,
    ) -> Result<Draft, CascadeError> {
        let interrupted = |stage: Stage, limit: Duration| {
            move |interrupt: Interrupt| match interrupt {
                Interrupt::Cancelled => CascadeError::Cancelled,
                Interrupt::TimedOut => CascadeError::Timeout {
                    stage,
                    candidate: candidate.name().to_string(),
                    limit,
                },
            }
        };

        let limit = self.timeouts.candidate;
        let generation = guarded(candidate.generate(prompt, options), limit, cancel)
            .await
            .map_err(interrupted(Stage::Generate, limit))?
            .map_err(|source| CascadeError::Provider {
                candidate: candidate.name().to_string(),
                source,
            })?;
        usage.add(&generation.usage, candidate.descriptor());

        let limit = self.timeouts.judge;
        let confidence = guarded(self.scorer.score(prompt, &generation.text), limit, cancel)
            .await
            .map_err(interrupted(Stage::Score, limit))?
            .map_err(|source| CascadeError::Judge {
                candidate: candidate.name().to_string(),
                source,
            })?;
        usage.add_judge_call();

        Ok(Draft::new(
            candidate.name(),
            generation.text,
            sanitize_confidence(candidate.name(), confidence),
        ))
    }
}

/// Scores outside [0, 1] are clamped; a non-finite score counts as 0, like
/// an unreadable judge reply.
fn sanitize_confidence(candidate: &str, confidence: f64) -> f64 {
    if !confidence.is_finite() {
        tracing::warn!(candidate = %candidate, confidence, "scorer returned a non-finite score, scoring 0");
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}
