//! # ladder-runtime
//!
//! Async half of ladder: everything that calls a model.
//!
//! - [`providers`]: backend trait, registry and the HTTP backends
//!   (`openai`, `ollama`, each behind a cargo feature)
//! - [`Candidate`] and [`LlmJudge`]: generation and grading
//! - [`Router`]: taxonomy k-NN with a learned fallback, memoized
//! - [`Cascade`]: confidence-gated escalation, with [`Fusion`] when no
//!   draft clears the threshold
//! - [`Pipeline`]: router and cascade together
//!
//! Deterministic pieces (settings, artifacts, vote, fusion rules) live in
//! `ladder-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ladder_core::Settings;
//! use ladder_runtime::{Pipeline, ProviderRegistry};
//!
//! let settings = Settings::load("ladder.yaml")?;
//! let pipeline = Pipeline::from_settings(&settings, &ProviderRegistry::with_defaults())?;
//!
//! let answer = pipeline.answer("What is 2+2?", None).await?;
//! println!("{} (via {})", answer.outcome.answer, answer.outcome.resolution.candidate());
//! ```

pub mod cache;
pub mod cancel;
pub mod candidate;
pub mod cascade;
pub mod embedding;
pub mod fusion;
pub mod judge;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod router;

#[cfg(test)]
mod test_support;

pub use cache::RouteCache;
pub use cancel::CancelToken;
pub use candidate::{Candidate, GenerateOptions, Generation};
pub use cascade::{
    Attempt, Cascade, CascadeBuilder, CascadeError, CascadeOutcome, Resolution, Stage,
};
pub use embedding::{Encoder, EncoderError};
pub use fusion::Fusion;
pub use judge::{LlmJudge, Scorer};
pub use pipeline::{Pipeline, PipelineAnswer};
pub use providers::{LlmProvider, ProviderError, ProviderFactory, ProviderRegistry};
pub use resilience::{CascadeUsage, RetryingEncoder, UsageTracker};
pub use router::{LearnedRouter, RouteDecision, Router, RouterError, TaxonomyRouter};
