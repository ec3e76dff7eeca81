//! Shared data model for ladder.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Identifier of a candidate (the configured model name).
pub type CandidateId = String;

fn default_max_tokens() -> u32 {
    512
}

/// Static description of one candidate in the escalation order.
///
/// Immutable once settings are loaded. Prices are only used to sanity-check
/// ordering at construction time and to estimate spend afterwards; they are
/// never consulted when deciding which candidate to call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateDescriptor {
    /// Unique candidate id (e.g., "llama3-8b")
    pub name: CandidateId,

    /// Backend kind (e.g., "openai", "ollama"); resolved by a provider registry
    pub provider: String,

    /// Underlying model identifier sent to the backend; defaults to `name`
    #[serde(default)]
    pub engine: Option<String>,

    /// Price in USD per 1k prompt tokens
    #[serde(default)]
    pub price_prompt: f64,

    /// Price in USD per 1k completion tokens
    #[serde(default)]
    pub price_completion: f64,

    /// Explicit ordering cost; overrides the price sum when present
    #[serde(default)]
    pub cost: Option<f64>,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Backend-specific options (api_key, base_url, ...)
    #[serde(default)]
    pub options: JsonValue,
}

impl CandidateDescriptor {
    /// Create a descriptor with zero cost and default limits.
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            engine: None,
            price_prompt: 0.0,
            price_completion: 0.0,
            cost: None,
            max_tokens: default_max_tokens(),
            options: JsonValue::Null,
        }
    }

    /// Model identifier sent to the backend.
    pub fn engine(&self) -> &str {
        self.engine.as_deref().unwrap_or(&self.name)
    }

    /// Ordering cost: the explicit `cost` if set, else the combined
    /// per-1k-token price.
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(self.price_prompt + self.price_completion)
    }

    /// Estimated spend in USD for one call.
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000.0) * self.price_prompt
            + (completion_tokens as f64 / 1_000.0) * self.price_completion
    }
}

/// A generated answer together with the judge's confidence in it.
///
/// Lives only for the duration of one cascade invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    /// Candidate that produced the text
    pub candidate: CandidateId,

    /// Generated answer
    pub text: String,

    /// Judge confidence in [0, 1]
    pub confidence: f64,
}

impl Draft {
    pub fn new(candidate: impl Into<String>, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            candidate: candidate.into(),
            text: text.into(),
            confidence,
        }
    }
}

/// Result of a taxonomy lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "outcome", content = "candidate", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// A confident match naming a candidate
    Candidate(CandidateId),

    /// No reference prompt was similar enough; defer to the learned router
    Ambiguous,
}

impl RouteOutcome {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RouteOutcome::Ambiguous)
    }

    /// The routed candidate, if any.
    pub fn candidate(&self) -> Option<&str> {
        match self {
            RouteOutcome::Candidate(id) => Some(id.as_str()),
            RouteOutcome::Ambiguous => None,
        }
    }
}
