//! Usage accounting for candidate calls.
//!
//! Spend is estimated from the per-1k-token prices on each candidate
//! descriptor. Judge calls are counted but not priced.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ladder_core::CandidateDescriptor;

use crate::providers::TokenUsage;

/// Accumulated usage for one answer or many.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeUsage {
    /// Candidate generate calls
    pub calls: u64,

    /// Judge score calls
    pub judge_calls: u64,

    /// Prompt/input tokens across candidate calls
    pub prompt_tokens: u64,

    /// Completion/output tokens across candidate calls
    pub completion_tokens: u64,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl CascadeUsage {
    /// Record one candidate call.
    pub fn add(&mut self, usage: &TokenUsage, descriptor: &CandidateDescriptor) {
        self.calls += 1;
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.estimated_cost += descriptor.estimate_cost(usage.prompt_tokens, usage.completion_tokens);
    }

    pub fn add_judge_call(&mut self) {
        self.judge_calls += 1;
    }

    pub fn merge(&mut self, other: &CascadeUsage) {
        self.calls += other.calls;
        self.judge_calls += other.judge_calls;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.estimated_cost += other.estimated_cost;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Cumulative usage shared across concurrent answers.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<CascadeUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one answer's usage into the running total.
    pub fn record(&self, usage: &CascadeUsage) {
        self.usage.write().merge(usage);
    }

    pub fn snapshot(&self) -> CascadeUsage {
        self.usage.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced() -> CandidateDescriptor {
        let mut descriptor = CandidateDescriptor::new("gpt-4o", "openai");
        descriptor.price_prompt = 0.005;
        descriptor.price_completion = 0.015;
        descriptor
    }

    #[test]
    fn test_cost_estimation() {
        let mut usage = CascadeUsage::default();
        usage.add(
            &TokenUsage {
                prompt_tokens: 1000,
                completion_tokens: 500,
            },
            &priced(),
        );

        // 1k * $0.005 + 0.5k * $0.015
        assert!((usage.estimated_cost - 0.0125).abs() < 1e-9);
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.total_tokens(), 1500);
    }

    #[test]
    fn test_free_candidate_costs_nothing() {
        let mut usage = CascadeUsage::default();
        usage.add(
            &TokenUsage {
                prompt_tokens: 10_000,
                completion_tokens: 10_000,
            },
            &CandidateDescriptor::new("llama3-8b", "ollama"),
        );
        assert_eq!(usage.estimated_cost, 0.0);
    }

    #[test]
    fn test_tracker_accumulates() {
        let tracker = UsageTracker::new();
        let mut one = CascadeUsage::default();
        one.add(
            &TokenUsage {
                prompt_tokens: 30,
                completion_tokens: 20,
            },
            &priced(),
        );
        one.add_judge_call();

        tracker.record(&one);
        tracker.record(&one);

        let total = tracker.snapshot();
        assert_eq!(total.calls, 2);
        assert_eq!(total.judge_calls, 2);
        assert_eq!(total.total_tokens(), 100);
    }
}
