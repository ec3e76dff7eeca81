//! Resilience and accounting for runtime calls.
//!
//! This module provides:
//! - Retry with exponential backoff for encoders
//! - Usage and spend accounting for candidate calls

mod retry;
mod usage;

pub use retry::RetryingEncoder;
pub use usage::{CascadeUsage, UsageTracker};
