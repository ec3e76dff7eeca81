//! # ladder-core
//!
//! Deterministic building blocks for a confidence-gated model cascade.
//!
//! This crate holds everything that does not talk to a model:
//! - Settings loading and validation
//! - Routing artifacts (taxonomy index, learned classifier) and the k-NN vote
//! - Judge reply parsing
//! - Fusion of drafts when no candidate clears the threshold
//!
//! Network-facing pieces (backends, encoders, the cascade loop) live in
//! `ladder-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ladder_core::{Settings, TaxonomyIndex};
//!
//! let settings = Settings::load("ladder.yaml")?;
//! let index = TaxonomyIndex::load(settings.taxonomy_index.as_ref().unwrap())?;
//! let outcome = index.resolve(&query_vector, settings.router.k, settings.router.acceptance)?;
//! ```

pub mod fusion;
pub mod router;
pub mod scoring;
pub mod settings;
pub mod types;
pub mod vector;

pub use fusion::{FusionError, TieBreak};
pub use router::{ArtifactError, LinearClassifier, TaxonomyEntry, TaxonomyIndex};
pub use scoring::{confidence_or_zero, parse_confidence};
pub use settings::{Settings, SettingsError};
pub use types::{CandidateDescriptor, CandidateId, Draft, RouteOutcome};
