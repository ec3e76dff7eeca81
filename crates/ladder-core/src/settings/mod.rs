//! Settings parsing and validation.
//!
//! Settings are structured data validated against an embedded JSON Schema
//! before being deserialized and checked for semantic invariants.

mod parser;
mod schema;

pub use parser::{
    EmbeddingSettings, FusionSettings, GenerationSettings, RouterSettings, Settings,
    SettingsError, TimeoutSettings, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use schema::validate_settings_schema;
