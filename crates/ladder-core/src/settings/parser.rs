//! Settings parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fusion::TieBreak;
use crate::types::CandidateDescriptor;

use super::schema::validate_settings_schema;

/// Confidence threshold used when `thresholds.confidence` is absent.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Errors that can occur when loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Settings do not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Settings validation failed: {0}")]
    ValidationError(String),
}

/// Router tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterSettings {
    /// Neighbors consulted by the majority vote
    pub k: usize,

    /// Top similarity must exceed this to accept a taxonomy match
    pub acceptance: f32,

    /// Memoized prompt -> route entries (0 disables the cache)
    pub cache_capacity: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            k: 3,
            acceptance: 0.80,
            cache_capacity: 128,
        }
    }
}

fn default_retries() -> usize {
    3
}

/// Embedding backend used by the router and consensus fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Backend kind ("openai", "ollama")
    pub provider: String,

    /// Embedding model name
    pub model: String,

    /// Vector length produced by the model
    pub dimension: usize,

    /// Retries for transient failures
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Backend-specific options (api_key, base_url, ...)
    #[serde(default)]
    pub options: JsonValue,
}

impl EmbeddingSettings {
    /// Identity persisted alongside routing artifacts, e.g. `ollama/nomic-embed-text`.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Fusion policy selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionSettings {
    pub tie_break: TieBreak,
}

/// Per-call time limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Limit on one candidate generate call
    #[serde(with = "duration_str")]
    pub candidate: Duration,

    /// Limit on one judge call
    #[serde(with = "duration_str")]
    pub judge: Duration,

    /// Limit on one encoder call, for routing and consensus fusion
    #[serde(with = "duration_str")]
    pub embedding: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            candidate: Duration::from_secs(60),
            judge: Duration::from_secs(30),
            embedding: Duration::from_secs(30),
        }
    }
}

/// Sampling options applied to every candidate call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,

    /// Per-call cap; the effective cap is the minimum of this and the
    /// candidate's own `max_tokens`
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

fn default_judge_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_judge_provider() -> String {
    "openai".to_string()
}

/// Full cascade configuration. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Candidates in escalation order (cheapest first)
    pub models: Vec<CandidateDescriptor>,

    /// Model used by the judge
    #[serde(default = "default_judge_model")]
    pub judge_model: String,

    /// Backend kind used by the judge
    #[serde(default = "default_judge_provider")]
    pub judge_provider: String,

    /// Backend options for the judge
    #[serde(default)]
    pub judge_options: JsonValue,

    /// Named thresholds; `confidence` is tau
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,

    /// Persisted taxonomy index
    #[serde(default)]
    pub taxonomy_index: Option<PathBuf>,

    /// Persisted classifier checkpoint
    #[serde(default)]
    pub learned_ckpt: Option<PathBuf>,

    #[serde(default)]
    pub router: RouterSettings,

    #[serde(default)]
    pub embedding: Option<EmbeddingSettings>,

    #[serde(default)]
    pub fusion: FusionSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub generation: GenerationSettings,
}

impl Settings {
    /// Read `path` as YAML (`.yaml`/`.yml`) or JSON (anything else).
    ///
    /// Relative artifact paths are resolved against the settings file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut settings = if is_yaml {
            Self::from_yaml(&contents)?
        } else {
            Self::from_json(&contents)?
        };

        if let Some(base) = path.parent() {
            settings.resolve_paths(base);
        }
        Ok(settings)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let raw: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(raw)
    }

    /// Parse settings from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let raw: JsonValue = serde_json::from_str(json)?;
        Self::from_value(raw)
    }

    fn from_value(raw: JsonValue) -> Result<Self, SettingsError> {
        validate_settings_schema(&raw).map_err(SettingsError::SchemaError)?;
        let settings: Settings = serde_json::from_value(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// The acceptance threshold tau.
    pub fn confidence_threshold(&self) -> f64 {
        self.thresholds
            .get("confidence")
            .copied()
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD)
    }

    /// Whether any routing artifact is configured.
    pub fn has_router(&self) -> bool {
        self.taxonomy_index.is_some() || self.learned_ckpt.is_some()
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.taxonomy_index, &mut self.learned_ckpt]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Check invariants the schema cannot express.
    fn validate(&self) -> Result<(), SettingsError> {
        if self.models.is_empty() {
            return Err(SettingsError::ValidationError(
                "at least one model is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name.as_str()) {
                return Err(SettingsError::ValidationError(format!(
                    "Duplicate model name: {}",
                    model.name
                )));
            }
        }

        let tau = self.confidence_threshold();
        if !(0.0..=1.0).contains(&tau) {
            return Err(SettingsError::ValidationError(format!(
                "thresholds.confidence must be within [0, 1], got {}",
                tau
            )));
        }

        if self.router.k == 0 {
            return Err(SettingsError::ValidationError(
                "router.k must be at least 1".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.router.acceptance) {
            return Err(SettingsError::ValidationError(format!(
                "router.acceptance must be within [-1, 1], got {}",
                self.router.acceptance
            )));
        }

        if self.embedding.is_none() {
            if self.has_router() {
                return Err(SettingsError::ValidationError(
                    "routing artifacts require an `embedding` section".to_string(),
                ));
            }
            if self.fusion.tie_break == TieBreak::Consensus {
                return Err(SettingsError::ValidationError(
                    "consensus tie-break requires an `embedding` section".to_string(),
                ));
            }
        }

        if let Some(embedding) = &self.embedding {
            if embedding.dimension == 0 {
                return Err(SettingsError::ValidationError(
                    "embedding.dimension must be positive".to_string(),
                ));
            }
        }

        if [self.timeouts.candidate, self.timeouts.judge, self.timeouts.embedding]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(SettingsError::ValidationError(
                "timeouts must be non-zero".to_string(),
            ));
        }

        if self.models.windows(2).any(|w| w[1].cost() < w[0].cost()) {
            tracing::warn!(
                order = ?self.models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                "models are not ordered by ascending cost; configured order is kept"
            );
        }

        Ok(())
    }
}
