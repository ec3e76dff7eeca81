//! Learned classifier: a linear model over prompt embeddings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{uniform_dimension, ArtifactError};
use crate::vector::dot;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointArtifact {
    encoder: String,
    labels: Vec<String>,
    weights: Vec<Vec<f32>>,
    #[serde(default)]
    bias: Vec<f32>,
}

/// Linear classifier mapping an embedding to one candidate label.
///
/// One weight row and one bias term per label. The bias may be omitted in
/// the checkpoint, in which case it is all zeros.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    encoder: String,
    dimension: usize,
    labels: Vec<String>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl LinearClassifier {
    pub fn new(
        encoder: impl Into<String>,
        labels: Vec<String>,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
    ) -> Result<Self, ArtifactError> {
        if labels.is_empty() {
            return Err(ArtifactError::Malformed(
                "classifier has no labels".to_string(),
            ));
        }
        if weights.len() != labels.len() {
            return Err(ArtifactError::Malformed(format!(
                "{} labels but {} weight rows",
                labels.len(),
                weights.len()
            )));
        }
        let dimension = uniform_dimension(&weights, "classifier weights")?;

        let bias = if bias.is_empty() {
            vec![0.0; labels.len()]
        } else if bias.len() == labels.len() {
            bias
        } else {
            return Err(ArtifactError::Malformed(format!(
                "{} labels but {} bias terms",
                labels.len(),
                bias.len()
            )));
        };

        Ok(Self {
            encoder: encoder.into(),
            dimension,
            labels,
            weights,
            bias,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let ckpt: CheckpointArtifact = serde_json::from_str(json)?;
        Self::new(ckpt.encoder, ckpt.labels, ckpt.weights, ckpt.bias)
    }

    /// Load a checkpoint file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Same contract as [`super::TaxonomyIndex::check_encoder`].
    pub fn check_encoder(&self, identity: &str, dimension: usize) -> Result<(), ArtifactError> {
        if identity != self.encoder {
            return Err(ArtifactError::EncoderMismatch {
                expected: self.encoder.clone(),
                found: identity.to_string(),
            });
        }
        if dimension != self.dimension {
            return Err(ArtifactError::DimensionMismatch {
                expected: self.dimension,
                found: dimension,
            });
        }
        Ok(())
    }

    /// Raw per-label scores for an embedding.
    pub fn scores(&self, x: &[f32]) -> Result<Vec<f32>, ArtifactError> {
        if x.len() != self.dimension {
            return Err(ArtifactError::DimensionMismatch {
                expected: self.dimension,
                found: x.len(),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| dot(w, x) + b)
            .collect())
    }

    /// The highest-scoring label. The earliest label wins equal scores.
    pub fn predict(&self, x: &[f32]) -> Result<&str, ArtifactError> {
        let scores = self.scores(x)?;

        let mut best = 0;
        for (i, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[best] {
                best = i;
            }
        }
        Ok(&self.labels[best])
    }
}
