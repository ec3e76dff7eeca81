//! Routing artifacts: taxonomy index and learned classifier.
//!
//! Both artifacts are loaded once, validated eagerly, and are read-only
//! afterwards. Each one records the identity of the encoder that produced
//! its vectors so a live encoder can be checked against it.

mod classifier;
mod index;

pub use classifier::LinearClassifier;
pub use index::{Neighbor, TaxonomyEntry, TaxonomyIndex, EXACT_MATCH_EPSILON};

use thiserror::Error;

/// Errors from loading or querying routing artifacts.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read artifact: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse artifact: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Malformed artifact: {0}")]
    Malformed(String),

    #[error("Encoder mismatch: artifact built with '{expected}', live encoder is '{found}'")]
    EncoderMismatch { expected: String, found: String },

    #[error("Dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Ensure every row has the same non-zero width, returning it.
fn uniform_dimension(rows: &[Vec<f32>], what: &str) -> Result<usize, ArtifactError> {
    let dimension = rows
        .first()
        .map(|r| r.len())
        .ok_or_else(|| ArtifactError::Malformed(format!("{} is empty", what)))?;

    if dimension == 0 {
        return Err(ArtifactError::Malformed(format!(
            "{} has zero-length vectors",
            what
        )));
    }

    if let Some((row, v)) = rows.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(ArtifactError::Malformed(format!(
            "{} row {} has {} values, expected {}",
            what,
            row,
            v.len(),
            dimension
        )));
    }

    Ok(dimension)
}
