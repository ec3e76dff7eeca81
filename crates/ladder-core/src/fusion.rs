//! Fusion: pick one draft when none cleared the confidence threshold.
//!
//! The selection policy is strict and deterministic:
//! 1. Keep only drafts sharing the maximum confidence.
//! 2. A single top-scorer wins outright; no tie-break runs.
//! 3. Otherwise the configured tie-break picks among the tied drafts.
//!
//! Every step preserves input order, so equal inputs yield equal winners.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Draft;
use crate::vector::cosine;

/// Errors from fusion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// The cascade never calls fusion without drafts; hitting this means an
    /// upstream invariant was broken.
    #[error("fusion requires at least one draft")]
    Empty,

    #[error("expected {expected} embeddings for tied drafts, got {found}")]
    EmbeddingCount { expected: usize, found: usize },

    #[error("no draft has a comparable confidence")]
    NoComparableConfidence,
}

/// Tie-break policy among drafts sharing the top confidence.
///
/// Exactly one policy is active per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Fewest characters wins; first seen wins equal lengths
    #[default]
    Shortest,

    /// Highest summed similarity to the other tied drafts wins
    Consensus,
}

impl std::fmt::Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TieBreak::Shortest => write!(f, "shortest"),
            TieBreak::Consensus => write!(f, "consensus"),
        }
    }
}

/// Indices (in input order) of the drafts sharing the maximum confidence.
pub fn top_scorers(drafts: &[Draft]) -> Result<Vec<usize>, FusionError> {
    let top = drafts
        .iter()
        .map(|d| d.confidence)
        .reduce(f64::max)
        .ok_or(FusionError::Empty)?;

    // NaN only survives `max` when every confidence is NaN
    let tied: Vec<usize> = drafts
        .iter()
        .enumerate()
        .filter(|(_, d)| d.confidence == top)
        .map(|(i, _)| i)
        .collect();
    if tied.is_empty() {
        return Err(FusionError::NoComparableConfidence);
    }
    Ok(tied)
}

/// Position within `tied` of the shortest draft text.
///
/// Length is counted in Unicode scalar values. `min_by_key` keeps the first
/// minimum, which gives first-seen order on equal lengths.
pub fn shortest(drafts: &[Draft], tied: &[usize]) -> usize {
    tied.iter()
        .enumerate()
        .min_by_key(|&(_, &i)| drafts[i].text.chars().count())
        .map(|(pos, _)| pos)
        .unwrap_or(0)
}

/// Position of the centroid embedding: the one with the highest summed
/// cosine similarity to all others. First seen wins ties.
pub fn centroid(embeddings: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;

    for (i, a) in embeddings.iter().enumerate() {
        let score: f32 = embeddings
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, b)| cosine(a, b))
            .sum();

        if score > best_score {
            best = i;
            best_score = score;
        }
    }

    best
}

/// Apply the shortest-answer policy end to end.
pub fn fuse_shortest(drafts: &[Draft]) -> Result<&Draft, FusionError> {
    let tied = top_scorers(drafts)?;
    let pick = if tied.len() == 1 {
        0
    } else {
        shortest(drafts, &tied)
    };
    Ok(&drafts[tied[pick]])
}

/// Apply the consensus policy given embeddings for the tied drafts
/// (in the order returned by [`top_scorers`]).
pub fn fuse_with_embeddings<'a>(
    drafts: &'a [Draft],
    tied: &[usize],
    embeddings: &[Vec<f32>],
) -> Result<&'a Draft, FusionError> {
    if tied.is_empty() {
        return Err(FusionError::Empty);
    }
    if embeddings.len() != tied.len() {
        return Err(FusionError::EmbeddingCount {
            expected: tied.len(),
            found: embeddings.len(),
        });
    }
    Ok(&drafts[tied[centroid(embeddings)]])
}
