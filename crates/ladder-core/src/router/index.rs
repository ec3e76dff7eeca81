//! Taxonomy index: labelled reference embeddings with k-NN majority vote.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{uniform_dimension, ArtifactError};
use crate::types::RouteOutcome;
use crate::vector::{dot, normalized};

/// Similarities within this distance of 1.0 count as an exact match.
pub const EXACT_MATCH_EPSILON: f32 = 1e-6;

/// One labelled reference prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxonomyEntry {
    /// Task description of the reference prompt
    #[serde(default)]
    pub task: String,

    /// Candidate that should answer prompts like this one
    pub model: String,
}

/// On-disk layout of the index.
#[derive(Debug, Serialize, Deserialize)]
struct IndexArtifact {
    encoder: String,
    embeddings: Vec<Vec<f32>>,
    tasks: Vec<TaxonomyEntry>,
}

/// A reference vector close to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row in the index
    pub index: usize,

    /// Cosine similarity to the query
    pub similarity: f32,
}

/// Read-only nearest-neighbor index over labelled reference prompts.
///
/// Invariants, checked at construction: at least one entry, one label per
/// vector, uniform non-zero dimensionality. Stored vectors are unit length,
/// so a dot product with a unit query is the cosine similarity.
#[derive(Debug, Clone)]
pub struct TaxonomyIndex {
    encoder: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    entries: Vec<TaxonomyEntry>,
}

impl TaxonomyIndex {
    /// Build an index from parallel vectors and labels.
    pub fn new(
        encoder: impl Into<String>,
        embeddings: Vec<Vec<f32>>,
        entries: Vec<TaxonomyEntry>,
    ) -> Result<Self, ArtifactError> {
        if embeddings.len() != entries.len() {
            return Err(ArtifactError::Malformed(format!(
                "{} embeddings but {} labels",
                embeddings.len(),
                entries.len()
            )));
        }
        let dimension = uniform_dimension(&embeddings, "taxonomy index")?;

        Ok(Self {
            encoder: encoder.into(),
            dimension,
            vectors: embeddings.into_iter().map(normalized).collect(),
            entries,
        })
    }

    /// Parse an index from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let artifact: IndexArtifact = serde_json::from_str(json)?;
        Self::new(artifact.encoder, artifact.embeddings, artifact.tasks)
    }

    /// Load an index file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Serialize back to the on-disk layout.
    pub fn to_json(&self) -> Result<String, ArtifactError> {
        let artifact = IndexArtifact {
            encoder: self.encoder.clone(),
            embeddings: self.vectors.clone(),
            tasks: self.entries.clone(),
        };
        Ok(serde_json::to_string(&artifact)?)
    }

    /// Identity of the encoder that produced the vectors.
    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }

    /// Check that a live encoder matches the one recorded in the index.
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

    /// The `k` most similar reference vectors, most similar first.
    ///
    /// Equal similarities keep index order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, ArtifactError> {
        if query.len() != self.dimension {
            return Err(ArtifactError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }
        let query = normalized(query.to_vec());

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(index, v)| Neighbor {
                index,
                similarity: dot(&query, v),
            })
            .collect();

        neighbors.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        neighbors.truncate(k.max(1));
        Ok(neighbors)
    }

    /// Resolve a query vector to a candidate label.
    ///
    /// Rules, in order:
    /// 1. An exact match returns its own label.
    /// 2. Top similarity not above `acceptance` => `Ambiguous`.
    /// 3. Majority vote among the `k` nearest; on a tied count the label
    ///    whose closest member ranks highest wins.
    pub fn resolve(
        &self,
        query: &[f32],
        k: usize,
        acceptance: f32,
    ) -> Result<RouteOutcome, ArtifactError> {
        let neighbors = self.nearest(query, k)?;
        let Some(top) = neighbors.first() else {
            return Ok(RouteOutcome::Ambiguous);
        };

        if top.similarity >= 1.0 - EXACT_MATCH_EPSILON {
            return Ok(RouteOutcome::Candidate(self.entries[top.index].model.clone()));
        }

        if top.similarity <= acceptance {
            return Ok(RouteOutcome::Ambiguous);
        }

        let mut votes: HashMap<&str, usize> = HashMap::new();
        for n in &neighbors {
            *votes.entry(self.entries[n.index].model.as_str()).or_default() += 1;
        }
        let most = votes.values().copied().max().unwrap_or(0);

        // Neighbors are ordered nearest first, so the first label reaching
        // the top count is the tie-break winner.
        let winner = neighbors
            .iter()
            .map(|n| self.entries[n.index].model.as_str())
            .find(|label| votes.get(label) == Some(&most))
            .unwrap_or(self.entries[top.index].model.as_str());

        Ok(RouteOutcome::Candidate(winner.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(model: &str) -> TaxonomyEntry {
        TaxonomyEntry {
            task: format!("{} task", model),
            model: model.to_string(),
        }
    }

    fn index() -> TaxonomyIndex {
        TaxonomyIndex::new(
            "test/encoder",
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.95, 0.31, 0.0],
                vec![0.93, 0.0, 0.37],
                vec![0.0, 1.0, 0.0],
            ],
            vec![entry("small"), entry("large"), entry("large"), entry("small")],
        )
        .unwrap()
    }

    #[test]
    fn test_exact_match_returns_own_label() {
        // Majority of the 3 nearest say "large", but the exact match wins
        let outcome = index().resolve(&[1.0, 0.0, 0.0], 3, 0.80).unwrap();
        assert_eq!(outcome, RouteOutcome::Candidate("small".to_string()));
    }

    #[test]
    fn test_majority_vote() {
        // Close to rows 0, 1, 2 but identical to none
        let outcome = index().resolve(&[0.98, 0.1, 0.1], 3, 0.80).unwrap();
        assert_eq!(outcome, RouteOutcome::Candidate("large".to_string()));
    }

    #[test]
    fn test_tie_broken_by_nearest() {
        // k = 2: one "small" (row 0), one "large" (row 1); row 0 is nearer
        let outcome = index().resolve(&[0.99, 0.05, 0.0], 2, 0.80).unwrap();
        assert_eq!(outcome, RouteOutcome::Candidate("small".to_string()));
    }

    #[test]
    fn test_below_acceptance_is_ambiguous() {
        // Closest reference is row 2 at ~0.37
        let outcome = index().resolve(&[0.0, 0.0, 1.0], 3, 0.80).unwrap();
        assert_eq!(outcome, RouteOutcome::Ambiguous);
    }

    #[test]
    fn test_acceptance_is_strict() {
        // Orthogonal query has similarity 0, which does not exceed 0
        let index = TaxonomyIndex::new("e", vec![vec![0.0, 1.0]], vec![entry("a")]).unwrap();
        let outcome = index.resolve(&[1.0, 1.0], 1, 0.0).unwrap();
        assert_eq!(outcome, RouteOutcome::Candidate("a".to_string()));
        let outcome = index.resolve(&[1.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(outcome, RouteOutcome::Ambiguous);
    }

    #[test]
    fn test_exact_match_never_ambiguous() {
        let outcome = index().resolve(&[0.0, 1.0, 0.0], 3, 1.0).unwrap();
        assert_eq!(outcome, RouteOutcome::Candidate("small".to_string()));
    }

    #[test]
    fn test_nearest_is_sorted() {
        let neighbors = index().nearest(&[0.0, 1.0, 0.0], 4).unwrap();
        assert_eq!(neighbors[0].index, 3);
        assert!(neighbors
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let result = index().resolve(&[1.0, 0.0], 3, 0.8);
        assert!(matches!(
            result,
            Err(ArtifactError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let result = TaxonomyIndex::new("e", vec![vec![1.0]], vec![entry("a"), entry("b")]);
        assert!(matches!(result, Err(ArtifactError::Malformed(_))));
    }

    #[test]
    fn test_ragged_vectors_rejected() {
        let result = TaxonomyIndex::new(
            "e",
            vec![vec![1.0, 0.0], vec![1.0]],
            vec![entry("a"), entry("b")],
        );
        assert!(matches!(result, Err(ArtifactError::Malformed(_))));
    }

    #[test]
    fn test_empty_index_rejected() {
        let result = TaxonomyIndex::new("e", vec![], vec![]);
        assert!(matches!(result, Err(ArtifactError::Malformed(_))));
    }

    #[test]
    fn test_check_encoder() {
        let index = index();
        assert!(index.check_encoder("test/encoder", 3).is_ok());
        assert!(matches!(
            index.check_encoder("other/encoder", 3),
            Err(ArtifactError::EncoderMismatch { .. })
        ));
        assert!(matches!(
            index.check_encoder("test/encoder", 768),
            Err(ArtifactError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"encoder": "ollama/nomic-embed-text",
                "embeddings": [[0.0, 2.0], [3.0, 0.0]],
                "tasks": [{{"task": "chat", "model": "small"}}, {{"task": "math", "model": "large"}}]}}"#
        )
        .unwrap();

        let index = TaxonomyIndex::load(file.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.encoder(), "ollama/nomic-embed-text");

        let outcome = index.resolve(&[0.0, 5.0], 3, 0.8).unwrap();
        assert_eq!(outcome, RouteOutcome::Candidate("small".to_string()));
    }

    #[test]
    fn test_round_trip_json() {
        let original = index();
        let restored = TaxonomyIndex::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(restored.entries(), original.entries());
        assert_eq!(restored.encoder(), original.encoder());
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            TaxonomyIndex::from_json("{\"encoder\": \"e\"}"),
            Err(ArtifactError::JsonError(_))
        ));
        assert!(matches!(
            TaxonomyIndex::load("/nonexistent/taxonomy.json"),
            Err(ArtifactError::IoError(_))
        ));
    }
}
