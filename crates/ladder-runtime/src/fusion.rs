//! Configured fusion policy.
//!
//! Selection rules live in `ladder_core::fusion`; this wraps them with the
//! encoder the consensus policy needs.

use std::sync::Arc;
use std::time::Duration;

use ladder_core::fusion::{fuse_shortest, fuse_with_embeddings, top_scorers};
use ladder_core::{Draft, TieBreak};

use crate::cancel::{guarded, CancelToken, Interrupt};
use crate::cascade::CascadeError;
use crate::embedding::Encoder;

/// The one active tie-break policy.
#[derive(Clone)]
pub enum Fusion {
    Shortest,
    Consensus(Arc<dyn Encoder>),
}

impl std::fmt::Debug for Fusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fusion::Shortest => write!(f, "Shortest"),
            Fusion::Consensus(encoder) => write!(f, "Consensus({})", encoder.identity()),
        }
    }
}

impl Default for Fusion {
    fn default() -> Self {
        Fusion::Shortest
    }
}

impl Fusion {
    /// Build the configured policy. Consensus without an encoder is a
    /// configuration error; there is no silent downgrade.
    pub fn from_tie_break(
        tie_break: TieBreak,
        encoder: Option<Arc<dyn Encoder>>,
    ) -> Result<Self, CascadeError> {
        match (tie_break, encoder) {
            (TieBreak::Shortest, _) => Ok(Fusion::Shortest),
            (TieBreak::Consensus, Some(encoder)) => Ok(Fusion::Consensus(encoder)),
            (TieBreak::Consensus, None) => Err(CascadeError::Config(
                "consensus tie-break requires an encoder".to_string(),
            )),
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        match self {
            Fusion::Shortest => TieBreak::Shortest,
            Fusion::Consensus(_) => TieBreak::Consensus,
        }
    }

    /// Pick the winning draft. The consensus encoder call runs under
    /// `limit` and stops early if `cancel` fires.
    pub async fn fuse<'a>(
        &self,
        drafts: &'a [Draft],
        limit: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<&'a Draft, CascadeError> {
        match self {
            Fusion::Shortest => Ok(fuse_shortest(drafts)?),
            Fusion::Consensus(encoder) => {
                let tied = top_scorers(drafts)?;
                if tied.len() == 1 {
                    return Ok(&drafts[tied[0]]);
                }
                let texts: Vec<String> = tied.iter().map(|&i| drafts[i].text.clone()).collect();
                let embeddings = guarded(encoder.encode_batch(&texts), limit, cancel)
                    .await
                    .map_err(|interrupt| match interrupt {
                        Interrupt::Cancelled => CascadeError::Cancelled,
                        Interrupt::TimedOut => CascadeError::EncoderTimeout {
                            encoder: encoder.identity().to_string(),
                            limit,
                        },
                    })??;
                Ok(fuse_with_embeddings(drafts, &tied, &embeddings)?)
            }
        }
    }
}
