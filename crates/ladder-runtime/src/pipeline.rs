//! Router and cascade wired together.

use serde::Serialize;
use std::sync::Arc;

use ladder_core::Settings;

use crate::cancel::CancelToken;
use crate::cascade::{Cascade, CascadeError, CascadeOutcome};
use crate::embedding::{self, Encoder};
use crate::providers::ProviderRegistry;
use crate::router::{RouteDecision, Router, RouterError};

/// A routed, answered prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    pub route: RouteDecision,

    #[serde(flatten)]
    pub outcome: CascadeOutcome,
}

/// Routes each prompt to a starting candidate, then escalates from there.
#[derive(Debug)]
pub struct Pipeline {
    router: Router,
    cascade: Cascade,
}

impl Pipeline {
    /// Every label the router can produce must be a configured candidate.
    pub fn new(router: Router, cascade: Cascade) -> Result<Self, CascadeError> {
        let unknown: Vec<&str> = router
            .labels()
            .into_iter()
            .filter(|label| cascade.position(label).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(CascadeError::Config(format!(
                "routing artifacts name unconfigured candidates: {}",
                unknown.join(", ")
            )));
        }

        Ok(Self { router, cascade })
    }

    /// Build the encoder, router and cascade described by `settings`.
    pub fn from_settings(
        settings: &Settings,
        registry: &ProviderRegistry,
    ) -> Result<Self, CascadeError> {
        let encoder: Option<Arc<dyn Encoder>> = settings
            .embedding
            .as_ref()
            .map(|e| embedding::from_settings(e, registry))
            .transpose()
            .map_err(|e| CascadeError::Config(format!("embedding: {}", e)))?;

        let router = Router::from_settings(settings, encoder.clone())?;
        let cascade = Cascade::from_settings(settings, registry, encoder)?;

        tracing::info!(
            candidates = cascade.candidates().len(),
            routed = router.is_configured(),
            tau = cascade.threshold(),
            "pipeline ready"
        );
        Self::new(router, cascade)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    pub async fn route(
        &self,
        prompt: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<RouteDecision, CascadeError> {
        match self.router.select(prompt, cancel).await {
            Ok(decision) => Ok(decision),
            Err(RouterError::Cancelled) => Err(CascadeError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    /// Route `prompt`, then run the cascade from the routed candidate.
    pub async fn answer(
        &self,
        prompt: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<PipelineAnswer, CascadeError> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(CascadeError::Cancelled);
        }

        let route = self.route(prompt, cancel).await?;
        tracing::debug!(source = route.source(), candidate = ?route.candidate(), "routed");

        let outcome = self
            .cascade
            .answer_detailed(prompt, route.candidate(), cancel)
            .await?;
        Ok(PipelineAnswer { route, outcome })
    }
}
