//! Prompt routing: taxonomy k-NN first, learned classifier as fallback.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use ladder_core::settings::{RouterSettings, TimeoutSettings};
use ladder_core::{ArtifactError, CandidateId, LinearClassifier, RouteOutcome, Settings, TaxonomyIndex};

use crate::cache::RouteCache;
use crate::cancel::{guarded, CancelToken, Interrupt};
use crate::embedding::{Encoder, EncoderError};

/// Errors from routing.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Routing artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Routing artifacts are configured but no encoder is available")]
    MissingEncoder,

    #[error("Encoder call timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Routing cancelled")]
    Cancelled,
}

/// Embed `prompt` under `limit`, giving up early if `cancel` fires.
async fn embed(
    encoder: &dyn Encoder,
    prompt: &str,
    limit: Duration,
    cancel: Option<&CancelToken>,
) -> Result<Vec<f32>, RouterError> {
    let embedding = guarded(encoder.encode(prompt), limit, cancel)
        .await
        .map_err(|interrupt| match interrupt {
            Interrupt::Cancelled => RouterError::Cancelled,
            Interrupt::TimedOut => RouterError::TimedOut(limit),
        })??;
    Ok(embedding)
}

fn default_timeout() -> Duration {
    TimeoutSettings::default().embedding
}

/// Where a routing decision came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "candidate", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Confident taxonomy match
    Taxonomy(CandidateId),

    /// Learned classifier, after an ambiguous or absent taxonomy
    Learned(CandidateId),

    /// No router configured; the cascade starts at its first candidate
    Unrouted,
}

impl RouteDecision {
    pub fn candidate(&self) -> Option<&str> {
        match self {
            RouteDecision::Taxonomy(id) | RouteDecision::Learned(id) => Some(id.as_str()),
            RouteDecision::Unrouted => None,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            RouteDecision::Taxonomy(_) => "taxonomy",
            RouteDecision::Learned(_) => "learned",
            RouteDecision::Unrouted => "unrouted",
        }
    }
}

/// k-NN router over a taxonomy index, with its memo cache.
pub struct TaxonomyRouter {
    index: TaxonomyIndex,
    encoder: Arc<dyn Encoder>,
    k: usize,
    acceptance: f32,
    timeout: Duration,
    cache: Option<RouteCache>,
}

impl TaxonomyRouter {
    /// Bind an index to a live encoder. Fails if the encoder is not the
    /// one the index was built with.
    pub fn new(
        index: TaxonomyIndex,
        encoder: Arc<dyn Encoder>,
        settings: &RouterSettings,
    ) -> Result<Self, RouterError> {
        index.check_encoder(encoder.identity(), encoder.dimension())?;

        let cache = (settings.cache_capacity > 0).then(|| RouteCache::new(settings.cache_capacity));
        Ok(Self {
            index,
            encoder,
            k: settings.k,
            acceptance: settings.acceptance,
            timeout: default_timeout(),
            cache,
        })
    }

    /// Limit on each encoder call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index(&self) -> &TaxonomyIndex {
        &self.index
    }

    pub async fn route(
        &self,
        prompt: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<RouteOutcome, RouterError> {
        Ok(self.lookup(prompt, cancel).await?.0)
    }

    /// Resolve `prompt`, also returning the embedding when one was computed
    /// (i.e. on a cache miss).
    async fn lookup(
        &self,
        prompt: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<(RouteOutcome, Option<Vec<f32>>), RouterError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(prompt).await {
                tracing::debug!(outcome = ?hit, "route cache hit");
                return Ok((hit, None));
            }
        }

        let embedding = embed(self.encoder.as_ref(), prompt, self.timeout, cancel).await?;
        let outcome = self.index.resolve(&embedding, self.k, self.acceptance)?;

        if let Some(cache) = &self.cache {
            cache.insert(prompt, outcome.clone()).await;
        }
        Ok((outcome, Some(embedding)))
    }

    pub fn cache(&self) -> Option<&RouteCache> {
        self.cache.as_ref()
    }
}

/// Fallback router: a linear classifier over the prompt embedding.
pub struct LearnedRouter {
    classifier: LinearClassifier,
    encoder: Arc<dyn Encoder>,
    timeout: Duration,
}

impl LearnedRouter {
    pub fn new(classifier: LinearClassifier, encoder: Arc<dyn Encoder>) -> Result<Self, RouterError> {
        classifier.check_encoder(encoder.identity(), encoder.dimension())?;
        Ok(Self {
            classifier,
            encoder,
            timeout: default_timeout(),
        })
    }

    /// Limit on each encoder call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &LinearClassifier {
        &self.classifier
    }

    /// Always yields a label.
    pub async fn predict(
        &self,
        prompt: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<CandidateId, RouterError> {
        let embedding = embed(self.encoder.as_ref(), prompt, self.timeout, cancel).await?;
        self.predict_embedding(&embedding)
    }

    pub fn predict_embedding(&self, embedding: &[f32]) -> Result<CandidateId, RouterError> {
        Ok(self.classifier.predict(embedding)?.to_string())
    }
}

/// Combined router. Read-only after construction apart from its cache.
#[derive(Default)]
pub struct Router {
    taxonomy: Option<TaxonomyRouter>,
    learned: Option<LearnedRouter>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("taxonomy", &self.taxonomy.as_ref().map(|t| t.index().len()))
            .field("learned", &self.learned.as_ref().map(|l| l.classifier().labels().len()))
            .finish()
    }
}

impl Router {
    pub fn new(taxonomy: Option<TaxonomyRouter>, learned: Option<LearnedRouter>) -> Self {
        Self { taxonomy, learned }
    }

    /// Load the artifacts named in settings and bind them to `encoder`.
    pub fn from_settings(
        settings: &Settings,
        encoder: Option<Arc<dyn Encoder>>,
    ) -> Result<Self, RouterError> {
        if !settings.has_router() {
            return Ok(Self::default());
        }
        let encoder = encoder.ok_or(RouterError::MissingEncoder)?;

        let taxonomy = settings
            .taxonomy_index
            .as_ref()
            .map(|path| {
                tracing::info!(path = %path.display(), "loading taxonomy index");
                let index = TaxonomyIndex::load(path)?;
                let router = TaxonomyRouter::new(index, encoder.clone(), &settings.router)?;
                Ok::<_, RouterError>(router.with_timeout(settings.timeouts.embedding))
            })
            .transpose()?;

        let learned = settings
            .learned_ckpt
            .as_ref()
            .map(|path| {
                tracing::info!(path = %path.display(), "loading learned router checkpoint");
                let router = LearnedRouter::new(LinearClassifier::load(path)?, encoder.clone())?;
                Ok::<_, RouterError>(router.with_timeout(settings.timeouts.embedding))
            })
            .transpose()?;

        Ok(Self::new(taxonomy, learned))
    }

    pub fn is_configured(&self) -> bool {
        self.taxonomy.is_some() || self.learned.is_some()
    }

    pub fn taxonomy(&self) -> Option<&TaxonomyRouter> {
        self.taxonomy.as_ref()
    }

    pub fn learned(&self) -> Option<&LearnedRouter> {
        self.learned.as_ref()
    }

    /// Every label either artifact can produce.
    pub fn labels(&self) -> BTreeSet<&str> {
        let mut labels = BTreeSet::new();
        if let Some(t) = &self.taxonomy {
            labels.extend(t.index.entries().iter().map(|e| e.model.as_str()));
        }
        if let Some(l) = &self.learned {
            labels.extend(l.classifier.labels().iter().map(String::as_str));
        }
        labels
    }

    /// Pick a starting candidate for `prompt`. `cancel` aborts an
    /// in-flight encoder call.
    pub async fn select(
        &self,
        prompt: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<RouteDecision, RouterError> {
        let mut embedding = None;

        if let Some(taxonomy) = &self.taxonomy {
            let (outcome, computed) = taxonomy.lookup(prompt, cancel).await?;
            if let RouteOutcome::Candidate(id) = outcome {
                tracing::debug!(candidate = %id, "taxonomy route");
                return Ok(RouteDecision::Taxonomy(id));
            }
            tracing::debug!("taxonomy match ambiguous");
            embedding = computed;
        }

        if let Some(learned) = &self.learned {
            let id = match embedding {
                Some(v) => learned.predict_embedding(&v)?,
                None => learned.predict(prompt, cancel).await?,
            };
            tracing::debug!(candidate = %id, "learned route");
            return Ok(RouteDecision::Learned(id));
        }

        Ok(RouteDecision::Unrouted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::test_support::StaticEncoder;
    use ladder_core::TaxonomyEntry;

    fn entry(model: &str) -> TaxonomyEntry {
        TaxonomyEntry {
            task: String::new(),
            model: model.to_string(),
        }
    }

    fn index() -> TaxonomyIndex {
        TaxonomyIndex::new(
            "static/test",
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![entry("small"), entry("large")],
        )
        .unwrap()
    }

    fn encoder() -> StaticEncoder {
        StaticEncoder::new(2)
            .with("greeting", vec![1.0, 0.0])
            .with("proof", vec![0.0, 1.0])
            .with("vague", vec![1.0, 1.0])
    }

    fn classifier() -> LinearClassifier {
        LinearClassifier::new(
            "static/test",
            vec!["small".to_string(), "large".to_string()],
            vec![vec![1.0, 0.0], vec![0.0, 1.1]],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_taxonomy_route() {
        let router = TaxonomyRouter::new(index(), Arc::new(encoder()), &RouterSettings::default())
            .unwrap();
        assert_eq!(
            router.route("proof", None).await.unwrap(),
            RouteOutcome::Candidate("large".to_string())
        );
        // Similarity ~0.71 to both references, below 0.80
        assert_eq!(router.route("vague", None).await.unwrap(), RouteOutcome::Ambiguous);
    }

    #[tokio::test]
    async fn test_cache_reuses_resolution() {
        let encoder = Arc::new(encoder());
        let router =
            TaxonomyRouter::new(index(), encoder.clone(), &RouterSettings::default()).unwrap();

        router.route("greeting", None).await.unwrap();
        router.route("greeting", None).await.unwrap();
        assert_eq!(encoder.calls(), 1);
        assert_eq!(router.cache().unwrap().entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_with_zero_capacity() {
        let encoder = Arc::new(encoder());
        let settings = RouterSettings {
            cache_capacity: 0,
            ..Default::default()
        };
        let router = TaxonomyRouter::new(index(), encoder.clone(), &settings).unwrap();

        router.route("greeting", None).await.unwrap();
        router.route("greeting", None).await.unwrap();
        assert_eq!(encoder.calls(), 2);
        assert!(router.cache().is_none());
    }

    #[tokio::test]
    async fn test_encoder_failure_not_cached() {
        let encoder = Arc::new(encoder().failing(1, || ProviderError::AuthError));
        let router =
            TaxonomyRouter::new(index(), encoder.clone(), &RouterSettings::default()).unwrap();

        assert!(router.route("greeting", None).await.is_err());
        assert_eq!(
            router.route("greeting", None).await.unwrap(),
            RouteOutcome::Candidate("small".to_string())
        );
        assert_eq!(encoder.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_encoder_times_out_and_is_not_cached() {
        let encoder = Arc::new(encoder().with_delay(Duration::from_secs(120)));
        let router = TaxonomyRouter::new(index(), encoder.clone(), &RouterSettings::default())
            .unwrap()
            .with_timeout(Duration::from_secs(5));

        assert!(matches!(
            router.route("greeting", None).await,
            Err(RouterError::TimedOut(limit)) if limit == Duration::from_secs(5)
        ));
        assert_eq!(router.cache().unwrap().entry_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_encoder_call() {
        let encoder: Arc<dyn Encoder> =
            Arc::new(encoder().with_delay(Duration::from_secs(10)));
        let router = Router::new(None, Some(LearnedRouter::new(classifier(), encoder).unwrap()));

        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        assert!(matches!(
            router.select("greeting", Some(&token)).await,
            Err(RouterError::Cancelled)
        ));
    }

    #[test]
    fn test_encoder_mismatch_fails_construction() {
        let other = StaticEncoder::new(2).with_identity("openai/text-embedding-3-small");
        assert!(matches!(
            TaxonomyRouter::new(index(), Arc::new(other), &RouterSettings::default()),
            Err(RouterError::Artifact(ArtifactError::EncoderMismatch { .. }))
        ));

        let wide = StaticEncoder::new(3);
        assert!(matches!(
            LearnedRouter::new(classifier(), Arc::new(wide)),
            Err(RouterError::Artifact(ArtifactError::DimensionMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_select_prefers_taxonomy() {
        let encoder: Arc<dyn Encoder> = Arc::new(encoder());
        let router = Router::new(
            Some(TaxonomyRouter::new(index(), encoder.clone(), &RouterSettings::default()).unwrap()),
            Some(LearnedRouter::new(classifier(), encoder).unwrap()),
        );

        assert_eq!(
            router.select("greeting", None).await.unwrap(),
            RouteDecision::Taxonomy("small".to_string())
        );
    }

    #[tokio::test]
    async fn test_select_falls_back_on_ambiguous() {
        let encoder = Arc::new(encoder());
        let shared: Arc<dyn Encoder> = encoder.clone();
        let router = Router::new(
            Some(TaxonomyRouter::new(index(), shared.clone(), &RouterSettings::default()).unwrap()),
            Some(LearnedRouter::new(classifier(), shared).unwrap()),
        );

        // Equal components; the 1.1 weight tips the classifier to "large"
        assert_eq!(
            router.select("vague", None).await.unwrap(),
            RouteDecision::Learned("large".to_string())
        );
        // Embedding from the taxonomy lookup is reused by the classifier
        assert_eq!(encoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_select_learned_only() {
        let router = Router::new(
            None,
            Some(LearnedRouter::new(classifier(), Arc::new(encoder())).unwrap()),
        );
        assert_eq!(
            router.select("greeting", None).await.unwrap(),
            RouteDecision::Learned("small".to_string())
        );
    }

    #[tokio::test]
    async fn test_select_unrouted() {
        let router = Router::default();
        assert!(!router.is_configured());
        let decision = router.select("anything", None).await.unwrap();
        assert_eq!(decision, RouteDecision::Unrouted);
        assert_eq!(decision.candidate(), None);
        assert_eq!(decision.source(), "unrouted");
    }

    #[test]
    fn test_labels_union() {
        let encoder: Arc<dyn Encoder> = Arc::new(encoder());
        let learned = LinearClassifier::new(
            "static/test",
            vec!["small".to_string(), "medium".to_string()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![],
        )
        .unwrap();
        let router = Router::new(
            Some(TaxonomyRouter::new(index(), encoder.clone(), &RouterSettings::default()).unwrap()),
            Some(LearnedRouter::new(learned, encoder).unwrap()),
        );
        assert_eq!(
            router.labels().into_iter().collect::<Vec<_>>(),
            vec!["large", "medium", "small"]
        );
    }

    #[test]
    fn test_from_settings_requires_encoder() {
        let settings = Settings::from_yaml(
            r#"
models:
  - name: small
    provider: scripted
taxonomy_index: /nonexistent/taxonomy.json
embedding:
  provider: scripted
  model: test
  dimension: 2
"#,
        )
        .unwrap();

        assert!(matches!(
            Router::from_settings(&settings, None),
            Err(RouterError::MissingEncoder)
        ));
        assert!(matches!(
            Router::from_settings(&settings, Some(Arc::new(encoder()))),
            Err(RouterError::Artifact(ArtifactError::IoError(_)))
        ));
    }

    #[test]
    fn test_decision_serializes_with_source() {
        let json = serde_json::to_value(RouteDecision::Learned("large".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"source": "learned", "candidate": "large"}));
    }
}
