//! Memoization of taxonomy lookups.
//!
//! A lookup is pure for a fixed index, so repeated prompts reuse the
//! earlier resolution instead of paying for another embedding call.

use moka::future::Cache;
use moka::policy::EvictionPolicy;

use ladder_core::RouteOutcome;

/// Bounded LRU cache from raw prompt text to taxonomy outcome.
#[derive(Clone)]
pub struct RouteCache {
    cache: Cache<String, RouteOutcome>,
}

impl RouteCache {
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { cache }
    }

    pub async fn get(&self, prompt: &str) -> Option<RouteOutcome> {
        self.cache.get(prompt).await
    }

    pub async fn insert(&self, prompt: &str, outcome: RouteOutcome) {
        self.cache.insert(prompt.to_string(), outcome).await;
    }

    /// Approximate entry count; pending maintenance may lag behind.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
