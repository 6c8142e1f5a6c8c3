use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering::Acquire},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, time::Instant};
use tracing::trace;

use crate::checker::CheckerResult;

struct CachedResult {
    result: CheckerResult,
    computed_at: Instant,
    generation: u64,
}

/// Outcome of a cache lookup.
pub(crate) enum Lookup {
    /// The cached result was still fresh.
    Cached(CheckerResult),

    /// The result was recomputed by this call.
    Computed(CheckerResult),
}

/// A single-slot cache for the aggregate result.
///
/// Recomputation happens while holding the slot lock, so concurrent callers that miss the cache queue up behind a
/// single recomputation and then observe its result instead of recomputing themselves.
pub(crate) struct ResultCache {
    ttl: Duration,
    slot: Mutex<Option<CachedResult>>,
}

impl ResultCache {
    /// Creates a cache with the given time-to-live. A TTL of zero disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Returns the cached result if it is still fresh, or computes, stores, and returns a new one.
    ///
    /// A cached result is fresh when it is younger than the TTL and `generation` has not moved since it was computed.
    /// `compute` is handed the timestamp of the previous result, if any.
    pub async fn get_or_compute<F, Fut>(&self, generation: &AtomicU64, compute: F) -> Lookup
    where
        F: FnOnce(Option<DateTime<Utc>>) -> Fut,
        Fut: Future<Output = CheckerResult>,
    {
        let mut slot = self.slot.lock().await;

        let current_generation = generation.load(Acquire);
        if let Some(cached) = slot.as_ref() {
            if self.is_fresh(cached, current_generation) {
                trace!("Serving aggregate health result from cache.");
                return Lookup::Cached(cached.result.clone());
            }
        }

        let previous_timestamp = slot.as_ref().map(|cached| cached.result.timestamp);
        let result = compute(previous_timestamp).await;
        *slot = Some(CachedResult {
            result: result.clone(),
            computed_at: Instant::now(),
            generation: current_generation,
        });

        Lookup::Computed(result)
    }

    fn is_fresh(&self, cached: &CachedResult, generation: u64) -> bool {
        !self.ttl.is_zero() && cached.generation == generation && cached.computed_at.elapsed() < self.ttl
    }
}
