//! Cache-aside orchestration: serve from cache, else load and populate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::CacheService;

impl CacheService {
    /// Fetch-or-compute against a caller-supplied loader.
    ///
    /// 1. On a cache hit the value is returned immediately; the loader is
    ///    not invoked.
    /// 2. On a miss (including when the backend is unreachable) the loader
    ///    runs and its value is returned.
    /// 3. A successful load is written back best-effort; a failed cache
    ///    write is logged, never surfaced.
    /// 4. Loader errors propagate verbatim. Cache failures and loader
    ///    failures are never conflated.
    ///
    /// Concurrent calls for the same cold key are serialized on a per-key
    /// gate: whoever enters first runs the loader, the rest re-check the
    /// cache once the gate opens and normally find the value already there,
    /// so one loader invocation serves the herd.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let gate = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = gate.lock().await;

        // Another caller may have populated the key while we waited.
        if let Some(value) = self.get::<T>(key).await {
            drop(guard);
            self.release_gate(key);
            return Ok(value);
        }

        tracing::debug!(key = %key, "cache-aside miss, invoking loader");
        let loaded = loader().await;

        if let Ok(value) = &loaded {
            if !self.set(key, value, ttl).await {
                tracing::debug!(key = %key, "cache write after load failed, returning loaded value");
            }
        }

        drop(guard);
        self.release_gate(key);
        loaded
    }

    /// Drop the in-flight entry once nobody else holds it (our clone plus
    /// the map's). Best-effort: a racing caller that keeps the entry alive
    /// simply reuses it.
    fn release_gate(&self, key: &str) {
        self.in_flight
            .remove_if(key, |_, entry| Arc::strong_count(entry) <= 2);
    }
}
