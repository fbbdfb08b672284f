//! Typed key/value primitives over Redis.
//!
//! Values cross the wire as JSON strings; the type parameter at each call
//! site makes encode/decode failures visible at compile time for the value
//! shapes the application actually caches. A decode failure at runtime is
//! still downgraded to a miss (and the poisoned entry dropped) rather than
//! surfaced to the caller.
//!
//! Every operation here is fail-open: backend errors and timeouts are
//! logged, counted, and swallowed into the documented safe default.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheService, metrics};

impl CacheService {
    /// Get a decoded value, or `None` on miss, not-ready, backend error, or
    /// a value that no longer decodes as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "cache get skipped, backend not ready");
                metrics::record_cache_miss();
                return None;
            }
        };

        let raw = match self.run("get", conn.get::<_, Option<String>>(key)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache get failed");
                metrics::record_cache_miss();
                return None;
            }
        };

        let Some(raw) = raw else {
            tracing::debug!(key = %key, "cache miss");
            metrics::record_cache_miss();
            return None;
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                tracing::debug!(key = %key, "cache hit");
                metrics::record_cache_hit();
                Some(value)
            }
            Err(e) => {
                // Stale or foreign payload: treat as a miss and drop it so
                // the next write starts clean.
                tracing::warn!(key = %key, error = %e, "failed to decode cached value, evicting");
                let _ = self.run("del", conn.del::<_, i64>(key)).await;
                metrics::record_cache_miss();
                None
            }
        }
    }

    /// Serialize and write with expiry. Returns `false` (never errors) when
    /// the backend is not ready or the write fails, so callers can choose to
    /// bypass caching.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to encode value for cache");
                return false;
            }
        };

        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "cache set skipped, backend not ready");
                return false;
            }
        };

        let ttl_secs = self.ttl_secs(ttl);
        match self
            .run("set", conn.set_ex::<_, _, ()>(key, payload, ttl_secs))
            .await
        {
            Ok(()) => {
                tracing::debug!(key = %key, ttl_secs, "cache set");
                metrics::record_cache_write();
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache set failed");
                false
            }
        }
    }

    /// Remove one key. Returns `false` when the key did not exist or the
    /// backend was unavailable.
    pub async fn delete(&self, key: &str) -> bool {
        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "cache delete skipped, backend not ready");
                return false;
            }
        };

        match self.run("del", conn.del::<_, i64>(key)).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(key = %key, "cache delete");
                    metrics::record_invalidations(removed as u64);
                }
                removed > 0
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache delete failed");
                false
            }
        }
    }

    /// Remove every key matching a glob pattern: SCAN to enumerate, then one
    /// DEL batch. Returns `false` when nothing matched or the backend was
    /// unavailable.
    pub async fn delete_by_pattern(&self, pattern: &str) -> bool {
        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(pattern = %pattern, error = %e, "pattern delete skipped, backend not ready");
                return false;
            }
        };

        let scan = async {
            let mut matched = Vec::new();
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            while let Some(key) = iter.next_item().await {
                matched.push(key);
            }
            Ok::<_, redis::RedisError>(matched)
        };

        let matched = match self.run("scan", scan).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "pattern scan failed");
                return false;
            }
        };

        if matched.is_empty() {
            tracing::debug!(pattern = %pattern, "pattern delete matched no keys");
            return false;
        }

        match self.run("del", conn.del::<_, i64>(&matched)).await {
            Ok(removed) => {
                tracing::debug!(pattern = %pattern, removed, "pattern delete");
                metrics::record_invalidations(removed as u64);
                removed > 0
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "pattern delete failed");
                false
            }
        }
    }

    /// Whether a key currently exists. `false` when not ready.
    pub async fn exists(&self, key: &str) -> bool {
        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(_) => return false,
        };

        match self.run("exists", conn.exists::<_, bool>(key)).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache exists failed");
                false
            }
        }
    }

    /// Remaining TTL for a key, or `None` when the key is absent, has no
    /// expiry, or the backend is unavailable.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let mut conn = self.connection().conn().await.ok()?;

        match self.run("ttl", conn.ttl::<_, i64>(key)).await {
            Ok(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache ttl failed");
                None
            }
        }
    }

    /// Atomic counter increment. The TTL is attached when the counter is
    /// first created so orphan counters cannot live forever. Returns `0`
    /// when the backend is unavailable.
    pub async fn increment(&self, key: &str, ttl: Option<Duration>) -> i64 {
        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "increment skipped, backend not ready");
                return 0;
            }
        };

        let ttl_secs = self.ttl_secs(ttl);
        let incr = async {
            let count: i64 = conn.incr(key, 1).await?;
            if count == 1 {
                let _: i64 = conn.expire(key, ttl_secs as i64).await?;
            }
            Ok::<_, redis::RedisError>(count)
        };

        match self.run("incr", incr).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "increment failed");
                0
            }
        }
    }

    /// Set one field of a hash; the hash as a whole shares one TTL,
    /// refreshed on every write.
    pub async fn hash_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, field = %field, error = %e, "failed to encode hash field");
                return false;
            }
        };

        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "hash set skipped, backend not ready");
                return false;
            }
        };

        let ttl_secs = self.ttl_secs(ttl);
        let write = async {
            let mut pipe = redis::pipe();
            pipe.hset(key, field, payload)
                .ignore()
                .expire(key, ttl_secs as i64)
                .ignore();
            let _: () = pipe.query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(())
        };

        match self.run("hset", write).await {
            Ok(()) => {
                metrics::record_cache_write();
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, field = %field, error = %e, "hash set failed");
                false
            }
        }
    }

    /// Get one decoded hash field, or `None` on miss / not-ready / error.
    pub async fn hash_get<T: DeserializeOwned>(&self, key: &str, field: &str) -> Option<T> {
        let mut conn = self.connection().conn().await.ok()?;

        let raw = match self
            .run("hget", conn.hget::<_, _, Option<String>>(key, field))
            .await
        {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, field = %field, error = %e, "hash get failed");
                return None;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, field = %field, error = %e, "failed to decode hash field");
                None
            }
        }
    }

    /// Get the whole hash as a decoded mapping. Fields that no longer decode
    /// as `T` are skipped; an unavailable backend yields an empty map.
    pub async fn hash_get_all<T: DeserializeOwned>(&self, key: &str) -> HashMap<String, T> {
        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(_) => return HashMap::new(),
        };

        let raw = match self
            .run("hgetall", conn.hgetall::<_, HashMap<String, String>>(key))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "hash get-all failed");
                return HashMap::new();
            }
        };

        let mut decoded = HashMap::with_capacity(raw.len());
        for (field, value) in raw {
            match serde_json::from_str::<T>(&value) {
                Ok(value) => {
                    decoded.insert(field, value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, field = %field, error = %e, "skipping undecodable hash field");
                }
            }
        }
        decoded
    }
}
