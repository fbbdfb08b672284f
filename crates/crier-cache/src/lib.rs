//! Tag-indexed, TTL-governed Redis caching layer for the Crier backend.
//!
//! ## Architecture
//!
//! ```text
//! request handlers ──► CacheService ──► deadpool pool ──► Redis
//!                        │
//!                        ├─ key/value primitives (get/set/delete/incr/hash)
//!                        ├─ cache-aside orchestration (get_or_set + single-flight)
//!                        ├─ tag index (set_with_tags / invalidate_by_tags)
//!                        └─ diagnostics (stats)
//! ```
//!
//! ## Fail-open policy
//!
//! The cache is an optimization layer, never a dependency whose failure is
//! user-visible. Every public operation is total: backend errors, timeouts
//! and decode failures are logged and swallowed into safe defaults
//! (`None` / `false` / `0` / empty map). The single exception is the loader
//! passed to [`CacheService::get_or_set`]: its error belongs to the caller
//! and is propagated verbatim.
//!
//! ## Lifecycle
//!
//! The service is constructed explicitly from a [`CacheConfig`] and shared
//! by reference; the process bootstrap owns `connect()`/`disconnect()`.
//!
//! ```no_run
//! use crier_cache::{CacheConfig, CacheService};
//!
//! # async fn demo() {
//! let cache = CacheService::new(CacheConfig::default());
//! if cache.connect().await.is_err() {
//!     // degraded start: every read falls through to its loader
//! }
//!
//! let page: Option<String> = cache.get("page:home").await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod stats;

mod aside;
mod connection;
mod kv;
mod tags;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

pub use config::CacheConfig;
pub use connection::ConnectionStatus;
pub use error::{CacheError, CacheResult};
pub use stats::CacheStats;

use connection::ConnectionManager;

/// Cache-aside service over a shared Redis connection pool.
///
/// Cloning is not provided; share the service behind an `Arc` the way the
/// rest of the application state is shared.
pub struct CacheService {
    connection: ConnectionManager,
    /// Per-key gates serializing concurrent cold `get_or_set` calls.
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl CacheService {
    /// Create a service from configuration. No I/O happens until
    /// [`connect`](Self::connect).
    pub fn new(config: CacheConfig) -> Self {
        Self {
            connection: ConnectionManager::new(config),
            in_flight: DashMap::new(),
        }
    }

    /// Open the backend connection. Idempotent: a second call while already
    /// connecting or connected is a no-op. On failure the service stays
    /// usable in degraded (pass-through) mode.
    pub async fn connect(&self) -> CacheResult<()> {
        self.connection.connect().await
    }

    /// Graceful shutdown. In-flight operations degrade to safe defaults.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Whether the backend was reachable at the last observation.
    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    /// Current tri-state connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub(crate) fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Resolve an optional TTL against the configured default, clamped to
    /// at least one second (Redis rejects a zero expiry).
    pub(crate) fn ttl_secs(&self, ttl: Option<Duration>) -> u64 {
        ttl.unwrap_or_else(|| self.connection.config().default_ttl())
            .as_secs()
            .max(1)
    }

    /// Run one backend command bounded by the command timeout, mapping
    /// connectivity failures into readiness transitions.
    pub(crate) async fn run<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let timeout = self.connection.config().command_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => {
                self.connection.mark_ready();
                Ok(value)
            }
            Ok(Err(e)) => {
                if e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                {
                    self.connection.mark_disconnected();
                }
                metrics::record_cache_error(op);
                Err(CacheError::Backend(e))
            }
            Err(_) => {
                self.connection.mark_disconnected();
                metrics::record_cache_error(op);
                Err(CacheError::Timeout)
            }
        }
    }
}
