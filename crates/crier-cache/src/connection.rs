//! Redis connection lifecycle: pool construction, readiness tracking,
//! graceful shutdown.
//!
//! The manager owns one logical connection (a deadpool pool) shared by every
//! cache operation. Readiness is a tri-state observation updated from
//! connection events; operations consult it before touching the backend and
//! degrade to safe defaults while it is false.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use deadpool_redis::{Pool, Runtime};
use parking_lot::RwLock;

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};

/// Observed state of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No pool, or the last backend round-trip failed.
    Disconnected = 0,
    /// `connect()` is in progress.
    Connecting = 1,
    /// Last backend round-trip succeeded.
    Ready = 2,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Ready,
            _ => ConnectionStatus::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ready => "ready",
        }
    }
}

/// Supervises the shared Redis pool.
pub(crate) struct ConnectionManager {
    config: CacheConfig,
    pool: RwLock<Option<Pool>>,
    status: AtomicU8,
}

impl ConnectionManager {
    pub(crate) fn new(config: CacheConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
            status: AtomicU8::new(ConnectionStatus::Disconnected as u8),
        }
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.status() == ConnectionStatus::Ready
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Flip to `Disconnected` after a failed backend round-trip.
    pub(crate) fn mark_disconnected(&self) {
        let prev = self
            .status
            .swap(ConnectionStatus::Disconnected as u8, Ordering::AcqRel);
        if ConnectionStatus::from_u8(prev) == ConnectionStatus::Ready {
            tracing::warn!("Redis connection lost, cache degraded to pass-through");
        }
    }

    /// Flip back to `Ready` after a successful backend round-trip.
    pub(crate) fn mark_ready(&self) {
        let prev = self
            .status
            .swap(ConnectionStatus::Ready as u8, Ordering::AcqRel);
        if ConnectionStatus::from_u8(prev) != ConnectionStatus::Ready {
            tracing::info!("Redis connection restored");
        }
    }

    /// Establish the pool and verify the backend with PING, retrying up to
    /// the configured budget with exponential backoff.
    ///
    /// Idempotent: a second call while connecting or connected is a no-op.
    /// On exhausted retries the pool is kept so a later checkout can restore
    /// readiness once the backend recovers.
    pub(crate) async fn connect(&self) -> CacheResult<()> {
        let current = self.status.compare_exchange(
            ConnectionStatus::Disconnected as u8,
            ConnectionStatus::Connecting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if current.is_err() {
            tracing::debug!("connect() called while already connecting/connected, ignoring");
            return Ok(());
        }

        // Reconnecting after disconnect(): reuse an existing pool if we
        // still hold one, otherwise build it from configuration. Clone out
        // of the read guard before matching so the write below can't
        // deadlock against it.
        let existing = self.pool.read().clone();
        let pool = match existing {
            Some(pool) => pool,
            None => {
                let url = self.config.url();
                tracing::info!(host = %self.config.host, port = self.config.port, db = self.config.db, "Connecting to Redis");

                let mut pool_config = deadpool_redis::Config::from_url(url);
                let timeout = self.config.connect_timeout();
                let pc = pool_config
                    .pool
                    .get_or_insert_with(deadpool_redis::PoolConfig::default);
                pc.max_size = self.config.pool_size;
                pc.timeouts.wait = Some(timeout);
                pc.timeouts.create = Some(timeout);
                pc.timeouts.recycle = Some(timeout);

                match pool_config.create_pool(Some(Runtime::Tokio1)) {
                    Ok(pool) => {
                        *self.pool.write() = Some(pool.clone());
                        pool
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create Redis pool");
                        self.set_status(ConnectionStatus::Disconnected);
                        return Err(e.into());
                    }
                }
            }
        };

        // Verify with PING, retrying within the budget.
        let mut backoff = Duration::from_millis(500);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_error = CacheError::NotConnected;

        for attempt in 1..=attempts {
            match self.ping(&pool).await {
                Ok(()) => {
                    self.set_status(ConnectionStatus::Ready);
                    tracing::info!("Connected to Redis");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        attempts,
                        "Redis PING failed"
                    );
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }

        self.set_status(ConnectionStatus::Disconnected);
        tracing::error!("Giving up on Redis connection, cache will run degraded");
        Err(last_error)
    }

    async fn ping(&self, pool: &Pool) -> CacheResult<()> {
        let fut = async {
            let mut conn = pool.get().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<(), CacheError>(())
        };
        match tokio::time::timeout(self.config.connect_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Drop the pool and flip to `Disconnected`. In-flight operations fail
    /// with a recoverable error and surface as safe defaults to callers.
    pub(crate) async fn disconnect(&self) {
        let had_pool = self.pool.write().take().is_some();
        self.set_status(ConnectionStatus::Disconnected);
        if had_pool {
            tracing::info!("Disconnected from Redis");
        }
    }

    /// Check out a connection, honoring readiness.
    ///
    /// While `Disconnected` with a live pool we still attempt one checkout:
    /// the pool re-establishes connections on its own, and a successful
    /// checkout is the signal that readiness has recovered.
    pub(crate) async fn conn(&self) -> CacheResult<deadpool_redis::Connection> {
        let pool = self.pool.read().clone().ok_or(CacheError::NotConnected)?;

        match self.status() {
            ConnectionStatus::Connecting => Err(CacheError::NotConnected),
            ConnectionStatus::Ready => match pool.get().await {
                Ok(conn) => Ok(conn),
                Err(e) => {
                    self.mark_disconnected();
                    Err(e.into())
                }
            },
            ConnectionStatus::Disconnected => match pool.get().await {
                Ok(conn) => {
                    self.mark_ready();
                    Ok(conn)
                }
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(
            ConnectionStatus::from_u8(ConnectionStatus::Ready as u8),
            ConnectionStatus::Ready
        );
        assert_eq!(
            ConnectionStatus::from_u8(ConnectionStatus::Connecting as u8),
            ConnectionStatus::Connecting
        );
        assert_eq!(ConnectionStatus::from_u8(99), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_operations_before_connect_are_not_ready() {
        let manager = ConnectionManager::new(CacheConfig::default());
        assert!(!manager.is_ready());
        assert!(matches!(
            manager.conn().await,
            Err(CacheError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_quiet() {
        let manager = ConnectionManager::new(CacheConfig::default());
        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }
}
