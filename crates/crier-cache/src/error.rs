//! Error types for the cache subsystem.
//!
//! These errors stay internal to the crate: every public cache operation is
//! a total function that swallows them into a logged event plus a safe
//! default. The only error a caller ever sees from this crate is their own
//! loader's error, passed through `get_or_set` untouched.

use thiserror::Error;

/// Errors raised by cache internals.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache is not connected")]
    NotConnected,

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("command timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
}

pub type CacheResult<T> = Result<T, CacheError>;
