//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis cache configuration.
///
/// All fields have serde defaults so a partial config section (or none at
/// all) deserializes into something usable against a local Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis host
    #[serde(default = "default_host")]
    pub host: String,

    /// Redis port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional AUTH password
    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index (SELECT)
    #[serde(default)]
    pub db: i64,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Number of PING retries during `connect()` before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// TTL applied when a caller does not supply one, in seconds
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_command_timeout_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            db: 0,
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            max_retries: default_max_retries(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Assemble the Redis connection URL, e.g. `redis://:secret@localhost:6379/0`.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Connection establishment timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// TTL used when callers pass `None`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.db, 0);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_url_without_password() {
        let config = CacheConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_url_with_password_and_db() {
        let config = CacheConfig {
            password: Some("secret".to_string()),
            db: 3,
            ..CacheConfig::default()
        };
        assert_eq!(config.url(), "redis://:secret@127.0.0.1:6379/3");
    }

    #[test]
    fn test_partial_deserialization() {
        let config: CacheConfig = serde_json::from_str(r#"{"host": "cache.internal"}"#).unwrap();
        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.port, 6379);
        assert_eq!(config.max_retries, 3);
    }
}
