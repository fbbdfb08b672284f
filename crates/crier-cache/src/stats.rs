//! Operational diagnostics: connection status plus Redis memory and
//! keyspace aggregates, recomputed on demand.

use serde::Serialize;

use crate::CacheService;

/// Read-only snapshot for operational dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub connected: bool,
    pub status: String,
    pub used_memory_bytes: u64,
    pub used_memory_human: String,
    pub db_keys: u64,
    pub keys_with_ttl: u64,
}

impl CacheService {
    /// Query the backend for aggregate memory and key-count information.
    ///
    /// Returns `None` when the backend is not ready or the queries fail.
    /// Side-effect free beyond the queries themselves.
    pub async fn stats(&self) -> Option<CacheStats> {
        if !self.is_ready() {
            return None;
        }
        let mut conn = self.connection().conn().await.ok()?;

        let queries = async {
            let memory: String = redis::cmd("INFO")
                .arg("memory")
                .query_async(&mut conn)
                .await?;
            let keyspace: String = redis::cmd("INFO")
                .arg("keyspace")
                .query_async(&mut conn)
                .await?;
            let db_keys: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>((memory, keyspace, db_keys))
        };

        let (memory, keyspace, db_keys) = match self.run("info", queries).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "failed to query cache stats");
                return None;
            }
        };

        let (_, keys_with_ttl) = keyspace_counts(&keyspace, self.connection().config().db);

        Some(CacheStats {
            connected: true,
            status: self.status().as_str().to_string(),
            used_memory_bytes: info_field(&memory, "used_memory")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            used_memory_human: info_field(&memory, "used_memory_human")
                .unwrap_or("unknown")
                .to_string(),
            db_keys,
            keys_with_ttl,
        })
    }
}

/// Extract one `field:value` line from an INFO section payload.
fn info_field<'a>(info: &'a str, field: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        line.strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(|value| value.trim_end_matches('\r'))
    })
}

/// Parse `dbN:keys=K,expires=E,...` for the configured database index.
/// Absent line (empty database) counts as zero.
fn keyspace_counts(info: &str, db: i64) -> (u64, u64) {
    let prefix = format!("db{db}:");
    let Some(line) = info
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .find(|line| line.starts_with(&prefix))
    else {
        return (0, 0);
    };

    let mut keys = 0;
    let mut expires = 0;
    for part in line[prefix.len()..].split(',') {
        if let Some(value) = part.strip_prefix("keys=") {
            keys = value.parse().unwrap_or(0);
        } else if let Some(value) = part.strip_prefix("expires=") {
            expires = value.parse().unwrap_or(0);
        }
    }
    (keys, expires)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMORY_INFO: &str =
        "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\nused_memory_rss:2097152\r\n";
    const KEYSPACE_INFO: &str = "# Keyspace\r\ndb0:keys=42,expires=40,avg_ttl=12000\r\ndb3:keys=7,expires=0,avg_ttl=0\r\n";

    #[test]
    fn test_info_field() {
        assert_eq!(info_field(MEMORY_INFO, "used_memory"), Some("1048576"));
        assert_eq!(info_field(MEMORY_INFO, "used_memory_human"), Some("1.00M"));
        assert_eq!(info_field(MEMORY_INFO, "maxmemory"), None);
    }

    #[test]
    fn test_info_field_does_not_match_prefix() {
        // "used_memory" must not match the "used_memory_rss" line.
        assert_eq!(info_field("used_memory_rss:99\r\n", "used_memory"), None);
    }

    #[test]
    fn test_keyspace_counts() {
        assert_eq!(keyspace_counts(KEYSPACE_INFO, 0), (42, 40));
        assert_eq!(keyspace_counts(KEYSPACE_INFO, 3), (7, 0));
        assert_eq!(keyspace_counts(KEYSPACE_INFO, 5), (0, 0));
    }
}
