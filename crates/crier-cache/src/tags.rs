//! Tag index: bulk invalidation of semantically related keys.
//!
//! Two Redis sets track the association both ways:
//!
//! - `tag:{tag}`  → the data keys carrying that tag
//! - `tags:{key}` → the tags attached to that key
//!
//! Both sets are written in the same MULTI/EXEC pipeline as the data key and
//! carry the same TTL, so tag bookkeeping neither outlives nor dramatically
//! underlives the data it indexes.

use std::time::Duration;

use redis::AsyncCommands;
use serde::Serialize;

use crate::{CacheService, metrics};

/// Set of data keys carrying `tag`.
fn keys_of_tag(tag: &str) -> String {
    format!("tag:{tag}")
}

/// Set of tags attached to `key`.
fn tags_of_key(key: &str) -> String {
    format!("tags:{key}")
}

impl CacheService {
    /// Write a value and register it under each tag, atomically.
    ///
    /// The data `SET` and both index writes go through one MULTI/EXEC
    /// pipeline, so a key can never land in the cache half-tagged. Returns
    /// `false` (and writes nothing) when the backend is unavailable or the
    /// value does not encode.
    pub async fn set_with_tags<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> bool {
        if tags.is_empty() {
            return self.set(key, value, ttl).await;
        }

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to encode value for tagged set");
                return false;
            }
        };

        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "tagged set skipped, backend not ready");
                return false;
            }
        };

        let ttl_secs = self.ttl_secs(ttl);
        let index_ttl = ttl_secs as i64;
        let tags_key = tags_of_key(key);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set_ex(key, payload, ttl_secs).ignore();
        for tag in tags {
            let tag_key = keys_of_tag(tag);
            pipe.sadd(&tag_key, key)
                .ignore()
                .expire(&tag_key, index_ttl)
                .ignore();
            pipe.sadd(&tags_key, *tag).ignore();
        }
        pipe.expire(&tags_key, index_ttl).ignore();

        let write = async {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(())
        };

        match self.run("set_with_tags", write).await {
            Ok(()) => {
                tracing::debug!(key = %key, tags = ?tags, ttl_secs, "cache set with tags");
                metrics::record_cache_write();
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, tags = ?tags, error = %e, "tagged set failed");
                false
            }
        }
    }

    /// Invalidate every key carrying any of the given tags.
    ///
    /// Processed tag by tag: for each tag the member keys, their reverse
    /// index entries and the tag set itself go in one DEL batch. A failure
    /// on one tag is logged and does not abort the rest; the call reports
    /// success unless every tag failed. An unknown tag is a clean no-op.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> bool {
        if tags.is_empty() {
            return true;
        }

        let mut conn = match self.connection().conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(tags = ?tags, error = %e, "tag invalidation skipped, backend not ready");
                return false;
            }
        };

        let mut failed = 0usize;
        for tag in tags {
            let tag_key = keys_of_tag(tag);

            let members = match self
                .run("smembers", conn.smembers::<_, Vec<String>>(&tag_key))
                .await
            {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "failed to read tag members, skipping tag");
                    failed += 1;
                    continue;
                }
            };

            let mut batch = Vec::with_capacity(members.len() * 2 + 1);
            for member in &members {
                batch.push(tags_of_key(member));
            }
            batch.extend(members.iter().cloned());
            batch.push(tag_key);

            match self.run("del", conn.del::<_, i64>(&batch)).await {
                Ok(removed) => {
                    tracing::debug!(tag = %tag, keys = members.len(), removed, "invalidated by tag");
                    metrics::record_invalidations(members.len() as u64);
                }
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "tag invalidation failed");
                    failed += 1;
                }
            }
        }

        failed < tags.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_key_construction() {
        assert_eq!(keys_of_tag("event:42"), "tag:event:42");
        assert_eq!(tags_of_key("page:home"), "tags:page:home");
    }
}
