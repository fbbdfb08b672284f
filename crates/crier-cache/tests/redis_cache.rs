//! Integration tests for the tag-indexed caching layer.
//!
//! Tests use testcontainers to spin up a real Redis instance; one container
//! is shared across the suite. Each test works on its own key namespace.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crier_cache::{CacheConfig, CacheService, ConnectionStatus};
use serde::{Deserialize, Serialize};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, u16)> = OnceCell::const_new();

async fn redis_port() -> u16 {
    let (_, port) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let port = container
                .get_host_port_ipv4(6379)
                .await
                .expect("get mapped port");
            (container, port)
        })
        .await;
    *port
}

/// Route the crate's structured logging through the test harness. Safe to
/// call from every test; repeat initialization is ignored.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn connected_service() -> CacheService {
    init_tracing();
    let config = CacheConfig {
        host: "127.0.0.1".to_string(),
        port: redis_port().await,
        ..CacheConfig::default()
    };
    let cache = CacheService::new(config);
    cache.connect().await.expect("connect to redis");
    cache
}

fn unreachable_service() -> CacheService {
    init_tracing();
    CacheService::new(CacheConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        connect_timeout_ms: 500,
        command_timeout_ms: 300,
        max_retries: 0,
        ..CacheConfig::default()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    id: u64,
    title: String,
    tags: Vec<String>,
}

fn sample_article() -> Article {
    Article {
        id: 7,
        title: "Harbor bridge reopens".to_string(),
        tags: vec!["traffic".to_string(), "harbor".to_string()],
    }
}

#[tokio::test]
async fn test_set_get_round_trip() {
    let cache = connected_service().await;
    assert!(cache.is_ready());

    let article = sample_article();
    assert!(
        cache
            .set("rt:article", &article, Some(Duration::from_secs(60)))
            .await
    );
    assert_eq!(cache.get::<Article>("rt:article").await, Some(article));

    // Primitives and maps round-trip too.
    assert!(cache.set("rt:count", &42u64, None).await);
    assert_eq!(cache.get::<u64>("rt:count").await, Some(42));

    assert!(
        cache
            .set("rt:list", &vec![1i32, 2, 3], None)
            .await
    );
    assert_eq!(cache.get::<Vec<i32>>("rt:list").await, Some(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_get_miss_is_none() {
    let cache = connected_service().await;
    assert_eq!(cache.get::<Article>("miss:never-written").await, None);
}

#[tokio::test]
async fn test_undecodable_value_is_a_miss() {
    let cache = connected_service().await;

    assert!(cache.set("bad:shape", "just a string", None).await);
    // Stored as a JSON string, read back as a struct: decode fails, entry
    // is evicted, caller sees a plain miss.
    assert_eq!(cache.get::<Article>("bad:shape").await, None);
    assert!(!cache.exists("bad:shape").await);
}

#[tokio::test]
async fn test_ttl_expiry_yields_miss() {
    let cache = connected_service().await;

    assert!(
        cache
            .set("exp:key", &"short-lived", Some(Duration::from_secs(1)))
            .await
    );
    assert_eq!(cache.get::<String>("exp:key").await, Some("short-lived".to_string()));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cache.get::<String>("exp:key").await, None);
}

#[tokio::test]
async fn test_delete() {
    let cache = connected_service().await;

    assert!(cache.set("del:key", &1u8, None).await);
    assert!(cache.delete("del:key").await);
    assert_eq!(cache.get::<u8>("del:key").await, None);

    // Deleting an absent key reports false, not an error.
    assert!(!cache.delete("del:key").await);
}

#[tokio::test]
async fn test_delete_by_pattern() {
    let cache = connected_service().await;

    assert!(cache.set("pat:a", &1u8, None).await);
    assert!(cache.set("pat:b", &2u8, None).await);
    assert!(cache.set("other:c", &3u8, None).await);

    assert!(cache.delete_by_pattern("pat:*").await);
    assert_eq!(cache.get::<u8>("pat:a").await, None);
    assert_eq!(cache.get::<u8>("pat:b").await, None);
    assert_eq!(cache.get::<u8>("other:c").await, Some(3));

    // Nothing left to match.
    assert!(!cache.delete_by_pattern("pat:*").await);
}

#[tokio::test]
async fn test_increment_sequence_and_restart() {
    let cache = connected_service().await;

    for expected in 1..=5 {
        assert_eq!(
            cache
                .increment("ctr:seq", Some(Duration::from_secs(1)))
                .await,
            expected
        );
    }

    tokio::time::sleep(Duration::from_millis(1600)).await;

    // Counter expired with its TTL; a fresh increment restarts at 1.
    assert_eq!(
        cache
            .increment("ctr:seq", Some(Duration::from_secs(1)))
            .await,
        1
    );
}

#[tokio::test]
async fn test_hash_operations() {
    let cache = connected_service().await;

    assert!(
        cache
            .hash_set("h:session", "user", &"alice", None)
            .await
    );
    assert!(cache.hash_set("h:session", "visits", &3u32, None).await);

    assert_eq!(
        cache.hash_get::<String>("h:session", "user").await,
        Some("alice".to_string())
    );
    assert_eq!(cache.hash_get::<String>("h:session", "absent").await, None);

    let all = cache.hash_get_all::<serde_json::Value>("h:session").await;
    assert_eq!(all.len(), 2);
    assert_eq!(all["user"], serde_json::json!("alice"));
    assert_eq!(all["visits"], serde_json::json!(3));

    // The hash shares one TTL.
    assert!(cache.ttl_remaining("h:session").await.is_some());
}

#[tokio::test]
async fn test_get_or_set_cold_then_warm() {
    let cache = connected_service().await;
    let calls = Arc::new(AtomicUsize::new(0));

    let loaded: Result<Article, anyhow::Error> = cache
        .get_or_set("aside:article", Some(Duration::from_secs(60)), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(sample_article())
            }
        })
        .await;
    assert_eq!(loaded.unwrap(), sample_article());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Warm call: served from cache, loader untouched.
    let loaded: Result<Article, anyhow::Error> = cache
        .get_or_set("aside:article", Some(Duration::from_secs(60)), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(sample_article())
            }
        })
        .await;
    assert_eq!(loaded.unwrap(), sample_article());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_or_set_loader_error_propagates() {
    let cache = connected_service().await;

    let result: Result<Article, String> = cache
        .get_or_set("aside:failing", None, || async {
            Err("primary store is down".to_string())
        })
        .await;
    assert_eq!(result.unwrap_err(), "primary store is down");

    // Nothing was cached on the failed load.
    assert_eq!(cache.get::<Article>("aside:failing").await, None);
}

#[tokio::test]
async fn test_get_or_set_single_flight() {
    let cache = Arc::new(connected_service().await);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let value: Result<u64, anyhow::Error> = cache
                .get_or_set("aside:herd", Some(Duration::from_secs(60)), || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the gate long enough for the herd to pile up.
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        Ok(99)
                    }
                })
                .await;
            value.unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 99);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tag_invalidation() {
    let cache = connected_service().await;
    let ttl = Some(Duration::from_secs(60));

    assert!(
        cache
            .set_with_tags("page:1", &"about the regatta", &["event:regatta", "section:news"], ttl)
            .await
    );
    assert!(
        cache
            .set_with_tags("page:2", &"sports roundup", &["section:news"], ttl)
            .await
    );

    assert!(cache.invalidate_by_tags(&["event:regatta"]).await);

    // Tagged key is gone, sibling with a different tag survives.
    assert_eq!(cache.get::<String>("page:1").await, None);
    assert_eq!(
        cache.get::<String>("page:2").await,
        Some("sports roundup".to_string())
    );

    // "page:1" stays a stale member of the surviving tag set; the next
    // invalidation simply DELs an already-absent key, a harmless no-op.
    assert!(cache.invalidate_by_tags(&["section:news"]).await);
    assert_eq!(cache.get::<String>("page:2").await, None);
}

#[tokio::test]
async fn test_invalidate_unknown_tag_is_noop() {
    let cache = connected_service().await;
    assert!(cache.invalidate_by_tags(&["tag:that-never-was"]).await);
    assert!(cache.invalidate_by_tags(&[]).await);
}

#[tokio::test]
async fn test_stats_snapshot() {
    let cache = connected_service().await;
    assert!(cache.set("stats:probe", &1u8, None).await);

    let stats = cache.stats().await.expect("stats while connected");
    assert!(stats.connected);
    assert_eq!(stats.status, "ready");
    assert!(stats.db_keys >= 1);
    assert!(stats.used_memory_bytes > 0);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let cache = connected_service().await;
    cache.connect().await.expect("second connect is a no-op");
    assert_eq!(cache.status(), ConnectionStatus::Ready);
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    let cache = connected_service().await;
    cache.disconnect().await;
    assert!(!cache.is_ready());
    assert!(!cache.set("dc:key", &1u8, None).await);

    cache.connect().await.expect("reconnect");
    assert!(cache.set("dc:key", &1u8, None).await);
}

#[tokio::test]
async fn test_unreachable_backend_degrades_safely() {
    let cache = unreachable_service();
    assert!(cache.connect().await.is_err());
    assert!(!cache.is_ready());

    // Every primitive returns its documented safe default, nothing throws.
    assert_eq!(cache.get::<Article>("down:key").await, None);
    assert!(!cache.set("down:key", &1u8, None).await);
    assert!(!cache.delete("down:key").await);
    assert!(!cache.delete_by_pattern("down:*").await);
    assert_eq!(cache.increment("down:ctr", None).await, 0);
    assert_eq!(cache.hash_get::<String>("down:h", "f").await, None);
    assert!(cache.hash_get_all::<String>("down:h").await.is_empty());
    assert!(!cache.set_with_tags("down:key", &1u8, &["t"], None).await);
    assert!(!cache.invalidate_by_tags(&["t"]).await);
    assert!(cache.stats().await.is_none());

    // Cache-aside still serves the loader's value.
    let value: Result<u64, anyhow::Error> = cache
        .get_or_set("down:aside", None, || async { Ok(41 + 1) })
        .await;
    assert_eq!(value.unwrap(), 42);
}
