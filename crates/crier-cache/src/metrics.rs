//! Prometheus counters for cache traffic.
//!
//! The exporter itself is owned by the server process; this module only
//! emits through the `metrics` facade, so it is a no-op until a recorder
//! is installed.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_WRITES_TOTAL: &str = "cache_writes_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
}

/// Record a cache hit.
pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a successful cache write.
pub fn record_cache_write() {
    counter!(names::CACHE_WRITES_TOTAL).increment(1);
}

/// Record keys removed by explicit or tag-driven invalidation.
pub fn record_invalidations(count: u64) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL).increment(count);
}

/// Record a swallowed backend error.
pub fn record_cache_error(operation: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
}
