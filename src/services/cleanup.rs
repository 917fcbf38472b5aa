//! Cache maintenance task
//!
//! Runs as a background task on startup, then periodically.
//! Memory caches drop expired entries; Redis expires keys natively.

use std::time::Duration;
use tokio::time;

use crate::services::cache::Cache;

/// Configuration for the cleanup service
pub struct CleanupConfig {
    /// How often to run a sweep (in seconds)
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300, // Every five minutes
        }
    }
}

/// Result of a cleanup operation
#[derive(Debug, Default)]
pub struct CleanupResult {
    pub expired_removed: usize,
    pub remaining: Option<usize>,
}

/// Run a single sweep cycle
pub async fn run_cleanup(cache: &Cache) -> CleanupResult {
    let expired_removed = cache.sweep().await;
    let remaining = cache.len().await;

    if expired_removed > 0 {
        tracing::info!(
            cache_gc_expired = expired_removed,
            cache_entries = ?remaining,
            msg = "expired cache entries removed"
        );
    }

    CleanupResult {
        expired_removed,
        remaining,
    }
}

/// Start the background cleanup task
///
/// Runs immediately on startup, then periodically at the configured interval.
/// This should be spawned as a background task using `tokio::spawn`.
pub async fn start_cleanup_task(cache: Cache, config: CleanupConfig) {
    tracing::info!(
        "Starting cache cleanup task (backend: {}, interval: {}s)",
        cache.backend(),
        config.interval_secs
    );

    let mut interval = time::interval(Duration::from_secs(config.interval_secs.max(1)));

    // First tick completes immediately, which gives the startup sweep
    loop {
        interval.tick().await;
        run_cleanup(&cache).await;
    }
}
