// Sync metrics module
//
// Lightweight counters for the read/write/watch pipeline of a persistor

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Persistor metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Each [`PluginPersistor`](crate::state::PluginPersistor) owns one instance
/// and logs a summary on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Completed write passes, successful or not
    pub write_passes: AtomicU64,

    /// Write passes that failed on either file
    pub write_failures: AtomicU64,

    /// Individual attempts to read the plugin files (including the empty-file re-read)
    pub read_attempts: AtomicU64,

    /// Reads that failed with something other than a missing file
    pub read_failures: AtomicU64,

    /// Delayed retries scheduled after a failed read
    pub read_retries: AtomicU64,

    /// Reloads triggered by the file watcher
    pub watch_refreshes: AtomicU64,

    /// Watcher events dropped because a write pass was in progress
    pub suppressed_events: AtomicU64,

    /// Times the table was replaced out of band
    pub table_resets: AtomicU64,

    /// Total time spent in write passes, in milliseconds
    pub total_write_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            write_passes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            read_attempts: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            read_retries: AtomicU64::new(0),
            watch_refreshes: AtomicU64::new(0),
            suppressed_events: AtomicU64::new(0),
            table_resets: AtomicU64::new(0),
            total_write_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_write_pass(&self, duration: Duration, success: bool) {
        self.write_passes.fetch_add(1, Ordering::Relaxed);
        self.total_write_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        if !success {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_read_attempt(&self) {
        self.read_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_retry(&self) {
        self.read_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_refresh(&self) {
        self.watch_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed_event(&self) {
        self.suppressed_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_table_reset(&self) {
        self.table_resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Convenience reader for tests and summaries
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average write pass duration in milliseconds
    pub fn avg_write_time_ms(&self) -> f64 {
        let total = self.total_write_time_ms.load(Ordering::Relaxed);
        let count = self.write_passes.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Plugin Sync Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Writes: {} passes, {} failed (avg: {:.2}ms per pass)",
            self.write_passes.load(Ordering::Relaxed),
            self.write_failures.load(Ordering::Relaxed),
            self.avg_write_time_ms()
        );
        tracing::info!(
            "Reads: {} attempts, {} failed, {} retries scheduled",
            self.read_attempts.load(Ordering::Relaxed),
            self.read_failures.load(Ordering::Relaxed),
            self.read_retries.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Watcher: {} refreshes, {} self-write events suppressed, {} table resets",
            self.watch_refreshes.load(Ordering::Relaxed),
            self.suppressed_events.load(Ordering::Relaxed),
            self.table_resets.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
