//! Atomic counters describing pipeline activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    runs: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed pipeline run.
    pub fn record_run(&self, cache_hit: bool, failed: bool) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of pipeline runs since startup.
    pub runs: u64,
    /// Runs served from the summary cache.
    pub cache_hits: u64,
    /// Runs that terminated with a recorded error.
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_runs_hits_and_failures() {
        let metrics = PipelineMetrics::new();
        metrics.record_run(true, false);
        metrics.record_run(false, true);
        metrics.record_run(false, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 3);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.failures, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = PipelineMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.failures, 0);
    }
}
