//! Process-local counters backing `GetMetrics()` (§4.10/§6). Not a durable
//! metrics pipeline — just atomics maintained alongside the gateway and
//! delegation manager, read back on demand.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    llm_calls: AtomicU64,
    total_response_time_ms: AtomicU64,
    tool_usage: AtomicU64,
    tool_errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub llm_calls: u64,
    pub avg_response_time_ms: f64,
    pub tool_usage: u64,
    pub tool_errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed `Query` call: its wall-clock duration, how many
    /// sub-tasks it ran (tool_usage), and how many of those failed.
    pub fn record_query(&self, duration_ms: u64, sub_tasks_run: u64, sub_tasks_failed: u64) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.tool_usage.fetch_add(sub_tasks_run, Ordering::Relaxed);
        self.tool_errors.fetch_add(sub_tasks_failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let llm_calls = self.llm_calls.load(Ordering::Relaxed);
        let total_response_time_ms = self.total_response_time_ms.load(Ordering::Relaxed);
        let avg_response_time_ms = if llm_calls == 0 { 0.0 } else { total_response_time_ms as f64 / llm_calls as f64 };

        MetricsSnapshot {
            llm_calls,
            avg_response_time_ms,
            tool_usage: self.tool_usage.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_response_time_across_calls() {
        let metrics = Metrics::new();
        metrics.record_query(100, 2, 1);
        metrics.record_query(300, 1, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.llm_calls, 2);
        assert_eq!(snapshot.avg_response_time_ms, 200.0);
        assert_eq!(snapshot.tool_usage, 3);
        assert_eq!(snapshot.tool_errors, 1);
    }

    #[test]
    fn empty_snapshot_has_zero_average_not_nan() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().avg_response_time_ms, 0.0);
    }
}
