//! Process-wide counters exposed on `GET /metrics`

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    requests_submitted: AtomicU64,
    requests_rejected: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_partially_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    chapters_delivered: AtomicU64,
    chapters_skipped: AtomicU64,
    pages_failed: AtomicU64,
    delivery_retries: AtomicU64,
}

macro_rules! counter {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $method(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
                tracing::trace!(counter = stringify!($field), n, "Metric incremented");
            }
        )*
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        add_requests_submitted => requests_submitted,
        add_requests_rejected => requests_rejected,
        add_jobs_completed => jobs_completed,
        add_jobs_partially_failed => jobs_partially_failed,
        add_jobs_cancelled => jobs_cancelled,
        add_chapters_delivered => chapters_delivered,
        add_chapters_skipped => chapters_skipped,
        add_pages_failed => pages_failed,
        add_delivery_retries => delivery_retries,
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_submitted: self.requests_submitted.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_partially_failed: self.jobs_partially_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            chapters_delivered: self.chapters_delivered.load(Ordering::Relaxed),
            chapters_skipped: self.chapters_skipped.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_submitted: u64,
    pub requests_rejected: u64,
    pub jobs_completed: u64,
    pub jobs_partially_failed: u64,
    pub jobs_cancelled: u64,
    pub chapters_delivered: u64,
    pub chapters_skipped: u64,
    pub pages_failed: u64,
    pub delivery_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.add_requests_submitted(1);
        metrics.add_requests_submitted(1);
        metrics.add_pages_failed(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_submitted, 2);
        assert_eq!(snapshot.pages_failed, 3);
        assert_eq!(snapshot.jobs_completed, 0);
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let json = serde_json::to_value(Metrics::new().snapshot()).unwrap();
        assert_eq!(json["delivery_retries"], 0);
        assert_eq!(json.as_object().unwrap().len(), 9);
    }
}
