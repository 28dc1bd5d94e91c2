use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;

/// Shared metrics for the supervisor, safe for concurrent access.
#[derive(Debug, Default)]
pub struct SharedMetrics {
    /// Total number of supervisor ticks.
    pub ticks_total: AtomicU64,
    /// Ticks that failed to list pending work.
    pub tick_errors_total: AtomicU64,
    /// Supervision attempts that ran under the installation lock.
    pub attempts_total: AtomicU64,
    /// Installations skipped because another supervisor held the lock.
    pub lock_contention_total: AtomicU64,
    /// Placement tries that found the cluster locked.
    pub cluster_lock_contention_total: AtomicU64,
    /// Attempts abandoned because the installation lock was lost mid-way.
    pub lock_lost_total: AtomicU64,
    /// Attempts ended by a store error or a panic.
    pub attempt_errors_total: AtomicU64,
    /// Installations found in a state the supervisor cannot move.
    pub unexpected_state_total: AtomicU64,
    /// Failed provisioner calls.
    pub provisioner_failures_total: AtomicU64,
    /// Cluster installations created by placement.
    pub clusters_assigned_total: AtomicU64,
    /// Installation state changes written.
    pub installations_transitioned_total: AtomicU64,
}

impl SharedMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn exposition(&self) -> String {
        let counters: [(&str, &str, &AtomicU64); 11] = [
            ("ticks_total", "Total supervisor ticks.", &self.ticks_total),
            ("tick_errors_total", "Ticks that failed to list pending work.", &self.tick_errors_total),
            ("attempts_total", "Supervision attempts run under the installation lock.", &self.attempts_total),
            ("lock_contention_total", "Installations skipped due to lock contention.", &self.lock_contention_total),
            ("cluster_lock_contention_total", "Placement tries that found the cluster locked.", &self.cluster_lock_contention_total),
            ("lock_lost_total", "Attempts abandoned after losing the installation lock.", &self.lock_lost_total),
            ("attempt_errors_total", "Attempts ended by a store error or panic.", &self.attempt_errors_total),
            ("unexpected_state_total", "Installations in a state the supervisor cannot move.", &self.unexpected_state_total),
            ("provisioner_failures_total", "Failed provisioner calls.", &self.provisioner_failures_total),
            ("clusters_assigned_total", "Cluster installations created by placement.", &self.clusters_assigned_total),
            ("installations_transitioned_total", "Installation state changes written.", &self.installations_transitioned_total),
        ];

        let mut body = String::new();
        for (name, help, value) in counters {
            body.push_str(&format!(
                "# HELP fleet_supervisor_{name} {help}\n\
                 # TYPE fleet_supervisor_{name} counter\n\
                 fleet_supervisor_{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        body
    }
}

/// GET /metrics, in Prometheus text exposition format.
pub async fn metrics_handler(State(metrics): State<Arc<SharedMetrics>>) -> impl IntoResponse {
    (axum::http::StatusCode::OK, metrics.exposition())
}

/// GET /healthz liveness probe.
pub async fn healthz_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposition_lists_every_counter() {
        let metrics = SharedMetrics::default();
        SharedMetrics::incr(&metrics.ticks_total);
        SharedMetrics::incr(&metrics.ticks_total);
        SharedMetrics::incr(&metrics.lock_contention_total);

        let body = metrics.exposition();
        assert!(body.contains("fleet_supervisor_ticks_total 2\n"));
        assert!(body.contains("fleet_supervisor_lock_contention_total 1\n"));
        assert!(body.contains("# TYPE fleet_supervisor_unexpected_state_total counter\n"));
        assert_eq!(body.matches("# TYPE").count(), 11);
    }
}
