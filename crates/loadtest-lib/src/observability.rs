//! Prometheus metrics for the coordinator and the agent server

use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};
use std::sync::OnceLock;

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MetricsInner> = OnceLock::new();

struct MetricsInner {
    cluster_active_users: IntGauge,
    cluster_errors: IntGauge,
    user_increments_total: IntCounter,
    user_decrements_total: IntCounter,
    perf_alerts_total: IntCounter,
    agent_active_users: IntGauge,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            cluster_active_users: register_int_gauge!(
                "loadtest_cluster_active_users",
                "Aggregate number of active simulated users across the cluster"
            )
            .expect("Failed to register cluster_active_users"),

            cluster_errors: register_int_gauge!(
                "loadtest_cluster_errors",
                "Aggregate number of user action errors across the cluster"
            )
            .expect("Failed to register cluster_errors"),

            user_increments_total: register_int_counter!(
                "loadtest_user_increments_total",
                "Number of successful cluster-wide user increments"
            )
            .expect("Failed to register user_increments_total"),

            user_decrements_total: register_int_counter!(
                "loadtest_user_decrements_total",
                "Number of successful cluster-wide user decrements"
            )
            .expect("Failed to register user_decrements_total"),

            perf_alerts_total: register_int_counter!(
                "loadtest_perf_alerts_total",
                "Number of performance alerts received from the monitor"
            )
            .expect("Failed to register perf_alerts_total"),

            agent_active_users: register_int_gauge!(
                "loadtest_agent_active_users",
                "Number of active simulated users on this agent"
            )
            .expect("Failed to register agent_active_users"),
        }
    }
}

/// Lightweight handle to the global metrics instance
///
/// Clones share the same underlying metrics.
#[derive(Clone, Default)]
pub struct LoadTestMetrics {
    _private: (),
}

impl LoadTestMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn set_cluster_status(&self, active_users: usize, num_errors: i64) {
        self.inner().cluster_active_users.set(active_users as i64);
        self.inner().cluster_errors.set(num_errors);
    }

    pub fn inc_increments(&self) {
        self.inner().user_increments_total.inc();
    }

    pub fn inc_decrements(&self) {
        self.inner().user_decrements_total.inc();
    }

    pub fn inc_alerts(&self) {
        self.inner().perf_alerts_total.inc();
    }

    pub fn set_agent_active_users(&self, count: usize) {
        self.inner().agent_active_users.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_handle_records_without_panicking() {
        let metrics = LoadTestMetrics::new();
        metrics.set_cluster_status(42, 3);
        metrics.inc_increments();
        metrics.inc_decrements();
        metrics.inc_alerts();
        metrics.set_agent_active_users(8);
    }
}
