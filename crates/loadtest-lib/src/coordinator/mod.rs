//! Coordinator for a cluster of load-test agents
//!
//! Drives the feedback loop: consume monitor samples, read the
//! cluster status, and apply rate-limited increments and decrements
//! until the active-user curve flattens. A decrement always wins on
//! an alerting sample; increments resume only once the alert has
//! cooled off for the configured rest time.

mod agent;
mod cluster;
mod samples;


pub use agent::LoadAgent;
pub use cluster::LoadAgentCluster;
pub use samples::{mean_y, slope, Point, SampleSeries};

pub(crate) use agent::REQUEST_TIMEOUT;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::models::PerfSample;
use crate::monitor::Monitor;
use crate::observability::LoadTestMetrics;

/// How a coordinator run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The active-user curve flattened; the estimate is the rounded
    /// mean of the samples inside the convergence window.
    Converged {
        supported_users: usize,
        samples: Vec<Point>,
    },
    /// An interrupt arrived before convergence
    Interrupted,
}

/// Coordinates a cluster of load-test agents against one target
pub struct Coordinator {
    config: CoordinatorConfig,
    cluster: LoadAgentCluster,
    monitor: Monitor,
}

impl Coordinator {
    /// Validate the configuration and build the cluster and monitor
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let cluster = LoadAgentCluster::new(config.cluster.clone())?;
        let monitor = Monitor::new(config.monitor.clone())?;
        Ok(Self {
            config,
            cluster,
            monitor,
        })
    }

    /// Run the experiment until convergence, interrupt, or fatal
    /// error. The monitor and cluster are shut down on every exit
    /// path.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunOutcome, CoordinatorError> {
        info!(
            num_agents = self.config.cluster.agents.len(),
            "ready to drive a cluster of load-test agents"
        );

        if let Err(e) = self.cluster.run().await {
            error!(error = %e, "running cluster failed");
            self.cluster.shutdown().await;
            return Err(e.into());
        }

        let mut samples_rx = self.monitor.run();
        let outcome = self.control_loop(&mut samples_rx, &mut shutdown).await;

        self.monitor.stop();
        self.cluster.shutdown().await;
        outcome
    }

    /// One iteration per received sample; see the module docs for the
    /// policy.
    async fn control_loop(
        &self,
        samples_rx: &mut mpsc::Receiver<PerfSample>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunOutcome, CoordinatorError> {
        let inc_value = self.config.num_users_inc;
        let dec_value = self.config.num_users_dec;
        let rest_time = self.config.rest_time();
        let stop_threshold = self.config.stop_threshold;
        let max_active_users = self.config.cluster.max_active_users;
        let metrics = LoadTestMetrics::new();

        let mut last_action_time: Option<Instant> = None;
        let mut last_alert_time: Option<Instant> = None;
        let mut series = SampleSeries::new(self.config.samples_time_range());

        loop {
            let sample = tokio::select! {
                _ = shutdown.changed() => {
                    info!("coordinator shutting down");
                    return Ok(RunOutcome::Interrupted);
                }
                sample = samples_rx.recv() => match sample {
                    Some(sample) => sample,
                    // A closed sample channel means the monitor was
                    // stopped; treat it like an interrupt.
                    None => {
                        info!("monitor channel closed, shutting down");
                        return Ok(RunOutcome::Interrupted);
                    }
                },
            };

            let now = Instant::now();
            if sample.alert {
                last_alert_time = Some(now);
                metrics.inc_alerts();
            }

            let status = self.cluster.status();
            info!(
                active_users = status.active_users,
                errors = status.num_errors,
                "cluster status"
            );
            metrics.set_cluster_status(status.active_users, status.num_errors);

            // Equilibrium detection starts with the first alert: once
            // the best-fit line over the window flattens and at least
            // one older sample exists for contrast, the test is done.
            if last_alert_time.is_some() {
                series.push(now, status.active_users);
                let latest = series.latest(now);
                if !latest.is_empty()
                    && latest.len() < series.len()
                    && slope(latest).abs() < stop_threshold
                {
                    let supported_users = mean_y(latest).round() as usize;
                    info!(supported_users, "coordinator done");
                    return Ok(RunOutcome::Converged {
                        supported_users,
                        samples: latest.to_vec(),
                    });
                }
                series.compact(now);
            }

            // Rest between actions so the metrics can stabilize
            // before the next adjustment.
            let gate_open = match (last_alert_time, last_action_time) {
                (None, _) | (_, None) => true,
                (Some(_), Some(action)) => now > action + rest_time,
            };
            if !gate_open {
                info!("waiting for metrics to stabilize");
                continue;
            }

            if sample.alert {
                info!(num_users = dec_value, "decrementing active users");
                match self.cluster.decrement_users(dec_value).await {
                    Ok(()) => {
                        last_action_time = Some(now);
                        metrics.inc_decrements();
                    }
                    Err(e) => error!(error = %e, "failed to decrement users"),
                }
            } else if last_alert_time.map_or(true, |alert| now > alert + rest_time)
                && status.active_users < max_active_users
            {
                let inc = inc_value.min(max_active_users - status.active_users);
                info!(num_users = inc, "incrementing active users");
                match self.cluster.increment_users(inc).await {
                    Ok(()) => {
                        last_action_time = Some(now);
                        metrics.inc_increments();
                    }
                    Err(e) => error!(error = %e, "failed to increment users"),
                }
            }
        }
    }
}
