//! Local load-test engine
//!
//! Runs the pool of simulated users behind one agent. Each user is a
//! tokio task paced by the configured controller; the workload the
//! users would drive against a target lives outside this crate, so an
//! action here is a paced tick. The engine owns the agent-side state
//! machine and enforces the per-agent user cap.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{ControllerConfig, LoadTestConfig};
use crate::error::EngineError;
use crate::models::{AgentState, AgentStatus};

/// A running simulated user
struct UserSlot {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// The load-test engine behind one agent
pub struct LoadTester {
    id: String,
    config: LoadTestConfig,
    controller: ControllerConfig,
    state: AgentState,
    users: Vec<UserSlot>,
    errors: Arc<AtomicI64>,
}

impl LoadTester {
    pub fn new(id: impl Into<String>, config: LoadTestConfig, controller: ControllerConfig) -> Self {
        Self {
            id: id.into(),
            config,
            controller,
            state: AgentState::Created,
            users: Vec::new(),
            errors: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start the engine and its configured initial users
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.state != AgentState::Created {
            return Err(EngineError::InvalidTransition {
                op: "run",
                from: self.state,
            });
        }
        self.state = AgentState::Running;
        let initial = self.config.users.initial_active_users;
        for _ in 0..initial {
            self.spawn_user();
        }
        info!(agent_id = %self.id, initial_users = initial, "engine running");
        Ok(())
    }

    pub fn add_users(&mut self, amount: usize) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        if self.state != AgentState::Running {
            return Err(EngineError::NotRunning(self.state));
        }
        let limit = self.config.users.max_active_users;
        if self.users.len() + amount > limit {
            return Err(EngineError::MaxUsersReached { limit });
        }
        for _ in 0..amount {
            self.spawn_user();
        }
        debug!(agent_id = %self.id, amount, active = self.users.len(), "users added");
        Ok(())
    }

    /// Remove up to `amount` users; removing from an idle engine is
    /// an error.
    pub fn remove_users(&mut self, amount: usize) -> Result<(), EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        if self.state != AgentState::Running {
            return Err(EngineError::NotRunning(self.state));
        }
        if self.users.is_empty() {
            return Err(EngineError::NoActiveUsers);
        }
        let n = amount.min(self.users.len());
        for slot in self.users.drain(self.users.len() - n..) {
            let _ = slot.stop_tx.send(true);
            slot.handle.abort();
        }
        debug!(agent_id = %self.id, removed = n, active = self.users.len(), "users removed");
        Ok(())
    }

    /// Stop every user and leave the engine stopped; idempotent
    pub fn stop(&mut self) {
        for slot in self.users.drain(..) {
            let _ = slot.stop_tx.send(true);
            slot.handle.abort();
        }
        self.state = AgentState::Stopped;
        info!(agent_id = %self.id, "engine stopped");
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            active_users: self.users.len(),
            num_errors: self.errors.load(Ordering::SeqCst),
            state: self.state,
        }
    }

    fn spawn_user(&mut self) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let pacer = Pacer::new(&self.controller, self.users.len() as u64);
        let errors = self.errors.clone();
        let handle = tokio::spawn(run_user(pacer, errors, stop_rx));
        self.users.push(UserSlot { handle, stop_tx });
    }
}

impl Drop for LoadTester {
    fn drop(&mut self) {
        for slot in self.users.drain(..) {
            slot.handle.abort();
        }
    }
}

/// One simulated user: sleep, act, repeat until stopped
async fn run_user(mut pacer: Pacer, _errors: Arc<AtomicI64>, mut stop: watch::Receiver<bool>) {
    loop {
        let pause = pacer.next_pause();
        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep(pause) => {
                // The user's action against the target happens here;
                // failures feed the shared error counter.
            }
        }
    }
}

/// Idle-time pacing derived from the controller configuration
struct Pacer {
    base: Duration,
    spread_ms: u64,
    tick: u64,
}

impl Pacer {
    fn new(controller: &ControllerConfig, seed: u64) -> Self {
        match controller {
            ControllerConfig::Simple(c) => Self {
                base: Duration::from_millis(c.action_interval_ms),
                spread_ms: 0,
                tick: seed,
            },
            // Spread idle times over [min, 2*avg - min] so they
            // average out to avg_idle_time_ms.
            ControllerConfig::Simulative(c) => Self {
                base: Duration::from_millis(c.min_idle_time_ms),
                spread_ms: 2 * c.avg_idle_time_ms.saturating_sub(c.min_idle_time_ms),
                tick: seed,
            },
        }
    }

    fn next_pause(&mut self) -> Duration {
        if self.spread_ms == 0 {
            return self.base;
        }
        self.tick = self.tick.wrapping_add(1);
        self.base + Duration::from_millis(jitter(self.spread_ms, self.tick))
    }
}

/// Cheap time-seeded jitter in `[0, max_ms)`
fn jitter(max_ms: u64, tick: u64) -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    now.wrapping_mul(6364136223846793005)
        .wrapping_add(tick)
        % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimpleControllerConfig, SimulControllerConfig, UsersConfig};

    fn tester(max_users: usize) -> LoadTester {
        LoadTester::new(
            "agent-0",
            LoadTestConfig {
                users: UsersConfig {
                    initial_active_users: 0,
                    max_active_users: max_users,
                },
            },
            ControllerConfig::Simple(SimpleControllerConfig {
                action_interval_ms: 10,
            }),
        )
    }

    #[tokio::test]
    async fn starts_in_created_state() {
        let tester = tester(10);
        let status = tester.status();
        assert_eq!(status.state, AgentState::Created);
        assert_eq!(status.active_users, 0);
        assert_eq!(status.num_errors, 0);
    }

    #[tokio::test]
    async fn run_spawns_initial_users() {
        let mut tester = LoadTester::new(
            "agent-0",
            LoadTestConfig {
                users: UsersConfig {
                    initial_active_users: 3,
                    max_active_users: 10,
                },
            },
            ControllerConfig::default(),
        );
        tester.run().unwrap();
        assert_eq!(tester.status().state, AgentState::Running);
        assert_eq!(tester.status().active_users, 3);
        tester.stop();
    }

    #[tokio::test]
    async fn add_and_remove_users() {
        let mut tester = tester(10);
        tester.run().unwrap();

        tester.add_users(4).unwrap();
        assert_eq!(tester.status().active_users, 4);

        tester.remove_users(2).unwrap();
        assert_eq!(tester.status().active_users, 2);

        // Removing more than active drains the rest.
        tester.remove_users(10).unwrap();
        assert_eq!(tester.status().active_users, 0);
        tester.stop();
    }

    #[tokio::test]
    async fn add_users_respects_cap() {
        let mut tester = tester(5);
        tester.run().unwrap();
        tester.add_users(5).unwrap();

        let err = tester.add_users(1).unwrap_err();
        assert!(matches!(err, EngineError::MaxUsersReached { limit: 5 }));
        assert_eq!(tester.status().active_users, 5);
        tester.stop();
    }

    #[tokio::test]
    async fn remove_from_idle_engine_is_an_error() {
        let mut tester = tester(10);
        tester.run().unwrap();
        assert!(matches!(
            tester.remove_users(1),
            Err(EngineError::NoActiveUsers)
        ));
        tester.stop();
    }

    #[tokio::test]
    async fn operations_require_running_state() {
        let mut tester = tester(10);
        assert!(matches!(
            tester.add_users(1),
            Err(EngineError::NotRunning(AgentState::Created))
        ));

        tester.run().unwrap();
        tester.stop();
        assert!(matches!(
            tester.add_users(1),
            Err(EngineError::NotRunning(AgentState::Stopped))
        ));
    }

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let mut tester = tester(10);
        tester.run().unwrap();
        assert!(matches!(
            tester.run(),
            Err(EngineError::InvalidTransition { op: "run", .. })
        ));
        tester.stop();
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let mut tester = tester(10);
        tester.run().unwrap();
        assert!(matches!(tester.add_users(0), Err(EngineError::InvalidAmount)));
        assert!(matches!(
            tester.remove_users(0),
            Err(EngineError::InvalidAmount)
        ));
        tester.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut tester = tester(10);
        tester.run().unwrap();
        tester.add_users(2).unwrap();
        tester.stop();
        tester.stop();
        assert_eq!(tester.status().state, AgentState::Stopped);
        assert_eq!(tester.status().active_users, 0);
    }

    #[test]
    fn simple_pacer_is_fixed_cadence() {
        let mut pacer = Pacer::new(
            &ControllerConfig::Simple(SimpleControllerConfig {
                action_interval_ms: 250,
            }),
            0,
        );
        assert_eq!(pacer.next_pause(), Duration::from_millis(250));
        assert_eq!(pacer.next_pause(), Duration::from_millis(250));
    }

    #[test]
    fn simulative_pacer_stays_in_bounds() {
        let mut pacer = Pacer::new(
            &ControllerConfig::Simulative(SimulControllerConfig {
                min_idle_time_ms: 100,
                avg_idle_time_ms: 300,
            }),
            7,
        );
        for _ in 0..100 {
            let pause = pacer.next_pause();
            assert!(pause >= Duration::from_millis(100));
            assert!(pause < Duration::from_millis(500));
        }
    }

    #[test]
    fn simulative_pacer_with_equal_min_avg_is_fixed() {
        let mut pacer = Pacer::new(
            &ControllerConfig::Simulative(SimulControllerConfig {
                min_idle_time_ms: 200,
                avg_idle_time_ms: 200,
            }),
            0,
        );
        assert_eq!(pacer.next_pause(), Duration::from_millis(200));
    }
}
