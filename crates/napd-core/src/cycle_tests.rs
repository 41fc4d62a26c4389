use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::config::DecisionConfig;
use crate::cycle::{Agent, AgentParts, CycleDriver, CycleError, CycleOutcome};
use crate::mock::MockHost;
use crate::pipeline::AbortReason;
use crate::session::SessionSource;
use crate::snapshot::ActivitySnapshot;
use crate::uptime::UptimeSource;

const INTERVAL: Duration = Duration::from_secs(60);
const CYCLE_TIMEOUT: Duration = Duration::from_secs(45);

fn suspendable() -> ActivitySnapshot {
    ActivitySnapshot {
        connection_count: 0,
        next_activity: 5000,
        current_time: 4000,
    }
}

fn agent(host: &MockHost, dry_run: bool) -> Arc<Agent> {
    Arc::new(Agent::new(DecisionConfig::default(), dry_run, host.parts()))
}

/// Panics on the first call, then reports an idle box.
#[derive(Default)]
struct PanicsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl SessionSource for PanicsOnce {
    async fn has_active_session(&self) -> bool {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("utmp exploded");
        }
        false
    }
}

/// Hangs forever on the first read.
#[derive(Default)]
struct HangsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl UptimeSource for HangsOnce {
    async fn read(&self) -> Option<u64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Some(1500)
    }
}

#[tokio::test]
async fn passing_cycle_arms_alarm_then_suspends() {
    // Arrange
    let host = MockHost::idle().with_snapshot(suspendable());
    let agent = agent(&host, false);

    // Act
    let outcome = agent.run_cycle().await;

    // Assert
    assert_eq!(outcome, CycleOutcome::Suspended { wake_at: 4880 });
    assert_eq!(host.wake.programmed(), vec![4880]);
    assert_eq!(host.power.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_alarm_never_suspends() {
    let host = MockHost::idle().with_snapshot(suspendable());
    host.wake.succeed.store(false, Ordering::SeqCst);

    let outcome = agent(&host, false).run_cycle().await;

    assert_eq!(outcome, CycleOutcome::WakeAlarmFailed { wake_at: 4880 });
    assert_eq!(host.power.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_suspend_is_reported() {
    let host = MockHost::idle().with_snapshot(suspendable());
    host.power.succeed.store(false, Ordering::SeqCst);

    let outcome = agent(&host, false).run_cycle().await;

    assert_eq!(outcome, CycleOutcome::SuspendFailed { wake_at: 4880 });
}

#[tokio::test]
async fn aborted_cycle_touches_no_hardware() {
    let host = MockHost::idle().with_snapshot(ActivitySnapshot {
        connection_count: 1,
        ..suspendable()
    });

    let outcome = agent(&host, false).run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Aborted(AbortReason::ClientsConnected { count: 1 })
    );
    assert!(host.wake.programmed().is_empty());
    assert_eq!(host.power.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dry_run_decides_but_does_not_act() {
    let host = MockHost::idle().with_snapshot(suspendable());

    let outcome = agent(&host, true).run_cycle().await;

    assert_eq!(outcome, CycleOutcome::DryRun { wake_at: 4880 });
    assert!(host.wake.programmed().is_empty());
    assert_eq!(host.power.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_runs_one_cycle_per_interval_until_shutdown() {
    // Arrange: the box keeps aborting at the session guard.
    let host = MockHost::idle();
    host.sessions.active.store(true, Ordering::SeqCst);
    let mut driver = CycleDriver::new(agent(&host, false), INTERVAL, CYCLE_TIMEOUT);

    // Act: cycles start at t=0, 60 and 120; shutdown lands at 150.
    driver.run(sleep(Duration::from_secs(150))).await;

    // Assert
    assert_eq!(driver.cycles(), 3);
    assert_eq!(host.sessions.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn panicking_cycle_does_not_stop_the_driver() {
    // Arrange
    let host = MockHost::idle().with_snapshot(suspendable());
    let sessions = Arc::new(PanicsOnce::default());
    let parts = AgentParts {
        sessions: sessions.clone(),
        ..host.parts()
    };
    let agent = Arc::new(Agent::new(DecisionConfig::default(), true, parts));
    let mut driver = CycleDriver::new(agent, INTERVAL, CYCLE_TIMEOUT);

    // Act
    let first = driver.tick().await;
    let second = driver.tick().await;

    // Assert
    assert!(matches!(first, Err(CycleError::Panicked(ref msg)) if msg.contains("utmp exploded")));
    let report = second.expect("second cycle runs");
    assert_eq!(report.cycle, 2);
    assert_eq!(report.outcome, CycleOutcome::DryRun { wake_at: 4880 });
}

#[tokio::test(start_paused = true)]
async fn hung_cycle_times_out_and_the_next_one_runs() {
    // Arrange
    let host = MockHost::idle().with_snapshot(suspendable());
    let parts = AgentParts {
        uptime: Arc::new(HangsOnce::default()),
        ..host.parts()
    };
    let agent = Arc::new(Agent::new(DecisionConfig::default(), false, parts));
    let mut driver = CycleDriver::new(agent, INTERVAL, CYCLE_TIMEOUT);

    // Act
    let first = driver.tick().await;
    let second = driver.tick().await;

    // Assert
    assert!(matches!(first, Err(CycleError::TimedOut(t)) if t == CYCLE_TIMEOUT));
    assert_eq!(
        second.expect("second cycle runs").outcome,
        CycleOutcome::Suspended { wake_at: 4880 }
    );
    assert_eq!(host.wake.programmed(), vec![4880]);
}

#[tokio::test(start_paused = true)]
async fn failing_cycles_keep_the_loop_alive() {
    let host = MockHost::idle().with_snapshot(suspendable());
    let sessions = Arc::new(PanicsOnce::default());
    let parts = AgentParts {
        sessions: sessions.clone(),
        ..host.parts()
    };
    let agent = Arc::new(Agent::new(DecisionConfig::default(), true, parts));
    let mut driver = CycleDriver::new(agent, INTERVAL, CYCLE_TIMEOUT);

    driver.run(sleep(Duration::from_secs(90))).await;

    assert_eq!(driver.cycles(), 2);
    assert_eq!(sessions.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn report_serializes_outcome_with_tag() {
    let outcome = CycleOutcome::Aborted(AbortReason::ActiveSession);

    let value = serde_json::to_value(&outcome).expect("serialize");

    assert_eq!(
        value,
        serde_json::json!({"outcome": "aborted", "reason": "active_session"})
    );
}
