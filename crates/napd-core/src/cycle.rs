use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::activity::{ActivityError, ActivityService, TvheadendClient};
use crate::config::{AgentConfig, DecisionConfig};
use crate::host::{CommandRunner, SystemRunner};
use crate::pipeline::{AbortReason, Decision, DecisionPipeline};
use crate::power::{HaltCommand, PowerController};
use crate::session::{LoginSessions, SessionSource};
use crate::uptime::{ProcUptime, UptimeSource};
use crate::wake::{RtcWakeAlarm, WakeProgrammer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Aborted(AbortReason),
    /// All guards passed but acting was disabled.
    DryRun { wake_at: i64 },
    WakeAlarmFailed { wake_at: i64 },
    SuspendFailed { wake_at: i64 },
    Suspended { wake_at: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub ts: DateTime<Utc>,
    pub cycle: u64,
    pub elapsed_ms: u128,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("cycle did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("cycle panicked: {0}")]
    Panicked(String),
    #[error("cycle task was cancelled")]
    Cancelled,
}

impl From<JoinError> for CycleError {
    fn from(err: JoinError) -> Self {
        if !err.is_panic() {
            return Self::Cancelled;
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// The collaborators one cycle pulls from and acts on.
pub struct AgentParts {
    pub sessions: Arc<dyn SessionSource>,
    pub uptime: Arc<dyn UptimeSource>,
    pub activity: Arc<dyn ActivityService>,
    pub wake: Arc<dyn WakeProgrammer>,
    pub power: Arc<dyn PowerController>,
}

pub struct Agent {
    decision: DecisionConfig,
    dry_run: bool,
    parts: AgentParts,
}

impl Agent {
    pub fn new(decision: DecisionConfig, dry_run: bool, parts: AgentParts) -> Self {
        Self {
            decision,
            dry_run,
            parts,
        }
    }

    /// Wires the real host probes and the Tvheadend client.
    pub fn from_config(config: &AgentConfig) -> Result<Self, ActivityError> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(config.host.command_timeout));
        let parts = AgentParts {
            sessions: Arc::new(LoginSessions::new(
                Arc::clone(&runner),
                config.host.session_command.clone(),
            )),
            uptime: Arc::new(ProcUptime::new(config.host.uptime_path.clone())),
            activity: Arc::new(TvheadendClient::new(config.service.clone())?),
            wake: Arc::new(RtcWakeAlarm::new(
                Arc::clone(&runner),
                config.host.wake_alarm_path.clone(),
                config.host.use_sudo,
            )),
            power: Arc::new(HaltCommand::new(
                runner,
                config.host.suspend_command.clone(),
                config.host.use_sudo,
            )),
        };
        Ok(Self::new(config.decision.clone(), config.dry_run, parts))
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn parts(&self) -> &AgentParts {
        &self.parts
    }

    pub async fn decide(&self) -> Decision {
        DecisionPipeline {
            config: &self.decision,
            sessions: self.parts.sessions.as_ref(),
            uptime: self.parts.uptime.as_ref(),
            activity: self.parts.activity.as_ref(),
        }
        .evaluate()
        .await
    }

    /// One full cycle: decide, then arm the alarm and suspend. Suspend is only
    /// attempted after the alarm was armed.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let wake_at = match self.decide().await {
            Decision::Abort(reason) => return CycleOutcome::Aborted(reason),
            Decision::Proceed { wake_at } => wake_at,
        };

        if self.dry_run {
            return CycleOutcome::DryRun { wake_at };
        }
        if !self.parts.wake.program(wake_at).await {
            return CycleOutcome::WakeAlarmFailed { wake_at };
        }
        if !self.parts.power.suspend().await {
            return CycleOutcome::SuspendFailed { wake_at };
        }
        CycleOutcome::Suspended { wake_at }
    }
}

/// Runs the agent once per interval, isolating each cycle's failures.
pub struct CycleDriver {
    agent: Arc<Agent>,
    interval: Duration,
    cycle_timeout: Duration,
    cycles: u64,
}

impl CycleDriver {
    pub fn new(agent: Arc<Agent>, interval: Duration, cycle_timeout: Duration) -> Self {
        Self {
            agent,
            interval,
            cycle_timeout,
            cycles: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one cycle on its own task so a panic or a hang stays contained.
    pub async fn tick(&mut self) -> Result<CycleReport, CycleError> {
        self.cycles += 1;
        let ts = Utc::now();
        let started = Instant::now();

        let agent = Arc::clone(&self.agent);
        let handle = tokio::spawn(async move { agent.run_cycle().await });
        let abort = handle.abort_handle();

        let outcome = match timeout(self.cycle_timeout, handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                abort.abort();
                return Err(CycleError::TimedOut(self.cycle_timeout));
            }
        };

        Ok(CycleReport {
            ts,
            cycle: self.cycles,
            elapsed_ms: started.elapsed().as_millis(),
            outcome,
        })
    }

    /// Loops until `shutdown` resolves. Shutdown is only observed between cycles.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            match self.tick().await {
                Ok(report) => log_report(&report),
                Err(err) => error!(cycle = self.cycles, error = %err, "cycle failed, continuing"),
            }

            tokio::select! {
                _ = &mut shutdown => {
                    warn!(cycles = self.cycles, "shutdown requested, stopping");
                    break;
                }
                _ = sleep(self.interval) => {}
            }
        }
    }
}

pub fn log_report(report: &CycleReport) {
    match &report.outcome {
        CycleOutcome::Aborted(reason) => {
            info!(cycle = report.cycle, guard = ?reason.guard(), "aborted: {reason}")
        }
        CycleOutcome::DryRun { wake_at } => {
            info!(cycle = report.cycle, wake_at, "dry run, would arm wake alarm and suspend")
        }
        CycleOutcome::WakeAlarmFailed { wake_at } => {
            warn!(cycle = report.cycle, wake_at, "setting the wake alarm failed, not suspending")
        }
        CycleOutcome::SuspendFailed { wake_at } => {
            warn!(cycle = report.cycle, wake_at, "wake alarm armed but suspend could not be issued")
        }
        CycleOutcome::Suspended { wake_at } => {
            info!(cycle = report.cycle, wake_at, "wake alarm armed, suspend issued")
        }
    }
}
