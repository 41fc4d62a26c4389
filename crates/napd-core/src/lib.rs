pub mod activity;
pub mod config;
pub mod cycle;
pub mod host;
pub mod mock;
pub mod pipeline;
pub mod power;
pub mod session;
pub mod snapshot;
pub mod uptime;
pub mod wake;

#[cfg(test)]
mod cycle_tests;

pub use activity::{ActivityError, ActivityService, TvheadendClient};
pub use config::{AgentConfig, DecisionConfig, HostConfig, ServiceConfig};
pub use cycle::{Agent, AgentParts, CycleDriver, CycleError, CycleOutcome, CycleReport};
pub use host::{CommandOutput, CommandRunner, HostError, Invocation, SystemRunner};
pub use pipeline::{AbortReason, Decision, DecisionPipeline, Guard};
pub use power::{HaltCommand, PowerController};
pub use session::{LoginSessions, SessionSource};
pub use snapshot::ActivitySnapshot;
pub use uptime::{ProcUptime, UptimeSource};
pub use wake::{RtcWakeAlarm, WakeProgrammer};
