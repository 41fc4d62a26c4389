//! Ordered guard chain that decides whether the box may suspend.
//!
//! Guards run in a fixed order and the first one that fails ends the
//! evaluation. Local facts (sessions, uptime) are checked before anything
//! touches the network, and absent data always aborts.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::activity::ActivityService;
use crate::config::DecisionConfig;
use crate::session::SessionSource;
use crate::snapshot::ActivitySnapshot;
use crate::uptime::UptimeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    Session,
    Uptime,
    Reachability,
    Snapshot,
    ClientConnection,
    PastActivity,
    Gap,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    #[error("an interactive session is attached")]
    ActiveSession,
    #[error("system uptime is unavailable")]
    UptimeUnavailable,
    #[error("uptime {uptime}s does not exceed the required {required}s")]
    UptimeTooShort { uptime: u64, required: u64 },
    #[error("tvheadend is unreachable")]
    ServiceUnreachable,
    #[error("activity snapshot is unavailable")]
    SnapshotUnavailable,
    #[error("{count} client(s) connected to tvheadend")]
    ClientsConnected { count: u32 },
    #[error("recording in progress (next activity {next_activity} is before {current_time})")]
    RecordingInProgress { next_activity: i64, current_time: i64 },
    #[error("gap of {gap}s to the next activity does not exceed {required}s")]
    GapTooShort { gap: i64, required: i64 },
}

impl AbortReason {
    pub fn guard(&self) -> Guard {
        match self {
            Self::ActiveSession => Guard::Session,
            Self::UptimeUnavailable | Self::UptimeTooShort { .. } => Guard::Uptime,
            Self::ServiceUnreachable => Guard::Reachability,
            Self::SnapshotUnavailable => Guard::Snapshot,
            Self::ClientsConnected { .. } => Guard::ClientConnection,
            Self::RecordingInProgress { .. } => Guard::PastActivity,
            Self::GapTooShort { .. } => Guard::Gap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Abort(AbortReason),
    /// Every guard passed; arm the alarm for `wake_at` (Unix seconds).
    Proceed { wake_at: i64 },
}

impl Decision {
    pub fn abort_guard(&self) -> Option<Guard> {
        match self {
            Self::Abort(reason) => Some(reason.guard()),
            Self::Proceed { .. } => None,
        }
    }
}

/// Guards 5 to 7 plus the wake-time computation, on an already fetched snapshot.
pub fn judge_snapshot(snapshot: &ActivitySnapshot, config: &DecisionConfig) -> Decision {
    if snapshot.connection_count > 0 {
        return Decision::Abort(AbortReason::ClientsConnected {
            count: snapshot.connection_count,
        });
    }
    debug!("no clients connected to tvheadend");

    if snapshot.next_activity < snapshot.current_time {
        return Decision::Abort(AbortReason::RecordingInProgress {
            next_activity: snapshot.next_activity,
            current_time: snapshot.current_time,
        });
    }
    debug!("no recording in progress");

    let gap = snapshot.gap_seconds();
    let required = config.min_gap.as_secs() as i64;
    if gap <= required {
        return Decision::Abort(AbortReason::GapTooShort { gap, required });
    }
    debug!(gap, "gap to next activity is long enough");

    Decision::Proceed {
        wake_at: snapshot.next_activity - config.pre_schedule.as_secs() as i64,
    }
}

pub struct DecisionPipeline<'a> {
    pub config: &'a DecisionConfig,
    pub sessions: &'a dyn SessionSource,
    pub uptime: &'a dyn UptimeSource,
    pub activity: &'a dyn ActivityService,
}

impl DecisionPipeline<'_> {
    pub async fn evaluate(&self) -> Decision {
        if self.sessions.has_active_session().await {
            return Decision::Abort(AbortReason::ActiveSession);
        }
        debug!("no interactive session attached");

        let Some(uptime) = self.uptime.read().await else {
            return Decision::Abort(AbortReason::UptimeUnavailable);
        };
        let required = self.config.min_uptime.as_secs();
        if uptime <= required {
            return Decision::Abort(AbortReason::UptimeTooShort { uptime, required });
        }
        debug!(uptime, "system has been up long enough");

        if !self.activity.is_service_reachable().await {
            return Decision::Abort(AbortReason::ServiceUnreachable);
        }
        debug!("tvheadend is up");

        let Some(snapshot) = self.activity.fetch_snapshot().await else {
            return Decision::Abort(AbortReason::SnapshotUnavailable);
        };

        judge_snapshot(&snapshot, self.config)
    }
}
