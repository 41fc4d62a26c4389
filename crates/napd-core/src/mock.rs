//! Scripted collaborators for exercising the pipeline and driver without a host

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::activity::ActivityService;
use crate::cycle::AgentParts;
use crate::host::{CommandOutput, CommandRunner, HostError, Invocation};
use crate::power::PowerController;
use crate::session::SessionSource;
use crate::snapshot::ActivitySnapshot;
use crate::uptime::UptimeSource;
use crate::wake::WakeProgrammer;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MockSessions {
    pub active: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockSessions {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionSource for MockSessions {
    async fn has_active_session(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct MockUptime {
    pub seconds: Mutex<Option<u64>>,
    pub calls: AtomicUsize,
}

impl MockUptime {
    pub fn new(seconds: Option<u64>) -> Self {
        Self {
            seconds: Mutex::new(seconds),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UptimeSource for MockUptime {
    async fn read(&self) -> Option<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.seconds)
    }
}

#[derive(Debug, Default)]
pub struct MockActivity {
    pub reachable: AtomicBool,
    pub snapshot: Mutex<Option<ActivitySnapshot>>,
    pub reachability_calls: AtomicUsize,
    pub snapshot_calls: AtomicUsize,
}

impl MockActivity {
    pub fn new(reachable: bool, snapshot: Option<ActivitySnapshot>) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            snapshot: Mutex::new(snapshot),
            reachability_calls: AtomicUsize::new(0),
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    pub fn network_calls(&self) -> usize {
        self.reachability_calls.load(Ordering::SeqCst) + self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityService for MockActivity {
    async fn is_service_reachable(&self) -> bool {
        self.reachability_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn fetch_snapshot(&self) -> Option<ActivitySnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.snapshot)
    }
}

#[derive(Debug)]
pub struct MockWake {
    pub succeed: AtomicBool,
    pub programmed: Mutex<Vec<i64>>,
}

impl MockWake {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed: AtomicBool::new(succeed),
            programmed: Mutex::new(Vec::new()),
        }
    }

    pub fn programmed(&self) -> Vec<i64> {
        lock(&self.programmed).clone()
    }
}

#[async_trait]
impl WakeProgrammer for MockWake {
    async fn program(&self, wake_at: i64) -> bool {
        lock(&self.programmed).push(wake_at);
        self.succeed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockPower {
    pub succeed: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockPower {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed: AtomicBool::new(succeed),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PowerController for MockPower {
    async fn suspend(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed.load(Ordering::SeqCst)
    }
}

/// Handles to every mock, kept so tests can inspect them after handing
/// the trait objects to an `Agent`.
pub struct MockHost {
    pub sessions: Arc<MockSessions>,
    pub uptime: Arc<MockUptime>,
    pub activity: Arc<MockActivity>,
    pub wake: Arc<MockWake>,
    pub power: Arc<MockPower>,
}

impl MockHost {
    /// An idle box: no session, plenty of uptime, no snapshot yet.
    pub fn idle() -> Self {
        Self {
            sessions: Arc::new(MockSessions::new(false)),
            uptime: Arc::new(MockUptime::new(Some(1500))),
            activity: Arc::new(MockActivity::new(true, None)),
            wake: Arc::new(MockWake::new(true)),
            power: Arc::new(MockPower::new(true)),
        }
    }

    pub fn with_snapshot(self, snapshot: ActivitySnapshot) -> Self {
        *lock(&self.activity.snapshot) = Some(snapshot);
        self
    }

    pub fn parts(&self) -> AgentParts {
        AgentParts {
            sessions: self.sessions.clone(),
            uptime: self.uptime.clone(),
            activity: self.activity.clone(),
            wake: self.wake.clone(),
            power: self.power.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Output(CommandOutput),
    SpawnFailure,
    Timeout,
}

impl ScriptedReply {
    pub fn ok(stdout: &str) -> Self {
        Self::Output(CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn failed(status: i32, stderr: &str) -> Self {
        Self::Output(CommandOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}

/// Replays canned replies in order and records every invocation. Once the
/// script runs dry every further call fails to spawn.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, HostError> {
        lock(&self.calls).push(invocation.clone());
        let reply = lock(&self.replies).pop_front().unwrap_or(ScriptedReply::SpawnFailure);
        match reply {
            ScriptedReply::Output(output) => Ok(output),
            ScriptedReply::SpawnFailure => Err(HostError::Spawn {
                command: invocation.display(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            ScriptedReply::Timeout => Err(HostError::TimedOut {
                command: invocation.display(),
                timeout: Duration::from_secs(10),
            }),
        }
    }
}
