use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::host::{CommandRunner, Invocation};

#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn has_active_session(&self) -> bool;
}

/// Lists logged-in users with `who` (or a configured equivalent).
///
/// A listing that cannot be obtained counts as an attached session.
pub struct LoginSessions {
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
}

impl LoginSessions {
    pub fn new(runner: Arc<dyn CommandRunner>, command: Vec<String>) -> Self {
        Self { runner, command }
    }
}

#[async_trait]
impl SessionSource for LoginSessions {
    async fn has_active_session(&self) -> bool {
        let Some(invocation) = Invocation::from_argv(&self.command) else {
            warn!("session command is empty, assuming a session is attached");
            return true;
        };

        match self.runner.run(&invocation).await {
            Ok(output) if output.success() => {
                let sessions = output.stdout.lines().filter(|l| !l.trim().is_empty()).count();
                debug!(sessions, "session listing");
                sessions > 0
            }
            Ok(output) => {
                warn!(
                    command = %invocation.display(),
                    status = ?output.status,
                    stderr = %output.stderr.trim(),
                    "session listing failed, assuming a session is attached"
                );
                true
            }
            Err(err) => {
                warn!(error = %err, "session listing failed, assuming a session is attached");
                true
            }
        }
    }
}
