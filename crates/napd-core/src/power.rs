use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::host::{CommandRunner, HostError, Invocation};

#[async_trait]
pub trait PowerController: Send + Sync {
    /// Issues the suspend. `true` means the command went out, not that the
    /// machine actually went down.
    async fn suspend(&self) -> bool;
}

pub struct HaltCommand {
    runner: Arc<dyn CommandRunner>,
    command: Vec<String>,
    use_sudo: bool,
}

impl HaltCommand {
    pub fn new(runner: Arc<dyn CommandRunner>, command: Vec<String>, use_sudo: bool) -> Self {
        Self {
            runner,
            command,
            use_sudo,
        }
    }
}

#[async_trait]
impl PowerController for HaltCommand {
    async fn suspend(&self) -> bool {
        let Some(invocation) = Invocation::from_argv(&self.command) else {
            warn!("suspend command is empty");
            return false;
        };
        let invocation = invocation.elevated(self.use_sudo);

        info!(command = %invocation.display(), "suspending");
        match self.runner.run(&invocation).await {
            Ok(output) => {
                if !output.success() {
                    warn!(status = ?output.status, stderr = %output.stderr.trim(), "suspend command exited unsuccessfully");
                }
                true
            }
            // Halting may take the command down with it before it reports back.
            Err(HostError::TimedOut { .. }) => true,
            Err(err) => {
                warn!(error = %err, "suspend command could not be issued");
                false
            }
        }
    }
}
