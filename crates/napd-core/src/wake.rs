use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::host::{CommandRunner, Invocation};

#[async_trait]
pub trait WakeProgrammer: Send + Sync {
    /// Clears the alarm, then arms it for `wake_at` (Unix seconds).
    async fn program(&self, wake_at: i64) -> bool;
}

/// Writes the RTC `wakealarm` sysfs node through `tee`, optionally under sudo.
pub struct RtcWakeAlarm {
    runner: Arc<dyn CommandRunner>,
    path: PathBuf,
    use_sudo: bool,
}

impl RtcWakeAlarm {
    pub fn new(runner: Arc<dyn CommandRunner>, path: impl Into<PathBuf>, use_sudo: bool) -> Self {
        Self {
            runner,
            path: path.into(),
            use_sudo,
        }
    }

    /// Writes `value` and returns what `tee` echoed back, if it parses.
    async fn write(&self, value: i64) -> Option<i64> {
        let invocation = Invocation::new("tee")
            .arg(self.path.display().to_string())
            .stdin(value.to_string())
            .elevated(self.use_sudo);

        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, value, "wake alarm write failed");
                return None;
            }
        };
        if !output.success() {
            warn!(
                value,
                status = ?output.status,
                stderr = %output.stderr.trim(),
                "wake alarm write failed"
            );
            return None;
        }

        let echoed = output.stdout.trim().parse::<i64>().ok();
        if echoed.is_none() {
            warn!(value, stdout = %output.stdout.trim(), "wake alarm write echoed a non-number");
        }
        echoed
    }
}

#[async_trait]
impl WakeProgrammer for RtcWakeAlarm {
    async fn program(&self, wake_at: i64) -> bool {
        // The kernel refuses to re-arm an alarm that is already set, so it
        // is cleared first. The echoed clear value must read back as 0.
        match self.write(0).await {
            Some(0) => debug!("wake alarm cleared"),
            Some(other) => {
                warn!(echoed = other, "wake alarm clear did not echo 0");
                return false;
            }
            None => return false,
        }

        match self.write(wake_at).await {
            Some(echoed) if echoed == wake_at => {
                debug!(wake_at, "wake alarm armed");
                true
            }
            Some(echoed) => {
                warn!(wake_at, echoed, "wake alarm echoed a different timestamp");
                false
            }
            None => false,
        }
    }
}
