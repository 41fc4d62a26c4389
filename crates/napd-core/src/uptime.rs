use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait UptimeSource: Send + Sync {
    /// Whole seconds since boot, or `None` when the value cannot be read.
    async fn read(&self) -> Option<u64>;
}

/// Reads the first field of a `/proc/uptime`-style file.
#[derive(Debug, Clone)]
pub struct ProcUptime {
    path: PathBuf,
}

impl ProcUptime {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UptimeSource for ProcUptime {
    async fn read(&self) -> Option<u64> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "uptime read failed");
                return None;
            }
        };

        let parsed = parse_uptime(&raw);
        if parsed.is_none() {
            warn!(path = %self.path.display(), raw = %raw.trim(), "uptime is not numeric");
        }
        parsed
    }
}

/// `"12345.67 4567.89"` -> `Some(12345)`.
pub fn parse_uptime(raw: &str) -> Option<u64> {
    let field = raw.split_whitespace().next()?;
    let seconds: f64 = field.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(seconds.trunc() as u64)
}
