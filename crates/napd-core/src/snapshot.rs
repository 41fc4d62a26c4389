use serde::{Deserialize, Serialize};

/// Point-in-time activity reported by `/api/status/activity`.
///
/// All three fields are required: a body missing any of them fails to
/// deserialize and the snapshot is treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub connection_count: u32,
    /// Unix seconds of the next scheduled recording or EPG grab. Recordings
    /// already running are reported here too, so it may lie in the past.
    pub next_activity: i64,
    /// Server clock, used for gap math instead of the local clock.
    pub current_time: i64,
}

impl ActivitySnapshot {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn gap_seconds(&self) -> i64 {
        self.next_activity - self.current_time
    }
}
