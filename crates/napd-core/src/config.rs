use std::path::PathBuf;
use std::time::Duration;

/// Thresholds that gate a suspend, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// The box must have been up strictly longer than this before it may suspend.
    pub min_uptime: Duration,
    /// Shortest gap to the next activity that is still worth suspending for.
    pub min_gap: Duration,
    /// How long before the next activity the wake alarm fires.
    pub pre_schedule: Duration,
    pub cycle_interval: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_uptime: Duration::from_secs(1200),
            min_gap: Duration::from_secs(600),
            pre_schedule: Duration::from_secs(120),
            cycle_interval: Duration::from_secs(60),
        }
    }
}

/// Where and how to reach the Tvheadend HTTP API.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub activity_path: String,
    pub timeout: Duration,
}

impl ServiceConfig {
    pub fn activity_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.activity_path)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9981,
            username: "autopoweroff".to_string(),
            password: String::new(),
            activity_path: "/api/status/activity".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Local surfaces the agent reads from and writes to.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub uptime_path: PathBuf,
    pub wake_alarm_path: PathBuf,
    /// Prefix privileged writes and the suspend command with `sudo`.
    pub use_sudo: bool,
    pub session_command: Vec<String>,
    pub suspend_command: Vec<String>,
    pub command_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            uptime_path: PathBuf::from("/proc/uptime"),
            wake_alarm_path: PathBuf::from("/sys/class/rtc/rtc0/wakealarm"),
            use_sudo: true,
            session_command: vec!["who".to_string()],
            suspend_command: vec!["halt".to_string()],
            command_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub decision: DecisionConfig,
    pub service: ServiceConfig,
    pub host: HostConfig,
    /// Evaluate every guard but never arm the alarm or halt.
    pub dry_run: bool,
    /// Upper bound on one cycle; a cycle that runs longer is abandoned.
    pub cycle_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            decision: DecisionConfig::default(),
            service: ServiceConfig::default(),
            host: HostConfig::default(),
            dry_run: false,
            cycle_timeout: Duration::from_secs(45),
        }
    }
}
