use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use napd_core::cycle::log_report;
use napd_core::{
    Agent, AgentConfig, CycleDriver, CycleOutcome, CycleReport, DecisionConfig, HostConfig,
    ServiceConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod logfile;
#[cfg(test)]
mod logfile_tests;

#[derive(Debug, Parser)]
#[command(name = "napd")]
#[command(about = "Suspends an idle Tvheadend box and wakes it up for the next recording")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long, default_value_t = 9981)]
    port: u16,

    #[arg(long, default_value = "autopoweroff")]
    user: String,

    #[arg(long, env = "NAPD_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[arg(long, default_value = "/api/status/activity")]
    activity_path: String,

    #[arg(long, default_value_t = 10)]
    http_timeout_secs: u64,

    #[arg(long, default_value_t = 1200)]
    min_uptime_secs: u64,

    #[arg(long, default_value_t = 600)]
    min_gap_secs: u64,

    #[arg(long, default_value_t = 120)]
    pre_schedule_secs: u64,

    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    #[arg(long, default_value_t = 45)]
    cycle_timeout_secs: u64,

    #[arg(long, default_value = "/proc/uptime")]
    uptime_path: PathBuf,

    #[arg(long, default_value = "/sys/class/rtc/rtc0/wakealarm")]
    wake_alarm_path: PathBuf,

    /// Write the wake alarm and run the suspend command without sudo.
    #[arg(long)]
    no_sudo: bool,

    #[arg(long, value_delimiter = ' ', default_value = "who")]
    session_command: Vec<String>,

    #[arg(long, value_delimiter = ' ', default_value = "halt")]
    suspend_command: Vec<String>,

    #[arg(long, default_value_t = 10)]
    command_timeout_secs: u64,

    /// Run every guard but never arm the alarm or suspend.
    #[arg(long)]
    dry_run: bool,

    /// Write daily log files here instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 30)]
    log_retention_days: u64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate once per interval until interrupted.
    Run,
    /// Evaluate a single cycle and print the report.
    Once {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
        /// Actually arm the alarm and suspend if every guard passes.
        #[arg(long)]
        commit: bool,
    },
    /// Print the raw result of every probe and the decision they lead to.
    Probe,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

impl Cli {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            decision: DecisionConfig {
                min_uptime: Duration::from_secs(self.min_uptime_secs),
                min_gap: Duration::from_secs(self.min_gap_secs),
                pre_schedule: Duration::from_secs(self.pre_schedule_secs),
                cycle_interval: Duration::from_secs(self.interval_secs),
            },
            service: ServiceConfig {
                host: self.host.clone(),
                port: self.port,
                username: self.user.clone(),
                password: self.password.clone(),
                activity_path: self.activity_path.clone(),
                timeout: Duration::from_secs(self.http_timeout_secs),
            },
            host: HostConfig {
                uptime_path: self.uptime_path.clone(),
                wake_alarm_path: self.wake_alarm_path.clone(),
                use_sudo: !self.no_sudo,
                session_command: self.session_command.clone(),
                suspend_command: self.suspend_command.clone(),
                command_timeout: Duration::from_secs(self.command_timeout_secs),
            },
            dry_run: self.dry_run,
            cycle_timeout: Duration::from_secs(self.cycle_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = cli.agent_config();

    match cli.command {
        Command::Run => {
            info!(
                host = %config.service.host,
                port = config.service.port,
                interval_secs = config.decision.cycle_interval.as_secs(),
                dry_run = config.dry_run,
                "napd started"
            );
            let agent = Arc::new(Agent::from_config(&config)?);
            let mut driver = CycleDriver::new(agent, config.decision.cycle_interval, config.cycle_timeout);
            driver.run(shutdown_signal()).await;
        }
        Command::Once { format, commit } => {
            config.dry_run = config.dry_run || !commit;
            let agent = Arc::new(Agent::from_config(&config)?);
            let mut driver = CycleDriver::new(agent, config.decision.cycle_interval, config.cycle_timeout);
            let report = driver.tick().await?;
            log_report(&report);
            print_report(&report, format)?;
        }
        Command::Probe => {
            let agent = Agent::from_config(&config)?;
            let parts = agent.parts();
            let out = serde_json::json!({
                "session_active": parts.sessions.has_active_session().await,
                "uptime_secs": parts.uptime.read().await,
                "service_reachable": parts.activity.is_service_reachable().await,
                "snapshot": parts.activity.fetch_snapshot().await,
                "decision": agent.decide().await,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    match &cli.log_dir {
        Some(dir) => {
            let log = logfile::DailyLog::open(dir, cli.log_retention_days)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(log)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => warn!("received ctrl-c"),
                    _ = term.recv() => warn!("received SIGTERM"),
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM, only ctrl-c stops napd");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        warn!("received ctrl-c");
    }
}

fn print_report(report: &CycleReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Human => {
            println!("=== napd cycle ===");
            println!("Time:       {}", report.ts.to_rfc3339());
            println!("Elapsed:    {} ms", report.elapsed_ms);
            match &report.outcome {
                CycleOutcome::Aborted(reason) => {
                    println!("Decision:   abort at {:?} guard", reason.guard());
                    println!("Reason:     {reason}");
                }
                CycleOutcome::DryRun { wake_at } => {
                    println!("Decision:   proceed (not committed)");
                    print_wake(*wake_at);
                }
                CycleOutcome::WakeAlarmFailed { wake_at } => {
                    println!("Decision:   proceed, but arming the wake alarm failed");
                    print_wake(*wake_at);
                }
                CycleOutcome::SuspendFailed { wake_at } => {
                    println!("Decision:   proceed, alarm armed, suspend failed");
                    print_wake(*wake_at);
                }
                CycleOutcome::Suspended { wake_at } => {
                    println!("Decision:   proceed, suspending");
                    print_wake(*wake_at);
                }
            }
        }
    }

    Ok(())
}

fn print_wake(wake_at: i64) {
    match chrono::DateTime::from_timestamp(wake_at, 0) {
        Some(ts) => println!("Wake at:    {wake_at} ({})", ts.with_timezone(&chrono::Local).to_rfc3339()),
        None => println!("Wake at:    {wake_at}"),
    }
}
