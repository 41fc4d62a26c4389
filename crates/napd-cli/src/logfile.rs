use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use tracing_subscriber::fmt::MakeWriter;

const PREFIX: &str = "napd-";
const SUFFIX: &str = ".log";

/// Append-only log sink with one file per local calendar day.
pub struct DailyLog {
    state: Mutex<LogState>,
}

struct LogState {
    dir: PathBuf,
    retention_days: u64,
    current_day: NaiveDate,
    file: File,
}

impl DailyLog {
    pub fn open(dir: impl Into<PathBuf>, retention_days: u64) -> Result<Self> {
        Self::open_at(dir, retention_days, Local::now().date_naive())
    }

    pub(crate) fn open_at(dir: impl Into<PathBuf>, retention_days: u64, today: NaiveDate) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let file = open_file(&dir, today)?;
        prune_old_log_files(&dir, retention_days, today)?;

        Ok(Self {
            state: Mutex::new(LogState {
                dir,
                retention_days,
                current_day: today,
                file,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `buf` into the file for `day`, switching files if the day changed.
    pub(crate) fn write_at(&self, day: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        state.rotate_if_needed(day)?;
        state.file.write(buf)
    }
}

impl LogState {
    fn rotate_if_needed(&mut self, day: NaiveDate) -> io::Result<()> {
        if day == self.current_day {
            return Ok(());
        }
        self.file.flush()?;
        self.file = open_file(&self.dir, day)?;
        self.current_day = day;
        // A failed prune must not cost us the log line being written.
        let _ = prune_old_log_files(&self.dir, self.retention_days, day);
        Ok(())
    }
}

pub(crate) fn log_file_name(day: NaiveDate) -> String {
    format!("{PREFIX}{}{SUFFIX}", day.format("%Y-%m-%d"))
}

fn open_file(dir: &Path, day: NaiveDate) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(log_file_name(day)))
}

pub struct DailyLogWriter<'a> {
    log: &'a DailyLog,
}

impl Write for DailyLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.write_at(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.log.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for DailyLog {
    type Writer = DailyLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        DailyLogWriter { log: self }
    }
}

/// Deletes `napd-YYYY-MM-DD.log` files dated before `today - retention_days`.
pub(crate) fn prune_old_log_files(dir: &Path, retention_days: u64, today: NaiveDate) -> io::Result<usize> {
    let cutoff = today
        .checked_sub_days(Days::new(retention_days))
        .unwrap_or(today);

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        let Some(date_part) = file_name
            .strip_prefix(PREFIX)
            .and_then(|v| v.strip_suffix(SUFFIX))
        else {
            continue;
        };
        let Ok(file_date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}
