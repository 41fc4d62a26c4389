use crate::logfile::{log_file_name, prune_old_log_files, DailyLog};
use chrono::NaiveDate;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("napd-cli-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn log_file_is_named_after_the_day() {
    assert_eq!(log_file_name(day(2026, 10, 16)), "napd-2026-10-16.log");
}

#[test]
fn writes_append_to_the_current_day_and_rotate_at_midnight() {
    // Arrange
    let dir = make_temp_dir("rotate");
    let first = day(2026, 10, 16);
    let second = day(2026, 10, 17);
    let log = DailyLog::open_at(&dir, 30, first).expect("open log");

    // Act
    log.write_at(first, b"cycle 1\n").expect("write");
    log.write_at(first, b"cycle 2\n").expect("write");
    log.write_at(second, b"cycle 3\n").expect("write");

    // Assert
    let day_one = fs::read_to_string(dir.join("napd-2026-10-16.log")).expect("read day one");
    let day_two = fs::read_to_string(dir.join("napd-2026-10-17.log")).expect("read day two");
    assert_eq!(day_one, "cycle 1\ncycle 2\n");
    assert_eq!(day_two, "cycle 3\n");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn reopening_appends_instead_of_truncating() {
    let dir = make_temp_dir("append");
    let today = day(2026, 10, 16);

    DailyLog::open_at(&dir, 30, today)
        .expect("open log")
        .write_at(today, b"before restart\n")
        .expect("write");
    DailyLog::open_at(&dir, 30, today)
        .expect("reopen log")
        .write_at(today, b"after restart\n")
        .expect("write");

    let content = fs::read_to_string(dir.join("napd-2026-10-16.log")).expect("read");
    assert_eq!(content, "before restart\nafter restart\n");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn prune_removes_only_old_log_files() {
    // Arrange
    let dir = make_temp_dir("old-vs-fresh");
    let old_log = dir.join("napd-2026-08-01.log");
    let fresh_log = dir.join("napd-2026-10-10.log");
    let unrelated = dir.join("notes.txt");
    let foreign = dir.join("2026_08_01.log");
    fs::write(&old_log, "old").expect("write old log");
    fs::write(&fresh_log, "fresh").expect("write fresh log");
    fs::write(&unrelated, "keep").expect("write unrelated");
    fs::write(&foreign, "keep").expect("write foreign");

    // Act
    let removed = prune_old_log_files(&dir, 30, day(2026, 10, 16)).expect("prune");

    // Assert
    assert_eq!(removed, 1);
    assert!(!old_log.exists(), "old log should be pruned");
    assert!(fresh_log.exists(), "fresh log should be kept");
    assert!(unrelated.exists(), "non-log file should never be pruned");
    assert!(foreign.exists(), "files without our prefix should never be pruned");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn prune_keeps_boundary_age_log_file() {
    // Arrange
    let dir = make_temp_dir("boundary");
    let boundary_log = dir.join("napd-2026-09-16.log");
    fs::write(&boundary_log, "boundary").expect("write boundary log");

    // Act
    prune_old_log_files(&dir, 30, day(2026, 10, 16)).expect("prune");

    // Assert
    assert!(
        boundary_log.exists(),
        "log exactly on retention boundary should be kept"
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn rotation_prunes_expired_files() {
    let dir = make_temp_dir("rotate-prune");
    let stale = dir.join("napd-2026-09-10.log");
    fs::write(&stale, "stale").expect("write stale log");
    let log = DailyLog::open_at(&dir, 30, day(2026, 10, 9)).expect("open log");
    assert!(stale.exists(), "still within retention when opened");

    log.write_at(day(2026, 10, 11), b"next day\n").expect("write");

    assert!(!stale.exists(), "rotation should prune expired logs");

    let _ = fs::remove_dir_all(dir);
}
