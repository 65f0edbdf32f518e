use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn ramadan_cmd() -> Command {
    Command::cargo_bin("ramadan").expect("binary ramadan is built")
}

fn read_json(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("valid json")
}

fn run_json(state_dir: &std::path::Path, now: &str, args: &[&str]) -> Value {
    let out = ramadan_cmd()
        .env_remove("RAMADAN_BACKEND_URL")
        .env_remove("RAMADAN_OFFLINE")
        .args(["--state-dir", state_dir.to_str().unwrap(), "--now", now, "--format", "json"])
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    read_json(&out)
}

#[test]
fn mark_show_flow_json() {
    let dir = tempfile::tempdir().unwrap();

    let v = run_json(dir.path(), "2027-02-08", &["mark", "fasting", "fajr"]);
    assert_eq!(v["day"]["phase"], "ramadan");
    assert_eq!(v["day"]["key"], "1");
    assert_eq!(v["day"]["date"], "2027-02-08");
    assert_eq!(v["progress"]["fasting"], true);
    assert_eq!(v["progress"]["fajr"], true);
    assert_eq!(v["progress"]["dua"], false);
    assert_eq!(v["xp"], 60);
    assert_eq!(v["xpDelta"], 60);
    assert_eq!(v["currentStreak"], 1);
    assert_eq!(v["longestStreak"], 1);
    assert_eq!(v["newlyUnlocked"], serde_json::json!(["first_fast"]));
    assert_eq!(v["sync"]["status"], "idle");
    assert_eq!(v["sync"]["pending"], 0);

    let v = run_json(dir.path(), "2027-02-09", &["show", "--ramadan-day", "1"]);
    assert_eq!(v["progress"]["fajr"], true);
    assert_eq!(v["progress"]["date"], "2027-02-08");

    // next day extends the streak
    let v = run_json(dir.path(), "2027-02-09", &["mark", "taraweeh", "quran_pages=4"]);
    assert_eq!(v["day"]["key"], "2");
    assert_eq!(v["progress"]["quranPages"], 4);
    assert_eq!(v["xp"], 90);
    assert_eq!(v["currentStreak"], 2);
    assert_eq!(v["newlyUnlocked"], serde_json::json!([]));
}

#[test]
fn unmarking_takes_xp_back() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), "2027-02-08", &["mark", "fasting"]);
    let v = run_json(dir.path(), "2027-02-08", &["mark", "fasting=false"]);
    assert_eq!(v["xp"], 0);
    assert_eq!(v["xpDelta"], -50);
    assert_eq!(v["progress"]["fasting"], false);
}

#[test]
fn unknown_field_exit_code_4() {
    let dir = tempfile::tempdir().unwrap();
    ramadan_cmd()
        .args(["--state-dir", dir.path().to_str().unwrap(), "--now", "2027-02-08"])
        .args(["mark", "sleeping"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Unknown progress field"));

    // nothing was written
    assert!(!dir.path().join("ramadan_user_state.json").exists());
}

#[test]
fn wrong_value_type_exit_code_4() {
    let dir = tempfile::tempdir().unwrap();
    ramadan_cmd()
        .args(["--state-dir", dir.path().to_str().unwrap(), "--now", "2027-02-08"])
        .args(["mark", "dua=maybe"])
        .assert()
        .failure()
        .code(4);

    ramadan_cmd()
        .args(["--state-dir", dir.path().to_str().unwrap(), "--now", "2027-02-08"])
        .args(["mark", "charity_amount"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn day_classification_json() {
    let dir = tempfile::tempdir().unwrap();

    let v = run_json(dir.path(), "2027-02-10T22:30:00+05:00", &["day"]);
    assert_eq!(v["phase"], "ramadan");
    assert_eq!(v["dayIndex"], 3);
    assert_eq!(v["date"], "2027-02-10");

    // 2027-02-10T20:00:00Z is already the 11th at UTC+5
    let v = run_json(dir.path(), "2027-02-10T20:00:00Z", &["day"]);
    assert_eq!(v["dayIndex"], 4);

    let v = run_json(dir.path(), "2027-02-08", &["day", "--date", "2027-02-01"]);
    assert_eq!(v["phase"], "preparation");
    assert_eq!(v["dayIndex"], 4);
    assert_eq!(v["daysUntilRamadan"], 7);

    let v = run_json(dir.path(), "2027-02-08", &["day", "--date", "2027-01-20"]);
    assert_eq!(v["phase"], "basic");

    let v = run_json(dir.path(), "2027-02-08", &["day", "--date", "2027-04-01"]);
    assert_eq!(v["phase"], "ramadan");
    assert_eq!(v["dayIndex"], 30);
}

#[test]
fn day_table_output() {
    ramadan_cmd()
        .args(["--now", "2027-01-31", "day"])
        .assert()
        .success()
        .stdout(predicate::str::contains("preparation day 3 of 10"));
}

#[test]
fn out_of_range_day_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    ramadan_cmd()
        .args(["--state-dir", dir.path().to_str().unwrap(), "--now", "2027-02-08"])
        .args(["mark", "fasting", "--ramadan-day", "31"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid ramadan day"));
}

#[test]
fn bad_now_is_usage_error() {
    ramadan_cmd()
        .args(["--now", "yesterday", "day"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid now"));
}

#[test]
fn basic_days_count_for_streak_only() {
    let dir = tempfile::tempdir().unwrap();
    let v = run_json(dir.path(), "2027-01-10", &["mark", "fajr", "isha"]);
    assert_eq!(v["day"]["phase"], "basic");
    assert_eq!(v["day"]["key"], "2027-01-10");
    assert_eq!(v["xp"], 0);
    assert_eq!(v["currentStreak"], 1);
}

#[test]
fn mark_table_output_reports_badge() {
    let dir = tempfile::tempdir().unwrap();
    ramadan_cmd()
        .args([
            "--state-dir",
            dir.path().to_str().unwrap(),
            "--now",
            "2027-02-08",
            "--no-color",
            "mark",
            "fasting",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ramadan day 1 (2027-02-08): fasting=true"))
        .stdout(predicate::str::contains("+50 XP"))
        .stdout(predicate::str::contains("New badge: First fast"));
}
