use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn tally(dir: &Path, args: &[&str]) -> Command {
    let binary = assert_cmd::cargo::cargo_bin!("tally");
    let mut cmd = Command::new(binary);
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .args(["--database", "book.db"])
        .args(args);
    cmd
}

fn stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = tally(dir, args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    Ok(String::from_utf8(output)?.trim().to_string())
}

fn json(dir: &Path, args: &[&str]) -> Result<Value> {
    let mut full = args.to_vec();
    full.push("--json");
    Ok(serde_json::from_str(&stdout(dir, &full)?)?)
}

/// Initialized book with one USD account; returns the account id.
fn book_with_account(dir: &Path) -> Result<String> {
    stdout(dir, &["init"])?;
    stdout(dir, &["commodity", "add", "USD", "--fraction", "100"])?;
    stdout(dir, &["account", "add", "Checking", "--commodity", "USD"])
}

#[test]
fn posting_after_rebuild_keeps_balances_current() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    let account = book_with_account(dir)?;

    for (date, amount, state) in [
        ("2024-01-01T00:00:00Z", "100.00", "y"),
        ("2024-01-01T00:00:01Z", "-20.25", "c"),
        ("2024-01-01T00:00:02Z", "5", "n"),
        ("2024-01-01T00:00:03Z", "7.50", "n"),
        ("2024-01-02T00:00:00Z", "1.25", "c"),
    ] {
        let split = format!("{account}:{amount}:{state}");
        stdout(dir, &["post", "--date", date, "--split", &split])?;
    }
    let rebuilt = stdout(dir, &["rebuild", "--account", &account])?;
    assert!(
        rebuilt.ends_with("\t2"),
        "unexpected rebuild output: {rebuilt}"
    );

    let split = format!("{account}:10:c");
    stdout(
        dir,
        &["post", "--date", "2024-01-01T00:00:02Z", "--split", &split],
    )?;

    let balance = json(
        dir,
        &["balance", "--account", &account, "--as-of", "2024-02-01"],
    )?;
    let row = &balance[0];
    assert_eq!(row["balance"], "103.5");
    assert_eq!(row["cleared"], "91");
    assert_eq!(row["reconciled"], "100");

    let earlier = json(
        dir,
        &[
            "balance",
            "--account",
            &account,
            "--as-of",
            "2024-01-01T00:00:01Z",
        ],
    )?;
    assert_eq!(earlier[0]["balance"], "100");

    let checkpoints = json(dir, &["checkpoints", "--account", &account])?;
    let checkpoints = checkpoints.as_array().context("checkpoint list")?;
    assert_eq!(checkpoints.len(), 2);
    Ok(())
}

#[test]
fn removing_transaction_refreshes_its_checkpoint() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    let account = book_with_account(dir)?;
    stdout(dir, &["rebuild", "--all"])?;

    let split = format!("{account}:42");
    let txn = stdout(dir, &["post", "--date", "2024-05-01", "--split", &split])?;
    let before = json(dir, &["balance", "--account", &account])?;
    assert_eq!(before[0]["balance"], "42");

    let removed = stdout(dir, &["remove", "--transaction", &txn])?;
    assert!(removed.contains("refreshed 1 checkpoints"));
    let after = json(dir, &["balance", "--account", &account])?;
    assert_eq!(after[0]["balance"], "0");
    Ok(())
}

#[test]
fn group_commands_skip_accounts_without_commodity() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    stdout(dir, &["init"])?;
    stdout(dir, &["commodity", "add", "USD"])?;
    let assets = stdout(dir, &["account", "add", "Assets"])?;
    let cash = stdout(
        dir,
        &[
            "account",
            "add",
            "Cash",
            "--commodity",
            "USD",
            "--parent",
            &assets,
        ],
    )?;

    let output = stdout(dir, &["rebuild", "--all"])?;
    assert!(output.contains(&format!("{assets}\tskipped")));
    assert!(output.contains(&format!("{cash}\t1")));

    let balances = json(dir, &["balances", "--group", &assets])?;
    let rows = balances.as_array().context("balance rows")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["account"], cash.as_str());
    assert_eq!(rows[0]["balance"], "0");
    Ok(())
}

#[test]
fn rebuilding_account_without_commodity_fails() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    stdout(dir, &["init"])?;
    let placeholder = stdout(dir, &["account", "add", "Placeholder"])?;

    let output = tally(dir, &["rebuild", "--account", &placeholder])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8(output)?.contains("has no commodity"));
    Ok(())
}

#[test]
fn rebuild_requires_a_target() -> Result<()> {
    let temp = tempdir()?;
    tally(temp.path(), &["rebuild"]).assert().failure();
    Ok(())
}

#[test]
fn config_prints_layered_settings() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    fs::create_dir(dir.join("config"))?;
    fs::write(
        dir.join("config/default.toml"),
        "[checkpoints]\nmin_checkpoint_count = 4\nmin_gap_secs = 20\n",
    )?;
    fs::write(
        dir.join("config/staging.toml"),
        "[checkpoints]\nmin_gap_secs = 60\n",
    )?;

    let defaults: toml::Value = toml::from_str(&stdout(dir, &["config"])?)?;
    assert_eq!(
        defaults["checkpoints"]["min_checkpoint_count"].as_integer(),
        Some(4)
    );
    assert_eq!(
        defaults["checkpoints"]["min_gap_secs"].as_integer(),
        Some(20)
    );
    assert_eq!(defaults["database"]["path"].as_str(), Some("book.db"));
    assert!(!dir.join("book.db").exists());

    let staging: toml::Value = toml::from_str(&stdout(dir, &["--env", "staging", "config"])?)?;
    assert_eq!(
        staging["checkpoints"]["min_checkpoint_count"].as_integer(),
        Some(4)
    );
    assert_eq!(
        staging["checkpoints"]["min_gap_secs"].as_integer(),
        Some(60)
    );
    Ok(())
}

#[test]
fn balance_past_latest_date_matches_final_balance() -> Result<()> {
    let temp = tempdir()?;
    let dir = temp.path();
    let account = book_with_account(dir)?;
    for second in [0, 1, 2, 3, 4, 100, 101, 102, 103] {
        let date = format!("2024-01-01T00:{:02}:{:02}Z", second / 60, second % 60);
        let split = format!("{account}:1:c");
        stdout(dir, &["post", "--date", &date, "--split", &split])?;
    }
    stdout(dir, &["rebuild", "--account", &account])?;

    for as_of in ["9999-12-31T23:59:59Z", "9999-12-31T23:59:59.500Z"] {
        let balance = json(dir, &["balance", "--account", &account, "--as-of", as_of])?;
        assert_eq!(balance[0]["balance"], "9", "as of {as_of}");
        assert_eq!(balance[0]["cleared"], "9", "as of {as_of}");
    }

    let split = format!("{account}:5");
    tally(dir, &["post", "--date", "1650-06-01", "--split", &split])
        .assert()
        .failure();
    let balance = json(dir, &["balance", "--account", &account])?;
    assert_eq!(balance[0]["balance"], "9");
    Ok(())
}
