use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli() -> Command {
    Command::cargo_bin("hashchain-cli").expect("binary built")
}

#[test]
fn mine_prints_and_saves_chain() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.json");
    cli()
        .args(["mine", "-d", "1", "--out"])
        .arg(&path)
        .args(["Alice pays Bob 5", "Bob pays Carol 3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Data          : Genesis Block"))
        .stdout(predicate::str::contains("Data          : Bob pays Carol 3"))
        .stdout(predicate::str::contains("Blockchain saved to"));

    let records: Vec<serde_json::Value> = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["data"], "Bob pays Carol 3");
    Ok(())
}

#[test]
fn verify_tamper_and_search_round() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.json");
    let tampered = dir.path().join("tampered.json");
    cli()
        .args(["mine", "-d", "1", "-o"])
        .arg(&path)
        .args(["Alice pays Bob 5", "Bob pays Carol 3"])
        .assert()
        .success();

    cli()
        .arg("verify")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Block 2] Valid."))
        .stdout(predicate::str::contains("Blockchain is valid."));

    cli()
        .arg("search")
        .arg(&path)
        .arg("CAROL")
        .assert()
        .success()
        .stdout(predicate::str::contains("Found in Block 2: Bob pays Carol 3"))
        .stdout(predicate::str::contains("Found in Block 1").not());

    cli()
        .arg("tamper")
        .arg(&path)
        .arg("1")
        .arg("--out")
        .arg(&tampered)
        .assert()
        .success();

    cli()
        .arg("verify")
        .arg(&tampered)
        .assert()
        .failure()
        .stdout(predicate::str::contains("[Block 1] Invalid hash!"))
        .stdout(predicate::str::contains("[Block 2] Valid."))
        .stdout(predicate::str::contains("Blockchain integrity is broken."));
    Ok(())
}

#[test]
fn tamper_genesis_is_rejected_and_file_untouched() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.json");
    cli().args(["mine", "-d", "0", "-o"]).arg(&path).arg("x").assert().success();
    let before = fs::read_to_string(&path)?;

    cli()
        .arg("tamper")
        .arg(&path)
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot tamper block 0"));
    assert_eq!(fs::read_to_string(&path)?, before);
    Ok(())
}

#[test]
fn mine_json_payloads() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.json");
    cli()
        .args(["mine", "-d", "0", "--json", "-o"])
        .arg(&path)
        .arg(r#"{"from":"alice","amount":5}"#)
        .assert()
        .success();
    let records: Vec<serde_json::Value> = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(records[1]["data"]["amount"], 5);

    cli()
        .args(["mine", "--json", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not valid JSON"));
    Ok(())
}

#[test]
fn shell_session_over_stdin() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("session.json");
    let script = format!(
        "1\nAlice pays Bob 5\n4\n6\n{}\nq\n",
        path.display()
    );
    cli()
        .args(["shell", "-d", "1"])
        .write_stdin(script)
        .assert()
        .success()
        .stdout(predicate::str::contains("New block successfully mined and added."))
        .stdout(predicate::str::contains("Blockchain is valid."))
        .stdout(predicate::str::contains("Blockchain saved as"));
    assert!(path.exists());
    Ok(())
}

#[test]
fn view_missing_file_fails() {
    cli()
        .args(["view", "/definitely/not/here.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading"));
}
