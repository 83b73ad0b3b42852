use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn status_lists_every_model() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    init(&temp)?;

    cli()
        .current_dir(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("page: 0 drafts, 0 published"))
        .stdout(contains("tag: 0 records (not publishable)"));
    Ok(())
}

#[test]
fn status_emits_json() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    init(&temp)?;

    let output = cli()
        .args(["--json", "status", "--workspace"])
        .arg(temp.path())
        .output()?;
    assert!(output.status.success());

    let payload: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(payload["type"], "status");
    let models = payload["models"].as_array().ok_or("models array")?;
    assert!(models.iter().any(|model| model["model"] == "page"));
    Ok(())
}

#[test]
fn missing_workspace_is_a_usage_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;

    cli()
        .current_dir(temp.path())
        .arg("status")
        .assert()
        .failure()
        .code(64)
        .stderr(contains(".draftpub"));
    Ok(())
}

#[test]
fn invalid_schema_is_a_config_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    init(&temp)?;
    fs::write(
        temp.path().join(".draftpub/schema.yaml"),
        "models:\n  page:\n    references:\n      parent: folder\n",
    )?;

    cli()
        .current_dir(temp.path())
        .arg("status")
        .assert()
        .failure()
        .code(78)
        .stderr(contains("folder"));
    Ok(())
}

fn init(temp: &TempDir) -> Result<(), Box<dyn std::error::Error>> {
    cli().arg("init").arg(temp.path()).assert().success();
    Ok(())
}

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_draftpub"))
}
