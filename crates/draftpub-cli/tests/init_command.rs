use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn init_creates_workspace() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let target = temp.path().join("site");

    let mut cmd = cli();
    cmd.args(["init", target.to_str().unwrap()]);

    cmd.assert()
        .success()
        .stdout(contains("Initialized workspace at"));

    assert!(target.join(".draftpub").is_dir());
    assert!(target.join(".draftpub/schema.yaml").is_file());
    assert!(target.join(".draftpub/store.json").is_file());
    Ok(())
}

#[test]
fn init_dry_run_does_not_write() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let target = temp.path().join("site-dry-run");

    let mut cmd = cli();
    cmd.args(["init", target.to_str().unwrap(), "--dry-run"]);

    cmd.assert()
        .success()
        .stdout(contains("Dry run: would initialize workspace"));

    assert!(!target.join(".draftpub").exists());
    Ok(())
}

#[test]
fn init_twice_reports_existing_workspace() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let target = temp.path().join("site");

    cli().args(["init", target.to_str().unwrap()]).assert().success();
    cli()
        .args(["init", target.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Workspace already initialized"));
    Ok(())
}

#[test]
fn init_rejects_nested_workspace() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let parent = temp.path().join("parent");
    let child = parent.join("child");
    std::fs::create_dir_all(parent.join(".draftpub"))?;

    let mut cmd = cli();
    cmd.args(["init", child.to_str().unwrap()]);

    cmd.assert()
        .failure()
        .code(64)
        .stderr(contains("ancestor workspace"));
    Ok(())
}

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_draftpub"))
}
