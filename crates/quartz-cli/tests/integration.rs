//! Integration tests for quartz-cli.
//!
//! Tests invoke the `quartz` binary against the bundled demo and against
//! topology files written to a temporary directory.

use std::process::Command;

use tempfile::TempDir;

/// Helper to get the path to the `quartz` binary built by cargo.
fn quartz_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_quartz"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

// ---------------------------------------------------------------------------
// `quartz init` / `quartz check`
// ---------------------------------------------------------------------------

#[test]
fn cli_init_then_check() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.toml");

    let output = quartz_bin()
        .arg("init")
        .arg(&path)
        .output()
        .expect("failed to run quartz init");
    assert!(output.status.success(), "quartz init failed");
    assert!(path.exists());

    let output = quartz_bin()
        .arg("check")
        .arg(&path)
        .output()
        .expect("failed to run quartz check");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "quartz check failed: {stdout}");
    assert!(stdout.contains("ok"), "got: {stdout}");
    assert!(stdout.contains("210 slots x 100"), "got: {stdout}");
}

#[test]
fn cli_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.toml");
    std::fs::write(&path, "keep me").unwrap();

    let output = quartz_bin().arg("init").arg(&path).output().unwrap();
    assert!(!output.status.success());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");

    let output = quartz_bin()
        .args(["init", "--force"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn cli_check_reports_bad_files() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.toml");
    let bad = dir.path().join("bad.toml");
    quartz_bin().arg("init").arg(&good).output().unwrap();
    std::fs::write(
        &bad,
        r#"
name = "dangling"

[[nodes]]
index = 0
kind = "master"
frequency = 100

[[nodes]]
index = 1
kind = "leaf"
parent = 7
device = "counter"
"#,
    )
    .unwrap();

    let output = quartz_bin()
        .arg("check")
        .arg(&good)
        .arg(&bad)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("FAIL"), "got: {stdout}");
    assert!(stdout.contains("missing parent 7"), "got: {stdout}");
}

#[test]
fn cli_check_rejects_unknown_device() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dma.toml");
    std::fs::write(
        &path,
        "name = \"dma\"\n\
         [[nodes]]\nindex = 0\nkind = \"master\"\nfrequency = 10\n\
         [[nodes]]\nindex = 1\nkind = \"leaf\"\nparent = 0\ndevice = \"dma\"\n",
    )
    .unwrap();

    let output = quartz_bin().arg("check").arg(&path).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("unknown device 'dma'"), "got: {stdout}");
}

// ---------------------------------------------------------------------------
// `quartz inspect`
// ---------------------------------------------------------------------------

#[test]
fn cli_inspect_demo() {
    let output = quartz_bin()
        .args(["inspect", "--tape", "4"])
        .output()
        .expect("failed to run quartz inspect");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "quartz inspect failed");
    assert!(stdout.contains("Ticks per second: 21000"), "got: {stdout}");
    assert!(stdout.contains("Tape length:      210 slots"), "got: {stdout}");
    assert!(stdout.contains("cpu"), "got: {stdout}");
    assert!(stdout.contains("Tape (first 4 of 210 slots)"), "got: {stdout}");
}

// ---------------------------------------------------------------------------
// `quartz run`
// ---------------------------------------------------------------------------

#[test]
fn cli_run_unpaced_with_retune() {
    let output = quartz_bin()
        .args([
            "run",
            "--seconds",
            "2",
            "--unpaced",
            "--retune",
            "1=50",
            "--retune-at",
            "1",
        ])
        .output()
        .expect("failed to run quartz run");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "quartz run failed: {stdout}");
    assert!(stdout.contains("Retuned"), "got: {stdout}");
    assert!(stdout.contains("generation 2"), "got: {stdout}");
    assert!(stdout.contains("uart"), "got: {stdout}");
}

#[test]
fn cli_run_rejects_retune_of_leaf() {
    let output = quartz_bin()
        .args(["run", "--seconds", "1", "--unpaced", "--retune", "2=50"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a divider"), "got: {stderr}");
}
