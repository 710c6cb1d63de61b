//! Integration tests for the `treeprof` binary: demo, report and diff.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn treeprof(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_treeprof"))
        .args(args)
        .env("TREEPROF_DIR", dir)
        .env("TREEPROF_COLOR", "0")
        .env_remove("TREEPROF_SIDECAR")
        .env_remove("TREEPROF_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_report(dir: &Path, label: &str, solve_mean: f64) {
    let csv = format!(
        "solve;1;{solve_mean:.8};90.00000000;{solve_mean:.8};1;{solve_mean:.8};{solve_mean:.8};0.00000000;1;1\n\
         kernel;2;0.10000000;10.00000000;0.05000000;2;0.10000000;0.10000000;0.00000000;2;2\n"
    );
    fs::write(dir.join(format!("{label}_time.csv")), csv).unwrap();
}

#[test]
fn demo_prints_report_and_writes_sidecar() {
    let tmp = tempfile::tempdir().unwrap();
    let out = treeprof(&["demo", "--ranks", "3", "--name", "cli"], tmp.path());
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));

    let text = stdout(&out);
    assert!(text.contains("PROFILER cli --> total time"), "{text}");
    assert!(text.lines().any(|l| l.starts_with("step ")), "{text}");
    assert!(text.lines().any(|l| l.starts_with("|   |-> kernel")), "{text}");
    assert!(text.lines().any(|l| l.starts_with("post ") && l.contains("never called")), "{text}");
    // One header for the whole group, not one per rank.
    assert_eq!(text.matches("PROFILER cli").count(), 1, "{text}");

    let sidecar = fs::read_to_string(tmp.path().join("cli_time.csv")).unwrap();
    let checkpoint = sidecar
        .lines()
        .find(|l| l.starts_with("checkpoint;"))
        .unwrap();
    // Ranks 0 and 2 ran it three times each, rank 1 never did.
    assert!(checkpoint.ends_with(";0;3"), "{checkpoint}");
}

#[test]
fn report_reads_latest_sidecar_from_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let out = treeprof(&["demo", "--ranks", "2", "--name", "latest"], tmp.path());
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));

    let out = treeprof(&["report"], tmp.path());
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("report: latest"), "{text}");
    assert!(text.lines().any(|l| l.starts_with("  assemble ")), "{text}");
    assert!(text.lines().any(|l| l.starts_with("    kernel ")), "{text}");
}

#[test]
fn report_json_is_machine_readable() {
    let tmp = tempfile::tempdir().unwrap();
    write_report(tmp.path(), "json", 0.9);
    let path = tmp.path().join("json_time.csv");

    let out = treeprof(&["report", path.to_str().unwrap(), "--json"], tmp.path());
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["label"], "json");
    assert_eq!(value["rows"][1]["name"], "kernel");
    assert_eq!(value["rows"][1]["level"], 2);
    assert_eq!(value["rows"][1]["max_count"], 2);
}

#[test]
fn diff_compares_two_reports() {
    let tmp = tempfile::tempdir().unwrap();
    write_report(tmp.path(), "before", 0.9);
    write_report(tmp.path(), "after", 0.6);

    let a = tmp.path().join("before_time.csv");
    let b = tmp.path().join("after_time.csv");
    let out = treeprof(
        &["diff", a.to_str().unwrap(), b.to_str().unwrap()],
        tmp.path(),
    );
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    let text = stdout(&out);
    let solve = text.lines().find(|l| l.starts_with("solve ")).unwrap();
    assert!(solve.contains("-0.3000s"), "{solve}");
    let kernel = text.lines().find(|l| l.starts_with("solve/kernel ")).unwrap();
    assert!(kernel.contains("+0.0000s"), "{kernel}");
}

#[test]
fn report_without_sidecars_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let out = treeprof(&["report"], tmp.path());
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error: no treeprof reports found"), "{}", stderr(&out));
}

#[test]
fn malformed_sidecar_names_the_line() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad_time.csv");
    fs::write(&path, "solve;1;oops\n").unwrap();
    let out = treeprof(&["report", path.to_str().unwrap()], tmp.path());
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("line 1"), "{err}");
}

#[test]
fn demo_rejects_an_empty_group() {
    let tmp = tempfile::tempdir().unwrap();
    let out = treeprof(&["demo", "--ranks", "0"], tmp.path());
    assert!(!out.status.success());
    assert!(stderr(&out).contains("at least one rank"), "{}", stderr(&out));
}
