/// Run the `tea` binary on script files and check what reaches stdout,
/// stderr and the exit status.
///
/// Every run passes `-f` so no per-user settings file can leak in.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Path to the `tea` binary built by this Cargo workspace.
fn tea_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tea"))
}

fn write_script(dir: &TempDir, name: &str, src: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(src.as_bytes()).unwrap();
    path
}

fn run_tea(args: &[&str], scripts: &[&Path]) -> Output {
    Command::new(tea_binary())
        .arg("-f")
        .args(args)
        .args(scripts)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("cannot run tea: {e}"))
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn flushes_go_to_stdout() {
    let dir = TempDir::new().unwrap();
    let s = write_script(&dir, "hello.tea", "write hello\nflush\nwrite world\nend\n");
    let o = run_tea(&[], &[&s]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "hello\nworld\n");
}

#[test]
fn arguments_and_sender() {
    let dir = TempDir::new().unwrap();
    let s = write_script(&dir, "greet.tea", "command greet\nrequired who\nprint $sender\nwrite  greets \nprint ?who\nend\n");
    let o = run_tea(&["-salice", "-a", "bob"], &[&s]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "alice greets bob\n");
}

#[test]
fn missing_argument_fails() {
    let dir = TempDir::new().unwrap();
    let s = write_script(&dir, "greet.tea", "command greet\nrequired who\nwrite hi\nend\n");
    let o = run_tea(&[], &[&s]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stdout(&o).is_empty());
    assert!(stderr(&o).contains("usage: !greet <who>"), "{}", stderr(&o));
}

#[test]
fn check_only_compiles_every_file() {
    let dir = TempDir::new().unwrap();
    let a = write_script(&dir, "a.tea", "write a\nend\n");
    let b = write_script(&dir, "b.tea", "script bee\nwrite b\nwrite c\nend\n");
    let o = run_tea(&["-k"], &[&a, &b]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "a: ok (2 statements)\nbee: ok (3 statements)\n");
}

#[test]
fn compile_errors_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let good = write_script(&dir, "good.tea", "write ran\nend\n");
    let bad = write_script(&dir, "bad.tea", "nosuch thing\nend\n");
    let o = run_tea(&[], &[&good, &bad]);
    assert_eq!(o.status.code(), Some(1));
    assert!(stdout(&o).is_empty());
    assert!(stderr(&o).contains("unknown instruction 'nosuch'"), "{}", stderr(&o));
}

#[test]
fn sleep_is_waited_out() {
    let dir = TempDir::new().unwrap();
    let s = write_script(&dir, "nap.tea", "write before\nflush\nsleep 1\nwrite after\nend\n");
    let o = run_tea(&[], &[&s]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert_eq!(stdout(&o), "before\nafter\n");
}

#[test]
fn hurl_goes_to_stderr() {
    let dir = TempDir::new().unwrap();
    let s = write_script(&dir, "hurl.tea", "set !ev.kind \"ping\nhurl !ev.*\nend\n");
    let o = run_tea(&[], &[&s]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stderr(&o).contains("hurl hurl: kind=ping"), "{}", stderr(&o));
}

#[test]
fn no_scripts_is_a_usage_error() {
    let o = run_tea(&[], &[]);
    assert_eq!(o.status.code(), Some(2));
    assert!(stderr(&o).contains("Usage: tea"));
}
