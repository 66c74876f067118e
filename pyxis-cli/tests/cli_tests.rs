//! Runs the `pyxis` binary against small projects

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn pyxis(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pyxis"))
        .args(args)
        .arg("--no-color")
        .current_dir(dir)
        .output()
        .expect("pyxis runs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_clean_project_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("ok.py"), "def f(x: int) -> int:\n    return x\n\nf(1)\n").unwrap();

    let output = pyxis(temp_dir.path(), &["ok.py"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "Success: no issues found in 1 source file\n");
    assert!(temp_dir.path().join(".pyxis_cache").join("ok.json").is_file());
}

#[test]
fn test_errors_exit_one() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("bad.py"), "x: int = \"no\"\n").unwrap();

    let output = pyxis(temp_dir.path(), &["bad.py", "--show-column-numbers", "--no-incremental"]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(
        text.starts_with("bad.py:1:10: error: Incompatible types in assignment"),
        "{}",
        text
    );
    assert!(text.ends_with("Found 1 error in 1 file (checked 1 source file)\n"), "{}", text);
    assert!(!temp_dir.path().join(".pyxis_cache").exists());
}

#[test]
fn test_inline_program() {
    let temp_dir = TempDir::new().unwrap();
    let output = pyxis(temp_dir.path(), &["-c", "y = undefined_name\n", "--no-incremental"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).starts_with("__main__:1: error: Name \"undefined_name\" is not defined"));
}

#[test]
fn test_usage_errors_exit_two() {
    let temp_dir = TempDir::new().unwrap();
    assert_eq!(pyxis(temp_dir.path(), &[]).status.code(), Some(2));
    assert_eq!(pyxis(temp_dir.path(), &["--follow-imports", "never", "x.py"]).status.code(), Some(2));
    assert_eq!(pyxis(temp_dir.path(), &["-m", "no_such_module"]).status.code(), Some(2));

    std::fs::write(temp_dir.path().join("pyxis.toml"), "jobs = 0\n").unwrap();
    std::fs::write(temp_dir.path().join("ok.py"), "x = 1\n").unwrap();
    let output = pyxis(temp_dir.path(), &["ok.py"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("pyxis.toml"));
}
