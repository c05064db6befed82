//! Integration tests for the append-line and append-bytes commands

use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn filetool(temp_dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo::cargo_bin_cmd!("filetool");
    cmd.arg("--lock-dir").arg(temp_dir.path().join("locks"));
    cmd.env_remove("FILETOOL_LOG");
    cmd
}

fn target(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("file.txt")
}

#[test]
fn test_append_line_basic() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-line", "hello", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 6 bytes to"));

    assert_eq!(fs::read(&path).unwrap(), b"hello\n");
}

#[test]
fn test_append_line_multiple_lines_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-line", "a", "b", "c", "--path"])
        .arg(&path)
        .assert()
        .success();

    assert_eq!(fs::read(&path).unwrap(), b"a\nb\nc\n");
}

#[test]
fn test_append_line_unique_skips_existing() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "unique\n").unwrap();

    filetool(&temp_dir)
        .args(["append-line", "unique", "--unique", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Already present in"));

    assert_eq!(fs::read(&path).unwrap(), b"unique\n");
}

#[test]
fn test_append_line_unique_ignores_whitespace() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "  hello  \n").unwrap();

    filetool(&temp_dir)
        .args([
            "append-line",
            "hello",
            "--unique",
            "--ignore-leading-whitespace",
            "--ignore-trailing-whitespace",
            "--path",
        ])
        .arg(&path)
        .assert()
        .success();

    assert_eq!(fs::read(&path).unwrap(), b"  hello  \n");
}

#[test]
fn test_append_line_comment_marker() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "abc # comment\n").unwrap();

    // "abc " (trailing space kept) does not equal "abc"
    filetool(&temp_dir)
        .args(["append-line", "abc", "--unique", "--comment-marker", "#", "--path"])
        .arg(&path)
        .assert()
        .success();
    assert_eq!(fs::read(&path).unwrap(), b"abc # comment\nabc\n");

    fs::write(&path, "abc # comment\n").unwrap();
    filetool(&temp_dir)
        .args([
            "append-line",
            "abc",
            "--unique",
            "--comment-marker",
            "#",
            "--ignore-trailing-whitespace",
            "--path",
        ])
        .arg(&path)
        .assert()
        .success();
    assert_eq!(fs::read(&path).unwrap(), b"abc # comment\n");
}

#[test]
fn test_empty_comment_marker_means_no_marker() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "a#b\n").unwrap();

    // With no marker, "a#b" is compared whole and is already present
    filetool(&temp_dir)
        .args(["append-line", "a#b", "--unique", "--comment-marker", "", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Already present in"));

    assert_eq!(fs::read(&path).unwrap(), b"a#b\n");
}

#[test]
fn test_append_line_crlf() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    for _ in 0..2 {
        filetool(&temp_dir)
            .args(["append-line", "x=1", "--unique", "--line-ending", "CRLF", "--path"])
            .arg(&path)
            .assert()
            .success();
    }

    assert_eq!(fs::read(&path).unwrap(), b"x=1\r\n");
}

#[test]
fn test_append_line_rejects_embedded_line_ending() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-line", "a\nb", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Line contains the line_ending delimiter"));

    assert!(!path.exists());
}

#[test]
fn test_append_line_rejects_empty_line() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    // the valid first line must not be written either
    filetool(&temp_dir)
        .args(["append-line", "ok", "", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: LINE must not be empty"));

    assert!(!path.exists());
}

#[test]
fn test_flag_dependencies_reported_as_flags() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    let cases: [(&[&str], &str); 4] = [
        (&["--unlink-first"], "--unlink-first requires --unique"),
        (
            &["--make-parents", "--do-not-create"],
            "--make-parents requires file creation (do not use --do-not-create)",
        ),
        (
            &["--ignore-leading-whitespace"],
            "--ignore-leading-whitespace requires --unique",
        ),
        (&["--comment-marker", "#"], "--comment-marker requires --unique"),
    ];
    for (flags, message) in cases {
        filetool(&temp_dir)
            .args(["append-line", "x", "--path"])
            .arg(&path)
            .args(flags)
            .assert()
            .failure()
            .stderr(predicate::str::contains(message));
    }
    assert!(!path.exists());
}

#[test]
fn test_do_not_create_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-line", "x", "--do-not-create", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such file or directory"));

    assert!(!path.exists());
}

#[test]
fn test_make_parents() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a/b/c.txt");

    filetool(&temp_dir)
        .args(["append-line", "x", "--path"])
        .arg(&path)
        .assert()
        .failure();

    filetool(&temp_dir)
        .args(["append-line", "x", "--make-parents", "--path"])
        .arg(&path)
        .assert()
        .success();

    assert_eq!(fs::read(&path).unwrap(), b"x\n");
}

#[test]
fn test_unlink_first_replaces_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "old\n").unwrap();

    filetool(&temp_dir)
        .args(["append-line", "new", "--unique", "--unlink-first", "--path"])
        .arg(&path)
        .assert()
        .success();

    assert_eq!(fs::read(&path).unwrap(), b"new\n");
}

#[test]
fn test_dry_run_does_not_write() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-line", "hello", "--dry-run", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"[dry-run] Would write: b"hello\n" to"#));

    assert!(!path.exists());
}

#[test]
fn test_json_output() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "b\n").unwrap();

    let output = filetool(&temp_dir)
        .args(["append-line", "a", "b", "--unique", "--json", "--path"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["bytes_written"], 2);
    assert_eq!(reports[0]["skipped"], false);
    assert_eq!(reports[1]["bytes_written"], 0);
    assert_eq!(reports[1]["skipped"], true);
    assert_eq!(reports[1]["dry_run"], false);
    assert_eq!(reports[1]["path"], path.to_str().unwrap());
}

#[test]
fn test_append_bytes_hex_input() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-bytes", "--hex-input", "68690a00ff", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 5 bytes to"));

    assert_eq!(fs::read(&path).unwrap(), b"hi\n\x00\xff");
}

#[test]
fn test_append_bytes_invalid_hex() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);

    filetool(&temp_dir)
        .args(["append-bytes", "--hex-input", "zz", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid hex input 'zz'"));
}

#[test]
fn test_append_bytes_unique_is_substring_match() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    fs::write(&path, "prefix_TARGET_suffix").unwrap();

    filetool(&temp_dir)
        .args(["append-bytes", "TARGET", "--unique", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Already present in"));

    assert_eq!(fs::read(&path).unwrap(), b"prefix_TARGET_suffix");
}

#[test]
fn test_append_bytes_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    let source = temp_dir.path().join("source.bin");
    fs::write(&source, b"\x01\x02\x03").unwrap();

    filetool(&temp_dir)
        .args(["append-bytes", "--bytes-from-path"])
        .arg(&source)
        .arg("--path")
        .arg(&path)
        .assert()
        .success();

    assert_eq!(fs::read(&path).unwrap(), b"\x01\x02\x03");
}

#[test]
fn test_append_bytes_requires_input() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    let source = temp_dir.path().join("source.bin");
    fs::write(&source, b"x").unwrap();

    filetool(&temp_dir)
        .args(["append-bytes", "--path"])
        .arg(&path)
        .assert()
        .failure();

    filetool(&temp_dir)
        .args(["append-bytes", "abc", "--bytes-from-path"])
        .arg(&source)
        .arg("--path")
        .arg(&path)
        .assert()
        .failure();

    assert!(!path.exists());
}

#[test]
fn test_lock_dir_from_environment() {
    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    let lock_dir = temp_dir.path().join("env-locks");

    cargo::cargo_bin_cmd!("filetool")
        .env("FILETOOL_LOCK_DIR", &lock_dir)
        .args(["append-line", "x", "--path"])
        .arg(&path)
        .assert()
        .success();

    assert_eq!(fs::read_dir(&lock_dir).unwrap().count(), 1);
}

fn spawn_unique_writer(lock_dir: &Path, path: &Path, lines: &[String]) -> std::process::Child {
    Command::new(cargo::cargo_bin!("filetool"))
        .arg("--lock-dir")
        .arg(lock_dir)
        .arg("append-line")
        .args(lines)
        .arg("--unique")
        .arg("--path")
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap()
}

#[test]
fn test_concurrent_processes_write_each_line_once() {
    const PROCESSES: usize = 8;
    const LINES: usize = 20;

    let temp_dir = TempDir::new().unwrap();
    let path = target(&temp_dir);
    let lock_dir = temp_dir.path().join("locks");
    let lines: Vec<String> = (0..LINES).map(|i| format!("payload-{i}")).collect();

    let children: Vec<_> = (0..PROCESSES)
        .map(|p| {
            let mut order = lines.clone();
            order.rotate_left(p % LINES);
            spawn_unique_writer(&lock_dir, &path, &order)
        })
        .collect();
    for child in children {
        let output = child.wait_with_output().unwrap();
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let content = fs::read_to_string(&path).unwrap();
    for line in &lines {
        let copies = content.lines().filter(|l| l == line).count();
        assert_eq!(copies, 1, "{line} in {content:?}");
    }
    assert_eq!(content.lines().count(), LINES);
}
