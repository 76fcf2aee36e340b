//! Command-line checks that need no Xcode tools: every one fails before
//! the bundle is touched.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(args: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dylib-bundler"))
        .args(args)
        .arg("--no-sign")
        .output()
        .expect("failed to run dylib-bundler")
}

#[test]
fn test_missing_executable_leaves_no_bundle() {
    let temp = TempDir::new().unwrap();
    let app = temp.path().join("Cam.app");

    let out = run(&[app.as_path(), Path::new("--prefix"), temp.path()]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Executable not found"), "stderr: {}", stderr);
    assert!(!app.exists(), "bundle created before failing");
}

#[test]
fn test_missing_binary_leaves_no_bundle() {
    let temp = TempDir::new().unwrap();
    let app = temp.path().join("Cam.app");
    let binary = temp.path().join("target/release/cam");

    let out = run(&[app.as_path(), Path::new("--binary"), binary.as_path(), Path::new("--prefix"), temp.path()]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {}", stderr);
    assert!(!app.exists(), "bundle created before failing");
}

#[test]
fn test_missing_prefix_leaves_no_bundle() {
    let temp = TempDir::new().unwrap();
    let app = temp.path().join("Cam.app");
    let binary = temp.path().join("cam");
    fs::write(&binary, "binary").unwrap();
    let prefix = temp.path().join("no-such-prefix");

    let out = run(&[app.as_path(), Path::new("--binary"), binary.as_path(), Path::new("--prefix"), prefix.as_path()]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no-such-prefix"), "stderr: {}", stderr);
    assert!(!app.exists(), "bundle created before failing");
}

#[test]
fn test_existing_bundle_is_left_untouched_on_missing_executable() {
    let temp = TempDir::new().unwrap();
    let app = temp.path().join("Cam.app");
    fs::create_dir_all(app.join("Contents")).unwrap();

    let out = run(&[app.as_path(), Path::new("--prefix"), temp.path()]);

    assert!(!out.status.success());
    assert!(!app.join("Contents/MacOS").exists());
    assert!(!app.join("Contents/Frameworks").exists());
    assert!(!app.join("Contents/Info.plist").exists());
}
