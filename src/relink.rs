//! Load command rewriting using install_name_tool.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

fn run_install_name_tool(args: &[&str], binary_path: &Path, operation: &str) -> Result<()> {
    let output = Command::new("install_name_tool")
        .args(args)
        .arg(binary_path)
        .output()
        .context("install_name_tool command not found - install the Xcode command line tools")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "install_name_tool failed to {} in {}: {}",
            operation,
            binary_path.display(),
            stderr.trim()
        );
    }

    Ok(())
}

/// Rewrite one dependency reference (`install_name_tool -change`).
pub fn change_dependency(binary_path: &Path, old: &str, new: &str) -> Result<()> {
    run_install_name_tool(
        &["-change", old, new],
        binary_path,
        &format!("change {old} -> {new}"),
    )
}

/// Set the install id of a dylib (`install_name_tool -id`).
pub fn set_install_id(binary_path: &Path, id: &str) -> Result<()> {
    run_install_name_tool(&["-id", id], binary_path, &format!("set id {id}"))
}

/// Append an `LC_RPATH` entry (`install_name_tool -add_rpath`).
///
/// install_name_tool refuses duplicates, so callers should check first.
pub fn add_rpath(binary_path: &Path, rpath: &str) -> Result<()> {
    run_install_name_tool(&["-add_rpath", rpath], binary_path, &format!("add rpath {rpath}"))
}
