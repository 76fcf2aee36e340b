//! Homebrew prefix discovery.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Standard Homebrew roots, Apple Silicon first.
const KNOWN_PREFIXES: [&str; 2] = ["/opt/homebrew", "/usr/local"];

/// Find the Homebrew install root.
///
/// Checks the standard locations for a `bin/brew`, then asks `brew --prefix`.
pub fn detect_brew_prefix() -> Result<PathBuf> {
    if let Some(found) = find_known_prefix(Path::new("/")) {
        log::info!("Detected Homebrew prefix: {}", found.display());
        return Ok(found);
    }

    let output = Command::new("brew")
        .arg("--prefix")
        .output()
        .context("Homebrew not found: no brew in /opt/homebrew or /usr/local, and brew is not on PATH")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("brew --prefix failed: {}", stderr.trim());
    }

    let prefix = parse_brew_prefix(&String::from_utf8_lossy(&output.stdout))
        .context("brew --prefix printed nothing")?;
    log::info!("Detected Homebrew prefix: {}", prefix.display());
    Ok(prefix)
}

/// The first standard prefix under `root` that contains `bin/brew`.
fn find_known_prefix(root: &Path) -> Option<PathBuf> {
    KNOWN_PREFIXES
        .iter()
        .map(|p| root.join(p.trim_start_matches('/')))
        .find(|p| p.join("bin/brew").exists())
}

fn parse_brew_prefix(stdout: &str) -> Option<PathBuf> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(PathBuf::from(line))
}
