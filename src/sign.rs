//! Re-signing with codesign.
//!
//! install_name_tool invalidates existing signatures, and arm64 macOS refuses
//! to load unsigned code, so every rewritten file has to be signed again.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

use crate::bundle::AppBundle;
use crate::closure::BundledLibrary;

/// Identity for ad-hoc signing.
pub const AD_HOC: &str = "-";

fn codesign(path: &Path, identity: &str, deep: bool) -> Result<()> {
    let mut cmd = Command::new("codesign");
    cmd.args(["--force", "--sign", identity]);
    if deep {
        cmd.arg("--deep");
    }
    let output = cmd
        .arg(path)
        .output()
        .context("codesign command not found - install the Xcode command line tools")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("codesign failed on {}: {}", path.display(), stderr.trim());
    }
    Ok(())
}

/// Sign a single file with `identity`.
pub fn sign_path(path: &Path, identity: &str) -> Result<()> {
    codesign(path, identity, false)
}

/// Sign every bundled library, then the whole bundle.
///
/// A library that fails to sign is logged and skipped; the `--deep` bundle
/// pass signs it again. Failure to sign the bundle itself is an error.
pub fn sign_bundle(bundle: &AppBundle, libraries: &[BundledLibrary], identity: &str) -> Result<()> {
    log::info!("Code signing with identity: {}", identity);

    for lib in libraries {
        if let Err(e) = sign_path(&lib.destination, identity) {
            log::warn!("{:#}", e);
        }
    }

    codesign(bundle.path(), identity, true)?;
    log::info!("Signed {}", bundle.path().display());
    Ok(())
}
