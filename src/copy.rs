//! File copying utilities.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Make a file executable and owner-writable (chmod 755).
///
/// Homebrew installs dylibs read-only; install_name_tool needs write access.
pub fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    Ok(())
}

/// Copy the real file behind `src` to `dest`, never the symlink itself.
///
/// An existing `dest` is replaced. The copy is made executable and writable.
/// Returns the number of bytes copied.
pub fn copy_real_file(src: &Path, dest: &Path) -> Result<u64> {
    let real = fs::canonicalize(src)
        .with_context(|| format!("Failed to resolve library path: {}", src.display()))?;

    // A read-only copy from an earlier run would make fs::copy fail
    if dest.exists() || dest.is_symlink() {
        fs::remove_file(dest)
            .with_context(|| format!("Failed to replace existing file: {}", dest.display()))?;
    }

    let size = fs::copy(&real, dest).with_context(|| {
        format!("Failed to copy {} -> {}", real.display(), dest.display())
    })?;
    make_executable(dest)?;

    Ok(size)
}
