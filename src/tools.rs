//! The inspect/rewrite primitives the resolver is built on.

use anyhow::Result;
use std::path::Path;

use crate::{analyze, relink};

/// Binary inspection and rewriting operations.
///
/// [`SystemTools`] shells out to `otool` and `install_name_tool`. Other
/// implementations let the resolver run without the Xcode toolchain.
pub trait MachOTools {
    /// Dependency references recorded in `path`, excluding its own id.
    fn dependencies(&self, path: &Path) -> Result<Vec<String>>;

    /// `LC_RPATH` entries of `path`, in load-command order.
    fn rpaths(&self, path: &Path) -> Result<Vec<String>>;

    /// The install id of `path`, `None` for executables.
    fn install_id(&self, path: &Path) -> Result<Option<String>>;

    /// Rewrite the dependency reference `old` in `path` to `new`.
    ///
    /// A reference that `path` does not contain is left alone.
    fn change_dependency(&self, path: &Path, old: &str, new: &str) -> Result<()>;

    /// Set the install id of the library at `path`.
    fn set_install_id(&self, path: &Path, id: &str) -> Result<()>;

    /// Append an `LC_RPATH` entry. Does not check for duplicates; see
    /// [`MachOTools::ensure_rpath`].
    fn add_rpath(&self, path: &Path, rpath: &str) -> Result<()>;

    /// Add `rpath` to `path` unless it is already present.
    ///
    /// Returns `Ok(true)` if the entry was added, `Ok(false)` if it existed.
    fn ensure_rpath(&self, path: &Path, rpath: &str) -> Result<bool> {
        if self.rpaths(path)?.iter().any(|r| r == rpath) {
            return Ok(false);
        }
        self.add_rpath(path, rpath)?;
        Ok(true)
    }
}

/// `otool` + `install_name_tool` from the host toolchain.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTools;

impl MachOTools for SystemTools {
    fn dependencies(&self, path: &Path) -> Result<Vec<String>> {
        analyze::get_library_dependencies(path)
    }

    fn rpaths(&self, path: &Path) -> Result<Vec<String>> {
        analyze::get_rpaths(path)
    }

    fn install_id(&self, path: &Path) -> Result<Option<String>> {
        analyze::get_install_id(path)
    }

    fn change_dependency(&self, path: &Path, old: &str, new: &str) -> Result<()> {
        relink::change_dependency(path, old, new)
    }

    fn set_install_id(&self, path: &Path, id: &str) -> Result<()> {
        relink::set_install_id(path, id)
    }

    fn add_rpath(&self, path: &Path, rpath: &str) -> Result<()> {
        relink::add_rpath(path, rpath)
    }
}
