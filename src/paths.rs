//! Dependency reference classification and search-path resolution.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Placeholder resolved against the referencing binary's search-path list.
pub const RPATH_TOKEN: &str = "@rpath";
/// Placeholder for the directory containing the referencing binary.
pub const LOADER_PATH: &str = "@loader_path";
/// Placeholder for the directory containing the main executable.
pub const EXECUTABLE_PATH: &str = "@executable_path";

/// The form of a dependency reference recorded in a load command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyRef<'a> {
    /// `/opt/homebrew/opt/foo/lib/libfoo.dylib`
    Absolute(&'a Path),
    /// `@rpath/<rest>`
    Rpath(&'a str),
    /// `@loader_path/<rest>`
    LoaderPath(&'a str),
    /// `@executable_path/<rest>`
    ExecutablePath(&'a str),
    /// Bare names and anything else dyld searches in system locations.
    Other,
}

impl<'a> DependencyRef<'a> {
    pub fn parse(reference: &'a str) -> Self {
        if let Some(rest) = strip_token(reference, RPATH_TOKEN) {
            DependencyRef::Rpath(rest)
        } else if let Some(rest) = strip_token(reference, LOADER_PATH) {
            DependencyRef::LoaderPath(rest)
        } else if let Some(rest) = strip_token(reference, EXECUTABLE_PATH) {
            DependencyRef::ExecutablePath(rest)
        } else if reference.starts_with('/') {
            DependencyRef::Absolute(Path::new(reference))
        } else {
            DependencyRef::Other
        }
    }
}

fn strip_token<'a>(reference: &'a str, token: &str) -> Option<&'a str> {
    reference
        .strip_prefix(token)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

/// Substitute `@loader_path` / `@executable_path` in a search-path entry.
pub fn expand_placeholders(entry: &str, loader_dir: &Path, executable_dir: &Path) -> PathBuf {
    for (token, dir) in [(LOADER_PATH, loader_dir), (EXECUTABLE_PATH, executable_dir)] {
        if let Some(rest) = entry.strip_prefix(token) {
            if rest.is_empty() {
                return dir.to_path_buf();
            }
            if let Some(rest) = rest.strip_prefix('/') {
                return dir.join(rest);
            }
        }
    }
    PathBuf::from(entry)
}

/// Find `rest` (the part after `@rpath/`) in a search-path list.
///
/// Entries are tried in order and the first existing candidate wins.
/// Returns `None` if no entry contains the file.
#[must_use = "found library path should be used"]
pub fn find_in_rpaths(
    rest: &str,
    rpaths: &[String],
    loader_dir: &Path,
    executable_dir: &Path,
) -> Option<PathBuf> {
    rpaths
        .iter()
        .map(|entry| expand_placeholders(entry, loader_dir, executable_dir).join(rest))
        .find(|p| p.exists())
}

/// Everything needed to resolve references recorded in one binary.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Directory `@loader_path` stands for (the binary's original location).
    pub loader_dir: &'a Path,
    /// Directory `@executable_path` stands for.
    pub executable_dir: &'a Path,
    /// The binary's own `LC_RPATH` entries.
    pub rpaths: &'a [String],
    /// Last-resort directory for `@rpath` references, e.g. `<prefix>/lib`.
    pub fallback_lib_dir: Option<&'a Path>,
}

/// Resolve a dependency reference to the real path of the library it names.
///
/// Symlinks are followed. Returns `None` for references that do not name an
/// existing file, and for forms dyld resolves in system locations.
#[must_use = "resolved library path should be used"]
pub fn resolve_reference(reference: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    let candidate = match DependencyRef::parse(reference) {
        DependencyRef::Absolute(path) => path.to_path_buf(),
        DependencyRef::LoaderPath(rest) => ctx.loader_dir.join(rest),
        DependencyRef::ExecutablePath(rest) => ctx.executable_dir.join(rest),
        DependencyRef::Rpath(rest) => {
            match find_in_rpaths(rest, ctx.rpaths, ctx.loader_dir, ctx.executable_dir) {
                Some(found) => found,
                None => {
                    let fallback = ctx.fallback_lib_dir?.join(file_name_of(rest)?);
                    if fallback.exists() {
                        log::warn!(
                            "{} not found via rpath, using {}",
                            reference,
                            fallback.display()
                        );
                    }
                    fallback
                }
            }
        }
        DependencyRef::Other => return None,
    };

    fs::canonicalize(candidate).ok().filter(|p| p.is_file())
}

fn file_name_of(rest: &str) -> Option<&str> {
    Path::new(rest).file_name().and_then(|n| n.to_str())
}

/// Whether `path` lies under the external prefix (component-wise).
pub fn is_external(path: &Path, prefix: &Path) -> bool {
    path.starts_with(prefix)
}

/// The bundle-relative reference for a library copied as `file_name`.
pub fn rpath_reference(file_name: &str) -> String {
    format!("{RPATH_TOKEN}/{file_name}")
}

/// The search-path entry that lets an executable in `executable_dir` find
/// libraries in `dest_dir`, e.g. `@executable_path/../Frameworks`.
///
/// Both paths should be absolute and canonical.
pub fn relative_rpath(executable_dir: &Path, dest_dir: &Path) -> String {
    let from: Vec<Component<'_>> = executable_dir.components().collect();
    let to: Vec<Component<'_>> = dest_dir.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut rpath = String::from(EXECUTABLE_PATH);
    for _ in common..from.len() {
        rpath.push_str("/..");
    }
    for comp in &to[common..] {
        rpath.push('/');
        rpath.push_str(&comp.as_os_str().to_string_lossy());
    }
    rpath
}
