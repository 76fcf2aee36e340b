//! Mach-O binary inspection using otool.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Run `otool <flag> <binary>` and return stdout.
///
/// Returns `Ok(None)` if otool reports the file is not a Mach-O object.
fn run_otool(flag: &str, binary_path: &Path) -> Result<Option<String>> {
    // Check file exists first for a clear error message
    if !binary_path.exists() {
        bail!("File does not exist: {}", binary_path.display());
    }

    let output = Command::new("otool")
        .arg(flag)
        .arg(binary_path)
        .output()
        .context("otool command not found - install the Xcode command line tools")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    // cctools otool prints this on stdout, llvm-otool on stderr
    if is_not_object(&stdout) || is_not_object(&stderr) {
        return Ok(None);
    }

    if !output.status.success() {
        bail!(
            "otool {} failed on {}: {}",
            flag,
            binary_path.display(),
            stderr.trim()
        );
    }

    Ok(Some(stdout.into_owned()))
}

fn is_not_object(text: &str) -> bool {
    text.contains("is not an object file")
        || text.contains("not recognized as a valid object file")
        || text.contains("The file was not recognized")
}

/// Extract dependency references from a Mach-O binary using `otool -L`.
///
/// The binary's own install id (dylibs list it as their first entry) is
/// excluded, so only references to other libraries are returned.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist
/// - `otool` is not installed
/// - `otool` fails for reasons other than "not an object file"
///
/// Returns `Ok(Vec::new())` if the file is not a Mach-O binary.
#[must_use = "library dependencies should be processed"]
pub fn get_library_dependencies(binary_path: &Path) -> Result<Vec<String>> {
    let Some(listing) = run_otool("-L", binary_path)? else {
        return Ok(Vec::new());
    };
    let own_id = get_install_id(binary_path)?;
    Ok(parse_otool_libraries(&listing, own_id.as_deref()))
}

/// Read the `LC_RPATH` entries of a Mach-O binary using `otool -l`.
#[must_use = "rpath entries should be processed"]
pub fn get_rpaths(binary_path: &Path) -> Result<Vec<String>> {
    Ok(run_otool("-l", binary_path)?
        .map(|out| parse_otool_rpaths(&out))
        .unwrap_or_default())
}

/// Read the install id (`LC_ID_DYLIB`) of a dylib using `otool -D`.
///
/// Executables have no install id and return `Ok(None)`.
pub fn get_install_id(binary_path: &Path) -> Result<Option<String>> {
    Ok(run_otool("-D", binary_path)?.and_then(|out| parse_otool_install_id(&out)))
}

/// Parse `otool -L` output into dependency references.
///
/// Example otool output:
/// ```text
/// /opt/homebrew/lib/libfoo.dylib:
///         /opt/homebrew/opt/foo/lib/libfoo.1.dylib (compatibility version 2.0.0, current version 2.1.0)
///         @rpath/libbar.dylib (compatibility version 1.0.0, current version 1.0.0)
///         /usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)
/// ```
///
/// Universal binaries repeat the listing per architecture; duplicates are
/// dropped while keeping first-seen order.
pub fn parse_otool_libraries(output: &str, own_id: Option<&str>) -> Vec<String> {
    let mut libs: Vec<String> = Vec::new();

    for line in output.lines() {
        // Header lines ("file:" or "file (architecture arm64):") are not indented
        if !line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(end) = line.find(" (compatibility version") else {
            continue;
        };
        let lib = line[..end].trim();
        if lib.is_empty() || Some(lib) == own_id {
            continue;
        }
        if !libs.iter().any(|l| l == lib) {
            libs.push(lib.to_string());
        }
    }

    libs
}

/// Parse `otool -l` output into `LC_RPATH` paths.
///
/// Example otool output:
/// ```text
/// Load command 21
///           cmd LC_RPATH
///       cmdsize 32
///          path /opt/homebrew/lib (offset 12)
/// ```
pub fn parse_otool_rpaths(output: &str) -> Vec<String> {
    let mut rpaths: Vec<String> = Vec::new();
    let mut in_rpath = false;

    for line in output.lines() {
        let line = line.trim();
        if let Some(cmd) = line.strip_prefix("cmd ") {
            in_rpath = cmd.trim() == "LC_RPATH";
            continue;
        }
        if !in_rpath {
            continue;
        }
        if let Some(rest) = line.strip_prefix("path ") {
            let path = match rest.rfind(" (offset") {
                Some(end) => &rest[..end],
                None => rest,
            };
            let path = path.trim().to_string();
            // fat binaries list each slice's load commands
            if !rpaths.contains(&path) {
                rpaths.push(path);
            }
            in_rpath = false;
        }
    }

    rpaths
}

/// Parse `otool -D` output into the install id, if any.
pub fn parse_otool_install_id(output: &str) -> Option<String> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.ends_with(':'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_otool_libraries() {
        let output = "/opt/homebrew/lib/libfoo.dylib:
\t/opt/homebrew/opt/foo/lib/libfoo.1.dylib (compatibility version 2.0.0, current version 2.1.0)
\t@rpath/libbar.dylib (compatibility version 1.0.0, current version 1.0.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)
";
        let libs = parse_otool_libraries(output, Some("/opt/homebrew/opt/foo/lib/libfoo.1.dylib"));
        assert_eq!(libs, vec!["@rpath/libbar.dylib", "/usr/lib/libSystem.B.dylib"]);
    }

    #[test]
    fn test_parse_otool_libraries_universal() {
        let output = "app (architecture x86_64):
\t@rpath/libbar.dylib (compatibility version 1.0.0, current version 1.0.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)
app (architecture arm64):
\t@rpath/libbar.dylib (compatibility version 1.0.0, current version 1.0.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)
";
        let libs = parse_otool_libraries(output, None);
        assert_eq!(libs, vec!["@rpath/libbar.dylib", "/usr/lib/libSystem.B.dylib"]);
    }

    #[test]
    fn test_parse_otool_libraries_path_with_spaces() {
        let output = "app:
\t/Volumes/My Disk/lib/libq.dylib (compatibility version 1.0.0, current version 1.0.0)
";
        let libs = parse_otool_libraries(output, None);
        assert_eq!(libs, vec!["/Volumes/My Disk/lib/libq.dylib"]);
    }

    #[test]
    fn test_parse_otool_rpaths() {
        let output = r#"
Load command 12
          cmd LC_LOAD_DYLIB
      cmdsize 56
         name /usr/lib/libSystem.B.dylib (offset 24)
Load command 13
          cmd LC_RPATH
      cmdsize 32
         path /opt/homebrew/lib (offset 12)
Load command 14
          cmd LC_RPATH
      cmdsize 48
         path @executable_path/../Frameworks (offset 12)
"#;
        let rpaths = parse_otool_rpaths(output);
        assert_eq!(rpaths, vec!["/opt/homebrew/lib", "@executable_path/../Frameworks"]);
    }

    #[test]
    fn test_parse_otool_rpaths_none() {
        let output = "Load command 0\n      cmd LC_SEGMENT_64\n  segname __PAGEZERO\n";
        assert!(parse_otool_rpaths(output).is_empty());
    }

    #[test]
    fn test_parse_otool_install_id() {
        let output = "/opt/homebrew/lib/libfoo.dylib:\n/opt/homebrew/opt/foo/lib/libfoo.1.dylib\n";
        assert_eq!(
            parse_otool_install_id(output).as_deref(),
            Some("/opt/homebrew/opt/foo/lib/libfoo.1.dylib")
        );
        assert_eq!(parse_otool_install_id("/usr/bin/true:\n"), None);
    }
}
