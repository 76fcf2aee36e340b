//! `.app` bundle layout and Info.plist editing.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::copy::make_executable;

/// Info.plist key for the camera permission prompt text.
pub const CAMERA_USAGE_KEY: &str = "NSCameraUsageDescription";

/// Paths of a macOS application bundle.
///
/// ```text
/// Name.app/
/// └── Contents/
///     ├── Info.plist
///     ├── MacOS/<executable>
///     ├── Frameworks/          # bundled dylibs
///     └── Resources/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBundle {
    path: PathBuf,
    executable_name: String,
}

impl AppBundle {
    /// Describe the bundle at `path` whose main executable is `executable_name`.
    pub fn new(path: impl Into<PathBuf>, executable_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            executable_name: executable_name.into(),
        }
    }

    /// Describe the bundle at `path`, naming the executable after the bundle
    /// (`Cam.app` -> `Cam`).
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Cannot derive executable name from {}", path.display()))?
            .to_string();
        Ok(Self::new(path, name))
    }

    /// The `.app` directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the main executable in `Contents/MacOS`.
    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }

    /// Bundle name without the `.app` extension.
    pub fn display_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable_name.clone())
    }

    /// `Contents/`.
    pub fn contents(&self) -> PathBuf {
        self.path.join("Contents")
    }

    /// `Contents/MacOS`, home of the executable.
    pub fn macos_dir(&self) -> PathBuf {
        self.contents().join("MacOS")
    }

    /// `Contents/Frameworks`, where bundled libraries are copied.
    pub fn frameworks_dir(&self) -> PathBuf {
        self.contents().join("Frameworks")
    }

    /// `Contents/Resources`.
    pub fn resources_dir(&self) -> PathBuf {
        self.contents().join("Resources")
    }

    /// `Contents/Info.plist`. May not exist yet.
    pub fn info_plist(&self) -> PathBuf {
        self.contents().join("Info.plist")
    }

    /// `Contents/MacOS/<executable>`.
    pub fn executable(&self) -> PathBuf {
        self.macos_dir().join(&self.executable_name)
    }

    /// Create the bundle directories. Existing directories are kept.
    pub fn create_skeleton(&self) -> Result<()> {
        for dir in [self.macos_dir(), self.frameworks_dir(), self.resources_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Copy a compiled binary into `Contents/MacOS/<executable>`.
    pub fn install_executable(&self, binary: &Path) -> Result<PathBuf> {
        if !binary.is_file() {
            bail!("Executable does not exist: {}", binary.display());
        }
        let dest = self.executable();
        fs::copy(binary, &dest).with_context(|| {
            format!("Failed to copy {} -> {}", binary.display(), dest.display())
        })?;
        make_executable(&dest)?;
        log::info!("Installed {} -> {}", binary.display(), dest.display());
        Ok(dest)
    }

    /// Write a minimal Info.plist unless one exists.
    ///
    /// Returns `Ok(true)` if a new file was written.
    pub fn ensure_info_plist(&self, identifier: &str) -> Result<bool> {
        let plist = self.info_plist();
        if plist.exists() {
            return Ok(false);
        }
        let xml = default_info_plist(&self.executable_name, &self.display_name(), identifier);
        fs::write(&plist, xml)
            .with_context(|| format!("Failed to write Info.plist: {}", plist.display()))?;
        log::info!("Created {}", plist.display());
        Ok(true)
    }

    /// Add a usage-description string to Info.plist.
    ///
    /// Returns `Ok(false)` if the key was already present.
    pub fn add_usage_description(&self, key: &str, text: &str) -> Result<bool> {
        let plist = self.info_plist();
        let raw = fs::read(&plist)
            .with_context(|| format!("Failed to read Info.plist: {}", plist.display()))?;
        if raw.starts_with(b"bplist") {
            bail!(
                "{} is a binary plist; convert it with `plutil -convert xml1` first",
                plist.display()
            );
        }
        let xml = String::from_utf8(raw)
            .with_context(|| format!("Info.plist is not valid UTF-8: {}", plist.display()))?;

        let updated = insert_plist_string(&xml, key, text)
            .with_context(|| format!("Failed to edit {}", plist.display()))?;
        if updated == xml {
            log::info!("{} already set in {}", key, plist.display());
            return Ok(false);
        }
        fs::write(&plist, updated)
            .with_context(|| format!("Failed to write Info.plist: {}", plist.display()))?;
        log::info!("Added {} to {}", key, plist.display());
        Ok(true)
    }
}

fn default_info_plist(executable: &str, name: &str, identifier: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleDevelopmentRegion</key>
    <string>English</string>
    <key>CFBundleExecutable</key>
    <string>{executable}</string>
    <key>CFBundleIdentifier</key>
    <string>{identifier}</string>
    <key>CFBundleInfoDictionaryVersion</key>
    <string>6.0</string>
    <key>CFBundleName</key>
    <string>{name}</string>
    <key>CFBundlePackageType</key>
    <string>APPL</string>
    <key>NSHighResolutionCapable</key>
    <true/>
</dict>
</plist>
"#,
        executable = xml_escape(executable),
        identifier = xml_escape(identifier),
        name = xml_escape(name),
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Insert `<key>key</key><string>value</string>` into the top-level dict of
/// an XML property list.
///
/// If `key` is already present the document is returned unchanged.
pub fn insert_plist_string(xml: &str, key: &str, value: &str) -> Result<String> {
    let key_tag = format!("<key>{}</key>", xml_escape(key));
    if xml.contains(&key_tag) {
        return Ok(xml.to_string());
    }

    let Some(close) = xml.rfind("</dict>") else {
        bail!("property list has no top-level <dict>");
    };

    let entry = format!(
        "    {}\n    <string>{}</string>\n",
        key_tag,
        xml_escape(value)
    );
    // keep the closing tag on its own line
    let line_start = xml[..close].rfind('\n').map_or(0, |i| i + 1);
    let insert_at = if xml[line_start..close].trim().is_empty() {
        line_start
    } else {
        close
    };

    let mut out = String::with_capacity(xml.len() + entry.len());
    out.push_str(&xml[..insert_at]);
    out.push_str(&entry);
    out.push_str(&xml[insert_at..]);
    Ok(out)
}
