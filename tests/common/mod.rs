//! Text-file stand-in for otool/install_name_tool.
//!
//! A fake binary is a text file with one load command per line:
//!
//! ```text
//! id @rpath/libfoo.dylib
//! dep /ext/lib/libbar.dylib
//! rpath @loader_path
//! ```
//!
//! Because the load commands live in the file itself, copying a fake binary
//! carries them along just like copying a real dylib does.

#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use dylib_bundler::MachOTools;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeBinary {
    pub id: Option<String>,
    pub deps: Vec<String>,
    pub rpaths: Vec<String>,
}

impl FakeBinary {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("File does not exist: {}", path.display());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut bin = FakeBinary::default();
        for line in text.lines() {
            if let Some(v) = line.strip_prefix("id ") {
                bin.id = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("dep ") {
                bin.deps.push(v.to_string());
            } else if let Some(v) = line.strip_prefix("rpath ") {
                bin.rpaths.push(v.to_string());
            }
        }
        Ok(bin)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut text = String::new();
        if let Some(id) = &self.id {
            text.push_str(&format!("id {id}\n"));
        }
        for dep in &self.deps {
            text.push_str(&format!("dep {dep}\n"));
        }
        for rpath in &self.rpaths {
            text.push_str(&format!("rpath {rpath}\n"));
        }
        fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Records every mutation so tests can count them.
#[derive(Debug, Default)]
pub struct FakeTools {
    pub mutations: RefCell<Vec<String>>,
}

impl FakeTools {
    pub fn mutation_count(&self) -> usize {
        self.mutations.borrow().len()
    }

    pub fn mutations_of(&self, path: &Path) -> Vec<String> {
        let prefix = format!("{}: ", path.display());
        self.mutations
            .borrow()
            .iter()
            .filter(|m| m.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn record(&self, path: &Path, what: String) {
        self.mutations
            .borrow_mut()
            .push(format!("{}: {}", path.display(), what));
    }
}

impl MachOTools for FakeTools {
    fn dependencies(&self, path: &Path) -> Result<Vec<String>> {
        Ok(FakeBinary::read(path)?.deps)
    }

    fn rpaths(&self, path: &Path) -> Result<Vec<String>> {
        Ok(FakeBinary::read(path)?.rpaths)
    }

    fn install_id(&self, path: &Path) -> Result<Option<String>> {
        Ok(FakeBinary::read(path)?.id)
    }

    fn change_dependency(&self, path: &Path, old: &str, new: &str) -> Result<()> {
        let mut bin = FakeBinary::read(path)?;
        let Some(dep) = bin.deps.iter_mut().find(|d| d.as_str() == old) else {
            bail!("{} has no dependency {}", path.display(), old);
        };
        *dep = new.to_string();
        bin.write(path)?;
        self.record(path, format!("change {old} -> {new}"));
        Ok(())
    }

    fn set_install_id(&self, path: &Path, id: &str) -> Result<()> {
        let mut bin = FakeBinary::read(path)?;
        bin.id = Some(id.to_string());
        bin.write(path)?;
        self.record(path, format!("id {id}"));
        Ok(())
    }

    fn add_rpath(&self, path: &Path, rpath: &str) -> Result<()> {
        let mut bin = FakeBinary::read(path)?;
        if bin.rpaths.iter().any(|r| r == rpath) {
            bail!("{} would duplicate path: {}", path.display(), rpath);
        }
        bin.rpaths.push(rpath.to_string());
        bin.write(path)?;
        self.record(path, format!("rpath {rpath}"));
        Ok(())
    }
}

/// A temporary tree with an external prefix and an app bundle.
pub struct Fixture {
    _temp: TempDir,
    pub root: PathBuf,
    /// External prefix, `<root>/ext`.
    pub ext: PathBuf,
    pub app: PathBuf,
    pub frameworks: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let ext = root.join("ext");
        fs::create_dir_all(ext.join("lib")).unwrap();
        let macos = root.join("Cam.app/Contents/MacOS");
        fs::create_dir_all(&macos).unwrap();
        Fixture {
            _temp: temp,
            app: macos.join("cam"),
            frameworks: root.join("Cam.app/Contents/Frameworks"),
            root,
            ext,
        }
    }

    /// `<ext>/lib/<name>`
    pub fn ext_lib(&self, name: &str) -> PathBuf {
        self.ext.join("lib").join(name)
    }

    pub fn write(&self, path: &Path, id: Option<&str>, deps: &[&str], rpaths: &[&str]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        FakeBinary {
            id: id.map(str::to_string),
            deps: deps.iter().map(|s| s.to_string()).collect(),
            rpaths: rpaths.iter().map(|s| s.to_string()).collect(),
        }
        .write(path)
        .unwrap();
    }

    /// Write a dylib whose install id is its own path.
    pub fn write_lib(&self, path: &Path, deps: &[&str], rpaths: &[&str]) {
        let id = path.display().to_string();
        self.write(path, Some(&id), deps, rpaths);
    }

    pub fn write_app(&self, deps: &[&str], rpaths: &[&str]) {
        self.write(&self.app, None, deps, rpaths);
    }

    pub fn config(&self) -> dylib_bundler::ResolverConfig {
        dylib_bundler::ResolverConfig {
            root: self.app.clone(),
            prefix: self.ext.clone(),
            dest: self.frameworks.clone(),
            prefix_lib_fallback: false,
        }
    }

    pub fn read(&self, path: &Path) -> FakeBinary {
        FakeBinary::read(path).unwrap()
    }

    /// Sorted file names in the Frameworks directory.
    pub fn bundled_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.frameworks)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn path_str(path: &Path) -> String {
    path.display().to_string()
}
