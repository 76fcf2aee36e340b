//! Dependency closure resolution and relinking.
//!
//! Starting from the main executable, every library that resolves to a path
//! under the external prefix is copied once into the destination directory,
//! and every reference to it is rewritten to `@rpath/<name>`. The executable
//! gets an rpath pointing at the destination; each copy gets `@loader_path`
//! so copies can find each other.

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::copy::copy_real_file;
use crate::paths::{
    is_external, relative_rpath, resolve_reference, rpath_reference, DependencyRef,
    ResolveContext, LOADER_PATH,
};
use crate::tools::MachOTools;

/// Inputs of one resolver run.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Main executable; mutated in place.
    pub root: PathBuf,
    /// Only libraries resolving under this directory are bundled.
    pub prefix: PathBuf,
    /// Where copies go. Created if absent.
    pub dest: PathBuf,
    /// Look in `<prefix>/lib` for `@rpath` references the binary's own
    /// rpaths cannot satisfy.
    pub prefix_lib_fallback: bool,
}

/// A library placed in the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledLibrary {
    /// Real path the library was resolved to.
    pub source: PathBuf,
    pub destination: PathBuf,
    /// `false` if the destination already held this library from an earlier run.
    pub copied: bool,
}

/// One dependency reference seen while walking the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Original location of the referencing binary.
    pub from: PathBuf,
    pub reference: String,
    pub resolved: Option<PathBuf>,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub artifact: PathBuf,
    pub reference: String,
}

/// What a resolver run did.
#[derive(Debug, Clone, Default)]
pub struct ClosureReport {
    pub root: PathBuf,
    pub dest: PathBuf,
    pub bundled: Vec<BundledLibrary>,
    /// Number of `install_name_tool -change` rewrites.
    pub rewrites: usize,
    pub rpaths_added: usize,
    pub unresolved: Vec<UnresolvedReference>,
    pub edges: Vec<DependencyEdge>,
    /// Libraries not copied because another library already took their file name.
    pub collisions: Vec<PathBuf>,
    /// Copies left in the destination by an earlier run that were scanned again.
    pub rescanned: Vec<PathBuf>,
}

impl ClosureReport {
    /// Number of libraries actually copied in this run.
    pub fn copied_count(&self) -> usize {
        self.bundled.iter().filter(|lib| lib.copied).count()
    }
}

struct Pending {
    /// File to scan and rewrite.
    path: PathBuf,
    /// Where it came from; `@loader_path` is resolved against this.
    source: PathBuf,
    /// A copy from an earlier run whose original location is unknown.
    leftover: bool,
}

struct Resolver<'a, T: MachOTools + ?Sized> {
    tools: &'a T,
    prefix: PathBuf,
    dest: PathBuf,
    executable_dir: PathBuf,
    fallback_lib_dir: Option<PathBuf>,
    queue: VecDeque<Pending>,
    processed: HashSet<PathBuf>,
    /// Destination files already queued for scanning.
    queued: HashSet<PathBuf>,
    /// File name -> (library that took it, first binary referencing it).
    claimed: HashMap<OsString, (PathBuf, PathBuf)>,
    report: ClosureReport,
}

/// Copy and relink the external dependency closure of `config.root`.
///
/// # Errors
///
/// Fails before touching anything if the root executable or the prefix is
/// missing, or the destination cannot be created. Any copy or rewrite failure
/// on an external library aborts the run. References that cannot be resolved
/// are logged and recorded in the report, not treated as errors.
pub fn bundle_dependencies<T: MachOTools + ?Sized>(
    config: &ResolverConfig,
    tools: &T,
) -> Result<ClosureReport> {
    if !config.root.is_file() {
        bail!("Root executable does not exist: {}", config.root.display());
    }
    if !config.prefix.is_dir() {
        bail!(
            "External library prefix does not exist: {}",
            config.prefix.display()
        );
    }
    fs::create_dir_all(&config.dest).with_context(|| {
        format!(
            "Failed to create destination directory: {}",
            config.dest.display()
        )
    })?;

    let root = canonical(&config.root)?;
    let prefix = canonical(&config.prefix)?;
    let dest = canonical(&config.dest)?;
    let executable_dir = root
        .parent()
        .context("Root executable has no parent directory")?
        .to_path_buf();

    let mut resolver = Resolver {
        tools,
        fallback_lib_dir: config.prefix_lib_fallback.then(|| prefix.join("lib")),
        prefix,
        dest: dest.clone(),
        executable_dir,
        queue: VecDeque::new(),
        processed: HashSet::new(),
        queued: HashSet::new(),
        claimed: HashMap::new(),
        report: ClosureReport {
            root: root.clone(),
            dest,
            ..ClosureReport::default()
        },
    };
    resolver.run(root)?;
    Ok(resolver.report)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

impl<T: MachOTools + ?Sized> Resolver<'_, T> {
    fn run(&mut self, root: PathBuf) -> Result<()> {
        // Added up front so an interrupted run still leaves a loadable executable
        let root_rpath = relative_rpath(&self.executable_dir, &self.dest);
        if self.tools.ensure_rpath(&root, &root_rpath)? {
            log::info!("Added rpath {} to {}", root_rpath, root.display());
            self.report.rpaths_added += 1;
        }

        self.queued.insert(root.clone());
        self.queue.push_back(Pending {
            path: root.clone(),
            source: root,
            leftover: false,
        });

        while let Some(artifact) = self.queue.pop_front() {
            self.scan(&artifact)?;
        }

        log::info!(
            "Bundled {} libraries ({} copied), {} references rewritten",
            self.report.bundled.len(),
            self.report.copied_count(),
            self.report.rewrites
        );
        Ok(())
    }

    fn scan(&mut self, artifact: &Pending) -> Result<()> {
        log::info!("Scanning {}", artifact.path.display());

        let deps = self.tools.dependencies(&artifact.path)?;
        if deps.is_empty() {
            return Ok(());
        }
        let rpaths = self.tools.rpaths(&artifact.path)?;
        let loader_dir = artifact
            .source
            .parent()
            .unwrap_or(&self.executable_dir)
            .to_path_buf();
        // a leftover copy no longer knows where its siblings were installed
        let fallback_lib_dir = if artifact.leftover {
            Some(self.prefix.join("lib"))
        } else {
            self.fallback_lib_dir.clone()
        };

        for reference in deps {
            let ctx = ResolveContext {
                loader_dir: &loader_dir,
                executable_dir: &self.executable_dir,
                rpaths: &rpaths,
                fallback_lib_dir: fallback_lib_dir.as_deref(),
            };
            let resolved = resolve_reference(&reference, &ctx);
            self.visit(artifact, reference, resolved)?;
        }

        Ok(())
    }

    fn visit(&mut self, artifact: &Pending, reference: String, resolved: Option<PathBuf>) -> Result<()> {
        let Some(resolved) = resolved else {
            match DependencyRef::parse(&reference) {
                DependencyRef::Absolute(p) if !is_external(p, &self.prefix) => {
                    log::debug!("  {} (system, not on disk)", reference);
                }
                DependencyRef::Other => log::debug!("  {} (system search path)", reference),
                _ => log::warn!(
                    "Could not resolve {} referenced by {}, skipping",
                    reference,
                    artifact.path.display()
                ),
            }
            self.report.edges.push(DependencyEdge {
                from: artifact.source.clone(),
                reference: reference.clone(),
                resolved: None,
                external: false,
            });
            self.report.unresolved.push(UnresolvedReference {
                artifact: artifact.path.clone(),
                reference,
            });
            return Ok(());
        };

        let external = is_external(&resolved, &self.prefix);
        self.report.edges.push(DependencyEdge {
            from: artifact.source.clone(),
            reference: reference.clone(),
            resolved: Some(resolved.clone()),
            external,
        });
        if resolved.starts_with(&self.dest) {
            return self.rescan_copy(resolved);
        }
        if !external {
            log::debug!("  {} -> {} (not external)", reference, resolved.display());
            return Ok(());
        }

        let file_name = resolved
            .file_name()
            .with_context(|| format!("Library path has no file name: {}", resolved.display()))?
            .to_os_string();
        let name = file_name
            .to_str()
            .with_context(|| format!("Library name is not valid UTF-8: {}", resolved.display()))?;
        let new_ref = rpath_reference(name);

        if reference != new_ref {
            log::info!("  {} -> {}", reference, new_ref);
            self.tools
                .change_dependency(&artifact.path, &reference, &new_ref)?;
            self.report.rewrites += 1;
        }

        if !self.processed.insert(resolved.clone()) {
            if self.report.collisions.contains(&resolved) {
                self.warn_collision(&artifact.path, &resolved, &file_name);
            }
            return Ok(());
        }

        if self.claimed.contains_key(&file_name) {
            self.warn_collision(&artifact.path, &resolved, &file_name);
            self.report.collisions.push(resolved);
            return Ok(());
        }
        self.claimed
            .insert(file_name.clone(), (resolved.clone(), artifact.path.clone()));

        let destination = self.dest.join(&file_name);
        let copied = self.bundle_library(&resolved, &destination, &new_ref)?;
        self.report.bundled.push(BundledLibrary {
            source: resolved.clone(),
            destination: destination.clone(),
            copied,
        });
        if self.queued.insert(destination.clone()) {
            self.queue.push_back(Pending {
                path: destination,
                source: resolved,
                leftover: false,
            });
        }

        Ok(())
    }

    /// A reference that already resolves into the destination: a copy made
    /// by an earlier, possibly interrupted, run. Its identity and rpath are
    /// repaired if needed and it is scanned once so its own references get
    /// bundled too.
    fn rescan_copy(&mut self, copy: PathBuf) -> Result<()> {
        if !self.queued.insert(copy.clone()) {
            return Ok(());
        }

        let name = copy
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Library name is not valid UTF-8: {}", copy.display()))?;
        let id = rpath_reference(name);
        if self.tools.install_id(&copy)?.as_deref() != Some(id.as_str()) {
            log::info!("Repairing id of {}", copy.display());
            self.tools.set_install_id(&copy, &id)?;
        }
        if self.tools.ensure_rpath(&copy, LOADER_PATH)? {
            self.report.rpaths_added += 1;
        }

        log::debug!("Rescanning earlier copy {}", copy.display());
        self.report.rescanned.push(copy.clone());
        self.queue.push_back(Pending {
            path: copy.clone(),
            source: copy,
            leftover: true,
        });
        Ok(())
    }

    fn warn_collision(&self, referrer: &Path, library: &Path, file_name: &OsString) {
        let Some((owner, owner_referrer)) = self.claimed.get(file_name) else {
            return;
        };
        log::warn!(
            "{} references {}, which has the same file name as {} (referenced by {}); \
             it will load {} instead",
            referrer.display(),
            library.display(),
            owner.display(),
            owner_referrer.display(),
            owner.display()
        );
    }

    /// Copy one library and give it its bundle identity.
    ///
    /// Returns `Ok(false)` if the destination already carries `new_id`.
    fn bundle_library(&mut self, source: &Path, destination: &Path, new_id: &str) -> Result<bool> {
        let already_bundled = destination.is_file()
            && self.tools.install_id(destination)?.as_deref() == Some(new_id);

        if already_bundled {
            log::debug!("Already bundled: {}", destination.display());
        } else {
            log::info!("Copying {} -> {}", source.display(), destination.display());
            copy_real_file(source, destination)?;
            self.tools.set_install_id(destination, new_id)?;
        }

        if self.tools.ensure_rpath(destination, LOADER_PATH)? {
            self.report.rpaths_added += 1;
        }

        Ok(!already_bundled)
    }
}

/// Check that every bundled library is present in the destination.
///
/// Returns the missing destination paths. Nothing is repaired.
pub fn verify_bundle(report: &ClosureReport) -> Vec<PathBuf> {
    let missing: Vec<PathBuf> = report
        .bundled
        .iter()
        .filter(|lib| !lib.destination.is_file())
        .map(|lib| lib.destination.clone())
        .collect();

    for path in &missing {
        log::warn!("Bundled library missing from destination: {}", path.display());
    }

    missing
}
