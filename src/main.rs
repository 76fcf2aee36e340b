use anyhow::{Context, Result};
use clap::Parser;
use dylib_bundler::{
    bundle_dependencies, detect_brew_prefix, sign_bundle, verify_bundle, write_dot, AppBundle,
    ResolverConfig, SystemTools, AD_HOC, CAMERA_USAGE_KEY,
};
use std::path::PathBuf;

/// Bundle Homebrew dylibs into a macOS .app and relink them via @rpath
#[derive(Parser)]
#[command(name = "dylib-bundler", version, about, long_about = None)]
struct Cli {
    /// Path to the .app bundle (created if missing)
    #[arg(required = true)]
    app: PathBuf,

    /// Name of the executable in Contents/MacOS (default: bundle name)
    #[arg(short, long)]
    executable: Option<String>,

    /// Compiled binary to install as the bundle's executable
    #[arg(short, long)]
    binary: Option<PathBuf>,

    /// External library prefix (default: detected Homebrew prefix)
    #[arg(short, long)]
    prefix: Option<PathBuf>,

    /// Info.plist key for the usage description
    #[arg(long, default_value = CAMERA_USAGE_KEY)]
    usage_key: String,

    /// Usage description text shown in the permission prompt
    #[arg(
        long,
        default_value = "This app needs camera access to capture images."
    )]
    usage_description: String,

    /// Leave Info.plist untouched
    #[arg(long)]
    no_plist: bool,

    /// CFBundleIdentifier for a newly created Info.plist
    #[arg(long)]
    identifier: Option<String>,

    /// Look in <prefix>/lib for @rpath references the binary's rpaths miss
    #[arg(long)]
    prefix_lib_fallback: bool,

    /// Code signing identity ("-" for ad-hoc)
    #[arg(long, default_value = AD_HOC, conflicts_with = "no_sign")]
    sign: String,

    /// Skip code signing
    #[arg(long)]
    no_sign: bool,

    /// Write the dependency graph as Graphviz DOT
    #[arg(long, value_name = "FILE")]
    graph: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let bundle = match &cli.executable {
        Some(name) => AppBundle::new(&cli.app, name.clone()),
        None => AppBundle::from_path(&cli.app)?,
    };

    // nothing on disk is touched until the inputs check out
    match &cli.binary {
        Some(binary) if !binary.is_file() => {
            anyhow::bail!("Executable does not exist: {}", binary.display());
        }
        None if !bundle.executable().is_file() => {
            anyhow::bail!(
                "Executable not found: {} (pass --binary to install one)",
                bundle.executable().display()
            );
        }
        _ => {}
    }

    let prefix = match &cli.prefix {
        Some(p) => p.clone(),
        None => detect_brew_prefix()?,
    };
    if !prefix.is_dir() {
        anyhow::bail!("External library prefix does not exist: {}", prefix.display());
    }

    bundle.create_skeleton()?;
    if let Some(binary) = &cli.binary {
        bundle.install_executable(binary)?;
    }

    let config = ResolverConfig {
        root: bundle.executable(),
        prefix,
        dest: bundle.frameworks_dir(),
        prefix_lib_fallback: cli.prefix_lib_fallback,
    };

    if !cli.no_plist {
        let identifier = cli
            .identifier
            .clone()
            .unwrap_or_else(|| format!("com.example.{}", bundle.executable_name()));
        bundle.ensure_info_plist(&identifier)?;
        bundle.add_usage_description(&cli.usage_key, &cli.usage_description)?;
    }

    let report = bundle_dependencies(&config, &SystemTools)
        .with_context(|| format!("Failed to bundle dependencies of {}", config.root.display()))?;

    let missing = verify_bundle(&report);
    if missing.is_empty() {
        log::info!("Verified {} libraries in {}", report.bundled.len(), report.dest.display());
    } else {
        log::warn!("{} bundled libraries are missing", missing.len());
    }

    if let Some(graph) = &cli.graph {
        let title = bundle
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| bundle.executable_name().to_string());
        write_dot(&report, &title, graph)?;
        log::info!("Dependency graph written to {}", graph.display());
    }

    if !cli.no_sign {
        sign_bundle(&bundle, &report.bundled, &cli.sign)?;
    }

    println!(
        "{}: {} libraries bundled ({} copied), {} references rewritten, {} unresolved",
        bundle.path().display(),
        report.bundled.len(),
        report.copied_count(),
        report.rewrites,
        report.unresolved.len()
    );

    Ok(())
}
