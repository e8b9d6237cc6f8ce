//! Resolve a cpanfile into a checksum-pinned lockfile
//!
//! Usage:
//!   cpan-snapshot --cpanfile cpanfile --core-modules core.json -o cpanfile.snapshot.json
//!
//! When launched through a build system's `run` wrapper, relative paths are
//! taken relative to `$BUILD_WORKING_DIRECTORY`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;

use cpan_snapshot::utils::{
    absolutize, env_path, init_logging_from_config, BUILD_WORKING_DIRECTORY_ENV, CORE_MODULES_ENV,
};
use cpan_snapshot::{SnapshotConfig, Snapshotter};

#[derive(Parser, Debug)]
#[command(name = "cpan-snapshot", version, about)]
struct Args {
    /// cpanfile to resolve
    #[arg(long, short = 'c')]
    cpanfile: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, short = 'l')]
    log_level: Option<String>,

    /// Download cache directory
    #[arg(long)]
    cache_directory: Option<PathBuf>,

    /// Number of packages resolved in parallel
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Base URL of the MetaCPAN API
    #[arg(long, short = 'u')]
    metacpan_url: Option<String>,

    /// Core-module table JSON (defaults to $CORE_MODULES)
    #[arg(long, short = 'm')]
    core_modules: Option<PathBuf>,

    /// Perl version to use for core modules, defaults to the latest
    #[arg(long, short = 'p')]
    perl_version: Option<String>,

    /// Output file (defaults to stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// TOML config file; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Merge flags over the config file (if any) and the defaults
    fn into_config(self, base: Option<&Path>, env_core: Option<PathBuf>) -> Result<SnapshotConfig> {
        let rebase = |path: PathBuf| match base {
            Some(base) => absolutize(&path, base),
            None => path,
        };

        let mut config = match self.config {
            Some(path) => SnapshotConfig::from_file(rebase(path))?,
            None => SnapshotConfig::default(),
        };

        if let Some(cpanfile) = self.cpanfile {
            config.cpanfile = cpanfile;
        }
        if let Some(level) = self.log_level {
            config.logging.filter = Some(log_filter(&level));
        }
        if let Some(dir) = self.cache_directory {
            config.cache_dir = dir;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(url) = self.metacpan_url {
            config.index_url = url;
        }
        if let Some(path) = self.core_modules {
            config.core_modules = Some(path);
        }
        if let Some(version) = self.perl_version {
            config.perl_version = Some(version);
        }
        if let Some(output) = self.output {
            config.output = Some(output);
        }

        config.cpanfile = rebase(config.cpanfile);
        config.cache_dir = rebase(config.cache_dir);
        config.output = config.output.map(rebase);
        config.core_modules = config.core_modules.map(rebase).or(env_core);

        config.validate()?;
        Ok(config)
    }
}

/// Map Python-style level names onto tracing filter directives
fn log_filter(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // $CORE_MODULES is relative to where we were started, not to the
    // build working directory.
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let env_core = env_path(CORE_MODULES_ENV).map(|path| absolutize(&path, &cwd));
    let base = env_path(BUILD_WORKING_DIRECTORY_ENV);

    let config = Args::parse()
        .into_config(base.as_deref(), env_core)
        .context("Invalid configuration")?;
    init_logging_from_config(&config.logging);

    let snapshotter = Snapshotter::from_config(&config).context("Failed to load inputs")?;
    info!(
        "Resolving {} requirements for perl {} ({} core modules)",
        snapshotter.requested().len(),
        snapshotter.core().perl_version(),
        snapshotter.core().len()
    );

    let snapshot = snapshotter.run().await.context("Snapshot failed")?;
    snapshot
        .write_to(config.output.as_deref())
        .context("Failed to write snapshot")?;
    Ok(())
}
