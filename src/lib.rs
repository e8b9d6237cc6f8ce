//! cpan-snapshot - reproducible lockfiles for Perl dependencies
//!
//! Resolves the direct requirements of a cpanfile against a MetaCPAN-style
//! index into their full transitive closure, downloads and checksums every
//! archive, and writes a lockfile a hermetic build can consume without
//! touching the network again.
//!
//! ## Pipeline
//!
//! 1. [`manifest`]: parse the cpanfile and load the core-module table
//! 2. [`resolver`]: breadth-first worklist over the dependency graph, one
//!    wave at a time, each package going through cache, index, download,
//!    checksum and [`archive`] inspection
//! 3. [`snapshot`]: prune core modules and write the lockfile
//!
//! ## Design Principles
//!
//! 1. **Integrity first**: an archive whose checksum does not match aborts
//!    the run and never enters the cache
//! 2. **Deterministic output**: same inputs and cache, byte-identical lockfile
//! 3. **Partial results**: packages that cannot be found are reported, not fatal

// Memory allocator optimization using mimalloc (faster than default allocator)
#[cfg(not(target_os = "windows"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod manifest;
pub mod package;
pub mod resolver;
pub mod snapshot;
pub mod utils;

use std::sync::Arc;
use tracing::info;

pub use cache::{ArchiveWriter, FsCache, MemoryCache, PackageCache};
pub use config::SnapshotConfig;
pub use error::{Result, SnapshotError};
pub use index::{HttpIndex, IndexRelease, PackageIndex};
pub use manifest::{CoreModuleTable, DependencyRequest, RequestedDependencies};
pub use package::PackageMeta;
pub use resolver::{PackageFetcher, ResolutionEngine, ResolutionState};
pub use snapshot::{LockedPackage, Snapshot};

/// One snapshot run: inputs loaded, components wired
pub struct Snapshotter {
    requested: RequestedDependencies,
    core: Arc<CoreModuleTable>,
    engine: ResolutionEngine,
}

impl Snapshotter {
    /// Wire up a run from explicit components
    pub fn new(
        requested: RequestedDependencies,
        core: CoreModuleTable,
        index: Arc<dyn PackageIndex>,
        cache: Arc<dyn PackageCache>,
        jobs: usize,
    ) -> Self {
        let core = Arc::new(core);
        let fetcher = PackageFetcher::new(index, cache, Arc::clone(&core));
        Self {
            requested,
            core,
            engine: ResolutionEngine::new(Arc::new(fetcher), jobs),
        }
    }

    /// Load inputs named by `config` and connect to the HTTP index.
    ///
    /// The perl version is fixed here, before any resolution starts.
    pub fn from_config(config: &SnapshotConfig) -> Result<Self> {
        config.validate()?;
        let core = CoreModuleTable::from_file(
            config.core_modules_path()?,
            config.perl_version.as_deref(),
        )?;
        let requested = RequestedDependencies::from_file(&config.cpanfile)?;
        let cache = FsCache::new(&config.cache_dir)?;
        let index = HttpIndex::new(&config.index_url, config.retry.clone())?;
        info!(
            "Using index {} with cache {}",
            config.index_url,
            config.cache_dir.display()
        );
        Ok(Self::new(
            requested,
            core,
            Arc::new(index),
            Arc::new(cache),
            config.jobs,
        ))
    }

    pub fn requested(&self) -> &RequestedDependencies {
        &self.requested
    }

    pub fn core(&self) -> &CoreModuleTable {
        &self.core
    }

    /// Resolve everything and assemble the lockfile
    pub async fn run(&self) -> Result<Snapshot> {
        let state = self.engine.run(self.requested.requests()).await?;
        Ok(Snapshot::assemble(&state, &self.requested, &self.core))
    }
}
