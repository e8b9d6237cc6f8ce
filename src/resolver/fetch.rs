//! Single-package pipeline: cache check, index lookup, download, checksum,
//! inspection.

use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::Resolution;
use crate::archive::inspect;
use crate::cache::{ArchiveWriter, CacheEntry, CoreRecord, PackageCache};
use crate::error::{Result, SnapshotError};
use crate::index::{IndexRelease, PackageIndex};
use crate::manifest::core_modules::RUNTIME_PACKAGE;
use crate::manifest::{CoreModuleTable, DependencyRequest};
use crate::package::PackageMeta;

/// Downloaded chunks allowed in flight between the network and the disk
const DOWNLOAD_QUEUE_DEPTH: usize = 16;

/// Resolves one [`DependencyRequest`] at a time. Cheap to share across tasks.
pub struct PackageFetcher {
    index: Arc<dyn PackageIndex>,
    cache: Arc<dyn PackageCache>,
    core: Arc<CoreModuleTable>,
}

impl PackageFetcher {
    pub fn new(
        index: Arc<dyn PackageIndex>,
        cache: Arc<dyn PackageCache>,
        core: Arc<CoreModuleTable>,
    ) -> Self {
        Self { index, cache, core }
    }

    /// Resolve `request` to a package record or a failure.
    ///
    /// A package missing from both the index and the core table is a
    /// `Resolution::Failed`, not an error. Errors are checksum mismatches,
    /// unreadable archives and I/O or transport failures.
    pub async fn resolve(&self, request: &DependencyRequest) -> Result<Resolution> {
        if request.name == RUNTIME_PACKAGE {
            return Ok(Resolution::Resolved(PackageMeta::core(
                RUNTIME_PACKAGE,
                self.core.perl_version(),
            )));
        }

        if let Some(entry) = self.cached(&request.name).await? {
            if let Some(meta) = self.from_cache(&request.name, entry).await? {
                debug!("Cache hit for {}", request.name);
                return Ok(Resolution::Resolved(meta));
            }
        }

        info!("Checking {}", request);
        match self.index.lookup(request).await? {
            Some(release) => {
                let staged = self.download(&request.name, &release).await?;
                self.commit_and_inspect(&request.name, staged, release)
                    .await
                    .map(Resolution::Resolved)
            }
            None => self.not_in_index(request).await,
        }
    }

    async fn cached(&self, name: &str) -> Result<Option<CacheEntry>> {
        let cache = Arc::clone(&self.cache);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || cache.get(&name)).await?
    }

    /// Turn a cache entry into a record, or `None` when the entry no longer
    /// applies.
    ///
    /// Core entries are only trusted while the module is core for the perl
    /// version of this run; the cache may be shared across perl versions.
    async fn from_cache(&self, name: &str, entry: CacheEntry) -> Result<Option<PackageMeta>> {
        match entry {
            CacheEntry::Core(record) => match self.core.version(name) {
                Some(version) => Ok(Some(PackageMeta::core(name, version))),
                None => {
                    debug!(
                        "Cached core entry for {} (version {}) is not core for perl {}, re-resolving",
                        name,
                        record.version,
                        self.core.perl_version()
                    );
                    Ok(None)
                }
            },
            CacheEntry::Archive { archive, release } => {
                let core = Arc::clone(&self.core);
                let name = name.to_string();
                tokio::task::spawn_blocking(move || inspect(&name, &archive, &release, &core))
                    .await?
                    .map(Some)
            }
        }
    }

    async fn not_in_index(&self, request: &DependencyRequest) -> Result<Resolution> {
        let Some(version) = self.core.version(&request.name) else {
            error!("Failed to find {}", request);
            return Ok(Resolution::Failed(request.name.clone()));
        };

        info!("Found {} in core modules", request.name);
        let record = CoreRecord::new(request.name.clone(), version);
        let cache = Arc::clone(&self.cache);
        let stored = record.clone();
        tokio::task::spawn_blocking(move || cache.put_core(&stored)).await??;
        Ok(Resolution::Resolved(PackageMeta::core(record.name, record.version)))
    }

    /// Stream the archive into the cache, hashing it on the way.
    ///
    /// Chunks go through a bounded queue to a blocking writer, so at most
    /// [`DOWNLOAD_QUEUE_DEPTH`] chunks are held in memory. The returned
    /// writer is verified but not yet committed; dropping it discards the
    /// staged bytes.
    async fn download(&self, name: &str, release: &IndexRelease) -> Result<Box<dyn ArchiveWriter>> {
        debug!("Downloading {} from {}", name, release.download_url);
        let mut stream = self.index.download(&release.download_url).await?;

        let cache = Arc::clone(&self.cache);
        let staged_name = name.to_string();
        let (tx, mut rx) = mpsc::channel::<Bytes>(DOWNLOAD_QUEUE_DEPTH);
        let sink = tokio::task::spawn_blocking(move || -> Result<Box<dyn ArchiveWriter>> {
            let mut writer = cache.stage(&staged_name)?;
            while let Some(chunk) = rx.blocking_recv() {
                writer.write_all(&chunk)?;
            }
            writer.flush()?;
            Ok(writer)
        });

        let mut hasher = Sha256::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            if tx.send(chunk).await.is_err() {
                // The writer hung up; its error is reported below.
                break;
            }
        }
        drop(tx);
        let writer = sink.await??;

        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(release.checksum_sha256.trim()) {
            return Err(SnapshotError::ChecksumMismatch {
                package: name.to_string(),
                url: release.download_url.clone(),
                expected: release.checksum_sha256.clone(),
                actual,
            });
        }
        Ok(writer)
    }

    /// Publish a verified archive, then inspect it from the cache
    async fn commit_and_inspect(
        &self,
        name: &str,
        staged: Box<dyn ArchiveWriter>,
        release: IndexRelease,
    ) -> Result<PackageMeta> {
        let cache = Arc::clone(&self.cache);
        let core = Arc::clone(&self.core);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            staged.commit(&release)?;
            match cache.get(&name)? {
                Some(CacheEntry::Archive { archive, release }) => {
                    inspect(&name, &archive, &release, &core)
                }
                _ => Err(SnapshotError::archive(
                    &name,
                    "archive missing from the cache after commit",
                )),
            }
        })
        .await?
    }
}
