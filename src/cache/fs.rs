//! Filesystem cache
//!
//! Layout:
//! ```text
//! <cache_dir>/
//! ├── Foo-Bar.archive        raw archive body
//! └── Foo-Bar.archive.meta   sidecar JSON
//! ```
//!
//! Both files are written to `*.partial` and renamed into place, archive
//! first, so a concurrent reader never sees a half-written entry as complete.
//! A staged archive that is never committed leaves nothing behind.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ArchiveWriter, CacheEntry, CoreRecord, PackageCache, Sidecar};
use crate::error::Result;
use crate::index::IndexRelease;
use crate::manifest::flat_name;

/// Cache rooted at a directory
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    /// Open (and create if needed) a cache directory
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!("Cache directory: {}", root.display());
        Ok(Self { root })
    }

    /// Path of the archive body for `name`
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.archive", flat_name(name)))
    }

    /// Path of the sidecar for `name`
    pub fn sidecar_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.archive.meta", flat_name(name)))
    }

    fn read_sidecar(&self, name: &str) -> Option<Sidecar> {
        let path = self.sidecar_path(name);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                warn!("Ignoring unreadable cache sidecar {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let partial = partial_path(path);
        fs::write(&partial, contents)?;
        fs::rename(&partial, path)?;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}

/// Archive body streaming into `<name>.archive.partial`
struct StagedArchive {
    file: BufWriter<File>,
    partial: PathBuf,
    archive: PathBuf,
    sidecar: PathBuf,
    committed: bool,
}

impl Write for StagedArchive {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl ArchiveWriter for StagedArchive {
    fn commit(mut self: Box<Self>, release: &IndexRelease) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        fs::rename(&self.partial, &self.archive)?;
        self.committed = true;
        let sidecar = serde_json::to_vec(&Sidecar::Release(release.clone()))?;
        FsCache::write_atomic(&self.sidecar, &sidecar)
    }
}

impl Drop for StagedArchive {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.partial) {
            Ok(()) => debug!("Discarded {}", self.partial.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.partial.display(), e),
        }
    }
}

impl PackageCache for FsCache {
    fn has(&self, name: &str) -> bool {
        match self.read_sidecar(name) {
            Some(Sidecar::Core(_)) => true,
            Some(Sidecar::Release(_)) => self.archive_path(name).is_file(),
            None => false,
        }
    }

    fn get(&self, name: &str) -> Result<Option<CacheEntry>> {
        match self.read_sidecar(name) {
            Some(Sidecar::Core(record)) => Ok(Some(CacheEntry::Core(record))),
            Some(Sidecar::Release(release)) => {
                let path = self.archive_path(name);
                if !path.is_file() {
                    debug!("Cache sidecar without archive for {}, treating as miss", name);
                    return Ok(None);
                }
                let archive = fs::read(&path)?;
                Ok(Some(CacheEntry::Archive { archive, release }))
            }
            None => Ok(None),
        }
    }

    fn stage(&self, name: &str) -> Result<Box<dyn ArchiveWriter>> {
        let archive = self.archive_path(name);
        let partial = partial_path(&archive);
        let file = BufWriter::new(File::create(&partial)?);
        Ok(Box::new(StagedArchive {
            file,
            partial,
            archive,
            sidecar: self.sidecar_path(name),
            committed: false,
        }))
    }

    fn put_core(&self, record: &CoreRecord) -> Result<()> {
        let sidecar = serde_json::to_vec(&Sidecar::Core(record.clone()))?;
        Self::write_atomic(&self.sidecar_path(&record.name), &sidecar)
    }
}
