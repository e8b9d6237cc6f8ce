//! Download cache
//!
//! A cache entry for a package is an archive plus a JSON sidecar holding the
//! index answer it was fetched with. Packages that only exist as core modules
//! get a sidecar-only entry marked `is_core`.
//!
//! Completeness rules:
//! - archive entry: both the archive and a release sidecar exist
//! - core entry: a core sidecar exists
//!
//! Anything else (archive without sidecar, sidecar without archive, sidecar
//! that does not parse) is a miss and gets re-fetched.

pub mod fs;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::error::Result;
use crate::index::IndexRelease;

pub use fs::FsCache;
pub use memory::MemoryCache;

/// Sidecar for a package satisfied by the perl core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRecord {
    pub name: String,
    pub version: String,
    pub is_core: bool,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CoreRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            is_core: true,
            requires: Vec::new(),
            url: None,
        }
    }
}

/// Sidecar file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sidecar {
    Core(CoreRecord),
    Release(IndexRelease),
}

/// A complete cache entry
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Core(CoreRecord),
    Archive {
        archive: Vec<u8>,
        release: IndexRelease,
    },
}

/// An archive being written into the cache.
///
/// Bytes written are invisible to readers until [`commit`](Self::commit).
/// Dropping the writer without committing discards everything written.
pub trait ArchiveWriter: Write + Send {
    /// Publish the archive together with the index answer it came from
    fn commit(self: Box<Self>, release: &IndexRelease) -> Result<()>;
}

/// Key-value store for downloaded packages, keyed by package name.
///
/// Implementations must make a commit appear atomic to concurrent readers:
/// an entry becomes visible through `has`/`get` only once both halves are
/// written.
pub trait PackageCache: Send + Sync {
    /// Whether a complete entry exists for `name`
    fn has(&self, name: &str) -> bool;

    /// Fetch the complete entry for `name`, if any
    fn get(&self, name: &str) -> Result<Option<CacheEntry>>;

    /// Start writing the archive for `name`
    fn stage(&self, name: &str) -> Result<Box<dyn ArchiveWriter>>;

    /// Record that `record.name` resolves to a core module
    fn put_core(&self, record: &CoreRecord) -> Result<()>;
}
