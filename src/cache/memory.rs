//! In-memory cache, used by tests and dry runs

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, RwLock};

use super::{ArchiveWriter, CacheEntry, CoreRecord, PackageCache};
use crate::error::Result;
use crate::index::IndexRelease;

type Entries = Arc<RwLock<HashMap<String, CacheEntry>>>;

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Entries,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, name: &str, entry: CacheEntry) {
        insert(&self.entries, name, entry);
    }
}

fn insert(entries: &Entries, name: &str, entry: CacheEntry) {
    // A poisoned lock still holds consistent data: inserts are single calls.
    let mut entries = entries.write().unwrap_or_else(|e| e.into_inner());
    entries.insert(name.to_string(), entry);
}

/// Archive buffered until commit
struct StagedArchive {
    entries: Entries,
    name: String,
    body: Vec<u8>,
}

impl Write for StagedArchive {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArchiveWriter for StagedArchive {
    fn commit(self: Box<Self>, release: &IndexRelease) -> Result<()> {
        let StagedArchive { entries, name, body } = *self;
        insert(
            &entries,
            &name,
            CacheEntry::Archive {
                archive: body,
                release: release.clone(),
            },
        );
        Ok(())
    }
}

impl PackageCache for MemoryCache {
    fn has(&self, name: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(name))
            .unwrap_or(false)
    }

    fn get(&self, name: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(name).cloned())
    }

    fn stage(&self, name: &str) -> Result<Box<dyn ArchiveWriter>> {
        Ok(Box::new(StagedArchive {
            entries: Arc::clone(&self.entries),
            name: name.to_string(),
            body: Vec::new(),
        }))
    }

    fn put_core(&self, record: &CoreRecord) -> Result<()> {
        self.insert(&record.name, CacheEntry::Core(record.clone()));
        Ok(())
    }
}
