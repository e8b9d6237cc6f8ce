//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cpan_snapshot::error::{Result, SnapshotError};
use cpan_snapshot::index::{ArchiveStream, IndexRelease, PackageIndex};
use cpan_snapshot::manifest::flat_name;
use cpan_snapshot::{CoreModuleTable, DependencyRequest};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const PERL_VERSION: &str = "5.036000";

/// Archive flavours a fixture package can be packed as
#[derive(Debug, Clone, Copy)]
pub enum Packing {
    TarGz,
    Zip,
}

/// Pack `files` under `<root>/`
pub fn pack(root: &str, files: &[(&str, Vec<u8>)], packing: Packing) -> Vec<u8> {
    match packing {
        Packing::TarGz => {
            let mut builder = tar::Builder::new(Vec::new());
            for (path, body) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(body.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, format!("{}/{}", root, path), body.as_slice())
                    .unwrap();
            }
            let mut gz = GzEncoder::new(Vec::new(), Compression::default());
            gz.write_all(&builder.into_inner().unwrap()).unwrap();
            gz.finish().unwrap()
        }
        Packing::Zip => {
            let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
            let options = zip::write::FileOptions::default();
            for (path, body) in files {
                writer.start_file(format!("{}/{}", root, path), options).unwrap();
                writer.write_all(body).unwrap();
            }
            writer.finish().unwrap().into_inner()
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Index serving in-memory archives, counting every call
#[derive(Default)]
pub struct StaticIndex {
    releases: HashMap<String, (IndexRelease, Vec<u8>)>,
    pub lookups: AtomicUsize,
    pub downloads: AtomicUsize,
    /// Fail every call with a transport error
    pub offline: bool,
}

impl StaticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index that must not be reached
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn package(self, name: &str, meta: serde_json::Value) -> Self {
        self.package_with(name, meta, &[], Packing::TarGz)
    }

    /// Add `name` with a META.json, `lib/` module and extra files
    pub fn package_with(
        mut self,
        name: &str,
        meta: serde_json::Value,
        extra: &[&str],
        packing: Packing,
    ) -> Self {
        let root = format!("{}-1.0", flat_name(name));
        let mut files = vec![
            ("META.json", serde_json::to_vec_pretty(&meta).unwrap()),
            ("Makefile.PL", b"use ExtUtils::MakeMaker;".to_vec()),
        ];
        files.extend(extra.iter().map(|path| (*path, b"1;".to_vec())));
        let archive = pack(&root, &files, packing);
        let suffix = match packing {
            Packing::TarGz => "tar.gz",
            Packing::Zip => "zip",
        };
        let release = IndexRelease::new(
            format!("https://cpan.test/authors/{}.{}", root, suffix),
            sha256_hex(&archive),
            root,
            meta.get("version").and_then(|v| v.as_str()).map(str::to_string),
        );
        self.releases.insert(name.to_string(), (release, archive));
        self
    }

    /// Advertise a checksum the archive will not match
    pub fn corrupt(mut self, name: &str) -> Self {
        if let Some((release, _)) = self.releases.get_mut(name) {
            release.checksum_sha256 = sha256_hex(b"something else");
        }
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PackageIndex for StaticIndex {
    async fn lookup(&self, request: &DependencyRequest) -> Result<Option<IndexRelease>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(SnapshotError::Transport("index is offline".to_string()));
        }
        Ok(self.releases.get(&request.name).map(|(release, _)| release.clone()))
    }

    async fn download(&self, url: &str) -> Result<ArchiveStream> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(SnapshotError::Transport("index is offline".to_string()));
        }
        let archive = self
            .releases
            .values()
            .find(|(release, _)| release.download_url == url)
            .map(|(_, archive)| archive.clone())
            .ok_or_else(|| SnapshotError::Transport(format!("404 Not Found: {}", url)))?;
        let chunks: Vec<Result<Bytes>> = archive
            .chunks(1024)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

pub fn core_table(modules: &[(&str, &str)]) -> CoreModuleTable {
    CoreModuleTable::from_modules(PERL_VERSION, modules.iter().copied())
}

/// Temporary cache directory
pub struct TempCache {
    pub temp_dir: TempDir,
}

impl TempCache {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// File names currently in the cache, sorted
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
