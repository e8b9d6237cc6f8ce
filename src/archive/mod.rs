//! Archive inspection
//!
//! Reads a distribution archive in memory: lists its members, pulls out the
//! META.json / META.yml candidates and turns the result into a
//! [`PackageMeta`](crate::package::PackageMeta).

pub mod format;
pub mod inspect;
pub mod meta;
pub mod tree;

use flate2::read::MultiGzDecoder;
use std::io::{Cursor, Read};

use crate::error::{Result, SnapshotError};

pub use format::{detect, ArchiveFormat};
pub use inspect::inspect;
pub use meta::DistManifest;
pub use tree::FileTree;

/// Manifest file names, in order of preference
pub const MANIFEST_JSON: &str = "META.json";
pub const MANIFEST_YAML: &str = "META.yml";

/// What a single pass over an archive yields
#[derive(Debug, Default, Clone)]
pub struct ArchiveContents {
    /// Non-directory member paths, in archive order
    pub members: Vec<String>,
    /// Raw bytes of every `*/META.json` and `*/META.yml` member
    pub manifests: Vec<(String, Vec<u8>)>,
}

fn is_manifest_candidate(path: &str) -> bool {
    path.ends_with(&format!("/{}", MANIFEST_JSON)) || path.ends_with(&format!("/{}", MANIFEST_YAML))
}

/// Sniff the format of `bytes` and read its member list and manifests
pub fn read_archive(package: &str, bytes: &[u8]) -> Result<ArchiveContents> {
    let format = detect(bytes).ok_or_else(|| SnapshotError::UndetectableFormat {
        package: package.to_string(),
    })?;

    match format {
        // A gzip file may hold several concatenated members.
        ArchiveFormat::Gzip => read_tar(package, MultiGzDecoder::new(bytes)),
        ArchiveFormat::Tar => read_tar(package, bytes),
        ArchiveFormat::Zip => read_zip(package, bytes),
        ArchiveFormat::Other(_) => Err(SnapshotError::UnsupportedFormat {
            package: package.to_string(),
            format: format.name().to_string(),
        }),
    }
}

fn read_tar<R: Read>(package: &str, reader: R) -> Result<ArchiveContents> {
    let mut archive = tar::Archive::new(reader);
    let mut contents = ArchiveContents::default();

    let entries = archive
        .entries()
        .map_err(|e| SnapshotError::archive(package, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| SnapshotError::archive(package, e))?;
        let kind = entry.header().entry_type();
        if kind.is_dir() || kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| SnapshotError::archive(package, e))?
            .to_string_lossy()
            .into_owned();

        if is_manifest_candidate(&path) {
            let mut body = Vec::new();
            entry
                .read_to_end(&mut body)
                .map_err(|e| SnapshotError::archive(package, e))?;
            contents.manifests.push((path.clone(), body));
        }
        contents.members.push(path);
    }
    Ok(contents)
}

fn read_zip(package: &str, bytes: &[u8]) -> Result<ArchiveContents> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| SnapshotError::archive(package, e))?;
    let mut contents = ArchiveContents::default();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| SnapshotError::archive(package, e))?;
        if file.is_dir() {
            continue;
        }
        let path = file.name().to_string();
        if is_manifest_candidate(&path) {
            let mut body = Vec::new();
            file.read_to_end(&mut body)
                .map_err(|e| SnapshotError::archive(package, e))?;
            contents.manifests.push((path.clone(), body));
        }
        contents.members.push(path);
    }
    Ok(contents)
}
