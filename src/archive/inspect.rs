//! Turn a fetched archive into a [`PackageMeta`]

use std::path::Path;
use tracing::{debug, warn};

use super::{read_archive, ArchiveContents, DistManifest, FileTree, MANIFEST_JSON, MANIFEST_YAML};
use crate::error::Result;
use crate::index::IndexRelease;
use crate::manifest::CoreModuleTable;
use crate::package::{filter_test_dependencies, PackageMeta};

/// Extensions of native (XS / C) source files
const NATIVE_EXTENSIONS: &[&str] = &["xs", "c", "h"];

/// Inspect `archive` (fetched for `release`) and produce the package record.
///
/// A missing or undecodable META file degrades to an empty manifest. Only an
/// unreadable archive is an error.
pub fn inspect(
    name: &str,
    archive: &[u8],
    release: &IndexRelease,
    core: &CoreModuleTable,
) -> Result<PackageMeta> {
    let contents = read_archive(name, archive)?;
    let tree = FileTree::from_paths(&contents.members);

    let manifest = select_manifest(name, &contents).unwrap_or_else(|| {
        warn!("No usable {} or {} in archive for {}", MANIFEST_JSON, MANIFEST_YAML, name);
        DistManifest::default()
    });

    let version = manifest
        .version
        .clone()
        .or_else(|| release.version.clone())
        .unwrap_or_else(|| "0".to_string());

    if core.shadows(name, &version) {
        let core_version = core.version(name).unwrap_or("0");
        debug!(
            "{} {} is shadowed by core version {} in perl {}",
            name,
            version,
            core_version,
            core.perl_version()
        );
        return Ok(PackageMeta::core(name, core_version));
    }

    if manifest.dynamic_config {
        warn!("Package {} has dynamic_config, static prerequisites may be incomplete", name);
    }

    let mut requires = filter_test_dependencies(name, manifest.requires.keys());
    requires.sort();
    requires.dedup();

    let build_requires = manifest
        .build_and_configure()
        .into_iter()
        .filter(|(dep, _)| !core.contains(dep))
        .collect();

    let native = native_sources(&tree.files());

    Ok(PackageMeta {
        name: name.to_string(),
        version,
        requires,
        build_requires,
        conflicts: manifest.conflicts,
        is_core: false,
        url: Some(release.download_url.clone()),
        release: release_root(&release.release, &tree),
        sha256: Some(release.checksum_sha256.clone()),
        xs_module_files: (!native.is_empty()).then_some(native),
    })
}

/// First decodable manifest: META.json candidates before META.yml, shallower
/// paths before deeper ones, archive order otherwise.
fn select_manifest(name: &str, contents: &ArchiveContents) -> Option<DistManifest> {
    let mut candidates: Vec<(usize, usize, &str, &[u8])> = contents
        .manifests
        .iter()
        .map(|(path, body)| {
            let rank = if path.ends_with(MANIFEST_JSON) { 0 } else { 1 };
            (rank, path.matches('/').count(), path.as_str(), body.as_slice())
        })
        .collect();
    candidates.sort_by_key(|(rank, depth, _, _)| (*rank, *depth));

    for (rank, _, path, body) in candidates {
        let text = match std::str::from_utf8(body) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to decode {} in {}: {}", path, name, e);
                continue;
            }
        };
        let parsed = if rank == 0 {
            DistManifest::from_json(text)
        } else {
            DistManifest::from_yaml(text)
        };
        match parsed {
            Ok(manifest) => {
                debug!("Using {} for {}", path, name);
                return Some(manifest);
            }
            Err(e) => warn!("Failed to parse {} in {}: {}", path, name, e),
        }
    }
    None
}

/// The directory a build system should treat as the extracted root
fn release_root(reported: &str, tree: &FileTree) -> Option<String> {
    if !reported.is_empty() && tree.contains(reported) {
        return Some(reported.to_string());
    }
    tree.top_level()
        .next()
        .map(str::to_string)
        .or_else(|| (!reported.is_empty()).then(|| reported.to_string()))
}

/// Sorted native source paths
fn native_sources(members: &[String]) -> Vec<String> {
    let mut native: Vec<String> = members
        .iter()
        .filter(|path| {
            Path::new(path.as_str())
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| NATIVE_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    native.sort();
    native.dedup();
    native
}
