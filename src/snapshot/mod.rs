//! Lockfile assembly
//!
//! Prunes the resolution state down to the packages a build has to fetch
//! and writes it out as a deterministic JSON document.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::manifest::core_modules::RUNTIME_PACKAGE;
use crate::manifest::{flat_name, CoreModuleTable, RequestedDependencies};
use crate::package::PackageMeta;
use crate::resolver::ResolutionState;

/// One package in the lockfile.
///
/// Fields are declared in the order they are written, which is sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub build_requires: Vec<String>,
    pub dependencies: Vec<String>,
    pub release: Option<String>,
    pub sha256: Option<String>,
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xs_module_files: Option<Vec<String>>,
}

/// The lockfile document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub failures: Vec<String>,
    pub requested: RequestedDependencies,
    pub resolved: BTreeMap<String, LockedPackage>,
}

impl Snapshot {
    /// Prune `state` and build the lockfile.
    ///
    /// Drops the perl runtime and every core module, then drops edges that
    /// point at anything no longer present. Package and dependency names are
    /// written in flat form (`Foo::Bar` -> `Foo-Bar`).
    pub fn assemble(
        state: &ResolutionState,
        requested: &RequestedDependencies,
        core: &CoreModuleTable,
    ) -> Self {
        let kept: BTreeMap<&str, &PackageMeta> = state
            .resolved
            .iter()
            .filter(|(name, meta)| {
                name.as_str() != RUNTIME_PACKAGE && !meta.is_core && !core.contains(name)
            })
            .map(|(name, meta)| (name.as_str(), meta))
            .collect();

        let resolved = kept
            .iter()
            .map(|(name, meta)| {
                let locked = LockedPackage {
                    build_requires: edges(meta.build_requires.keys(), &kept),
                    dependencies: edges(meta.requires.iter(), &kept),
                    release: meta.release.clone(),
                    sha256: meta.sha256.clone(),
                    url: meta.url.clone(),
                    xs_module_files: meta.xs_module_files.clone(),
                };
                (flat_name(name), locked)
            })
            .collect();

        if !state.failures.is_empty() {
            warn!(
                "Failed to resolve {} packages: {}",
                state.failures.len(),
                state.failures.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        Self {
            failures: state.failures.iter().cloned().collect(),
            requested: requested.clone(),
            resolved,
        }
    }

    /// Pretty-printed JSON with a trailing newline
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn write_to_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(self.to_json_pretty()?.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Write to `path`, or to stdout when `path` is `None`
    pub fn write_to(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                info!("Writing snapshot of {} packages to {}", self.resolved.len(), path.display());
                self.write_to_writer(BufWriter::new(File::create(path)?))
            }
            None => self.write_to_writer(std::io::stdout().lock()),
        }
    }
}

/// Flat names of `deps` still present in `kept`, sorted and deduplicated
fn edges<'a, I>(deps: I, kept: &BTreeMap<&str, &PackageMeta>) -> Vec<String>
where
    I: Iterator<Item = &'a String>,
{
    deps.filter(|dep| kept.contains_key(dep.as_str()))
        .map(|dep| flat_name(dep))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
