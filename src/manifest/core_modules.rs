//! Core-module table
//!
//! Maps perl versions to the modules that ship with them, as exported from
//! Module::CoreList: `{ "5.036000": { "strict": "1.12", ... } }`. One perl
//! version is selected up front and every lookup goes through it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::error::{Result, SnapshotError};
use crate::manifest::version_string;

/// Pseudo-package naming the interpreter itself. Distributions list it as a
/// prerequisite but it has no archive.
pub const RUNTIME_PACKAGE: &str = "perl";

/// Modules bundled with the selected perl version
#[derive(Debug, Clone)]
pub struct CoreModuleTable {
    perl_version: String,
    modules: BTreeMap<String, String>,
}

impl CoreModuleTable {
    /// Parse the full table and select a perl version.
    ///
    /// An explicit `perl_version` must be a key of the table; without one the
    /// highest version present is used.
    pub fn from_json(text: &str, perl_version: Option<&str>) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> = serde_json::from_str(text)
            .map_err(|e| {
                SnapshotError::ManifestInput(format!("Failed to parse core module table: {}", e))
            })?;

        let selected = match perl_version {
            Some(v) => {
                if !raw.contains_key(v) {
                    return Err(SnapshotError::Configuration(format!(
                        "Perl version {} not found in core modules",
                        v
                    )));
                }
                v.to_string()
            }
            None => raw
                .keys()
                .max_by(|a, b| compare_perl_versions(a, b))
                .cloned()
                .ok_or_else(|| {
                    SnapshotError::Configuration("Core module table is empty".to_string())
                })?,
        };

        info!("Using perl version {}", selected);

        let modules = raw
            .get(&selected)
            .map(|table| {
                table
                    .iter()
                    .map(|(name, v)| (name.clone(), version_string(v).unwrap_or_else(|| "0".into())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            perl_version: selected,
            modules,
        })
    }

    /// Read the table from any reader
    pub fn from_reader<R: Read>(mut reader: R, perl_version: Option<&str>) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_json(&text, perl_version)
    }

    /// Read the table from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P, perl_version: Option<&str>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SnapshotError::ManifestInput(format!(
                "Failed to read core module table {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&text, perl_version)
    }

    /// Build a table for a single perl version directly
    pub fn from_modules<I, K, V>(perl_version: &str, modules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            perl_version: perl_version.to_string(),
            modules: modules
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The perl version all lookups are made against
    pub fn perl_version(&self) -> &str {
        &self.perl_version
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Core version of `name`, if it is a core module
    pub fn version(&self, name: &str) -> Option<&str> {
        self.modules.get(name).map(String::as_str)
    }

    /// Whether the core copy of `name` is at least as new as `version`.
    ///
    /// Comparison is plain string ordering, matching how the index itself
    /// ranks versions. `"0.9" >= "0.10"` is therefore true.
    pub fn shadows(&self, name: &str, version: &str) -> bool {
        self.version(name)
            .map(|core| core >= version)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Order perl version keys: numerically when both are decimals, else by string.
pub fn compare_perl_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}
