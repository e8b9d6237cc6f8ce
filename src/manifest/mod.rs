//! cpanfile parsing
//!
//! Only top-level `requires "Name"[, "spec"];` lines are read. Everything
//! else (comments, pragmas, indented phase blocks) is skipped without
//! complaint.

pub mod core_modules;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, SnapshotError};

pub use core_modules::CoreModuleTable;

static REQUIRES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^requires\s+['"]([^\s'"]+)['"](,\s*['"]([^'"]+)['"])?\s*;\s*$"#)
        .expect("static regex is valid")
});

/// A package name with an optional version constraint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyRequest {
    pub name: String,
    /// Opaque constraint string passed to the index; `None` means latest
    pub version_spec: Option<String>,
}

impl DependencyRequest {
    pub fn new(name: impl Into<String>, version_spec: Option<String>) -> Self {
        Self {
            name: name.into(),
            version_spec,
        }
    }

    /// Request for whatever version the index considers latest
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }
}

impl std::fmt::Display for DependencyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version_spec {
            Some(spec) => write!(f, "{} ({})", self.name, spec),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Directly requested dependencies in cpanfile order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestedDependencies(IndexMap<String, Option<String>>);

impl RequestedDependencies {
    /// Parse cpanfile text
    pub fn parse(text: &str) -> Self {
        let mut out = IndexMap::new();
        for line in text.lines() {
            if let Some(caps) = REQUIRES.captures(line) {
                let name = caps[1].to_string();
                let spec = caps.get(3).map(|m| m.as_str().to_string());
                // insert() keeps the original slot when the key already exists
                out.insert(name, spec);
            }
        }
        debug!("Parsed {} requirements from cpanfile", out.len());
        Self(out)
    }

    /// Read and parse a cpanfile from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SnapshotError::ManifestInput(format!(
                "Failed to read cpanfile {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self::parse(&text))
    }

    /// Worklist seed for the resolution engine
    pub fn requests(&self) -> Vec<DependencyRequest> {
        self.0
            .iter()
            .map(|(name, spec)| DependencyRequest::new(name.clone(), spec.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Option<String>> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Flatten a package name for use as a file name or build target
/// (`Foo::Bar` -> `Foo-Bar`).
pub fn flat_name(name: &str) -> String {
    name.replace("::", "-")
}

/// Render a JSON/YAML scalar as a version string.
///
/// Distribution metadata and the core table are not consistent about quoting
/// versions, so numbers are accepted and printed back as written by the
/// parser. `null` and non-scalars yield `None`.
pub(crate) fn version_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
