//! Resolved package record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Namespace whose packages are test tooling
pub const TEST_NAMESPACE: &str = "Test::";

/// Everything the snapshot needs to know about one resolved package.
///
/// Created once by the fetcher and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub version: String,
    /// Runtime dependency names, sorted and deduplicated
    pub requires: Vec<String>,
    /// Build/configure dependency name -> constraint, core modules removed
    pub build_requires: BTreeMap<String, String>,
    pub conflicts: BTreeMap<String, String>,
    pub is_core: bool,
    /// Archive URL; `None` for core modules
    pub url: Option<String>,
    /// Root directory of the extracted archive
    pub release: Option<String>,
    pub sha256: Option<String>,
    /// Native source files, present only when there are any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xs_module_files: Option<Vec<String>>,
}

impl PackageMeta {
    /// Record for a package satisfied by the perl core
    pub fn core(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            requires: Vec::new(),
            build_requires: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            is_core: true,
            url: None,
            release: None,
            sha256: None,
            xs_module_files: None,
        }
    }

    /// Every dependency name the worklist should follow
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.requires
            .iter()
            .map(String::as_str)
            .chain(self.build_requires.keys().map(String::as_str))
    }
}

/// Apply the test-namespace rule to a dependency list.
///
/// Test packages may depend on other test packages; everything else has its
/// `Test::*` dependencies dropped.
pub fn filter_test_dependencies<'a, I>(package: &str, deps: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let is_test = package.starts_with(TEST_NAMESPACE);
    deps.into_iter()
        .filter(|dep| is_test || !dep.starts_with(TEST_NAMESPACE))
        .cloned()
        .collect()
}
