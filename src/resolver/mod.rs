//! Dependency resolution
//!
//! - [`fetch`]: resolve, download, verify and inspect a single package
//! - [`engine`]: breadth-first worklist over the whole dependency graph

pub mod engine;
pub mod fetch;

use std::collections::{BTreeMap, BTreeSet};

use crate::package::PackageMeta;

pub use engine::ResolutionEngine;
pub use fetch::PackageFetcher;

/// Outcome of resolving one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PackageMeta),
    /// Neither in the index nor a core module
    Failed(String),
}

/// Terminal state of a resolution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionState {
    /// Package name -> record; later waves overwrite earlier entries
    pub resolved: BTreeMap<String, PackageMeta>,
    /// Names that could not be resolved
    pub failures: BTreeSet<String>,
    /// Number of waves the run took
    pub waves: usize,
}
