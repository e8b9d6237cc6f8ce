//! Breadth-first resolution in waves.
//!
//! Every wave resolves the whole pending set concurrently (bounded by
//! `jobs`), waits for all of it, then merges results in request order and
//! derives the next pending set from the packages resolved in that wave.
//! Merging after the barrier keeps the final state independent of task
//! completion order.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{PackageFetcher, Resolution, ResolutionState};
use crate::error::{Result, SnapshotError};
use crate::manifest::DependencyRequest;

pub struct ResolutionEngine {
    fetcher: Arc<PackageFetcher>,
    jobs: usize,
}

impl ResolutionEngine {
    /// `jobs` is clamped to at least one worker
    pub fn new(fetcher: Arc<PackageFetcher>, jobs: usize) -> Self {
        Self {
            fetcher,
            jobs: jobs.max(1),
        }
    }

    /// Resolve `requests` and everything they transitively depend on.
    ///
    /// Returns the first fatal error; package-level failures end up in
    /// `ResolutionState::failures`.
    pub async fn run(&self, requests: Vec<DependencyRequest>) -> Result<ResolutionState> {
        info!("Found {} dependencies", requests.len());
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut state = ResolutionState::default();
        let mut pending: BTreeSet<DependencyRequest> = requests.into_iter().collect();

        while !pending.is_empty() {
            state.waves += 1;
            debug!("Wave {}: resolving {} pending", state.waves, pending.len());

            let results = self
                .run_wave(std::mem::take(&mut pending), &semaphore)
                .await?;

            let mut wave_resolved = Vec::new();
            for resolution in results {
                match resolution {
                    Resolution::Resolved(meta) => {
                        state.failures.remove(&meta.name);
                        wave_resolved.push(meta.name.clone());
                        state.resolved.insert(meta.name.clone(), meta);
                    }
                    Resolution::Failed(name) => {
                        state.failures.insert(name);
                    }
                }
            }

            for name in &wave_resolved {
                let Some(meta) = state.resolved.get(name) else {
                    continue;
                };
                for dep in meta.dependency_names() {
                    if !state.resolved.contains_key(dep) {
                        pending.insert(DependencyRequest::latest(dep));
                    }
                }
            }
        }

        info!(
            "Resolved {} packages in {} waves ({} failures)",
            state.resolved.len(),
            state.waves,
            state.failures.len()
        );
        Ok(state)
    }

    /// Resolve one wave; results come back sorted by request
    async fn run_wave(
        &self,
        wave: BTreeSet<DependencyRequest>,
        semaphore: &Arc<Semaphore>,
    ) -> Result<Vec<Resolution>> {
        let mut tasks = JoinSet::new();
        for request in wave {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| SnapshotError::Worker(e.to_string()))?;
                let resolution = fetcher.resolve(&request).await?;
                Ok::<_, SnapshotError>((request, resolution))
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            // Returning drops the set, which aborts the remaining tasks.
            results.push(joined??);
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results.into_iter().map(|(_, resolution)| resolution).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::manifest::CoreModuleTable;
    use crate::resolver::test_support::StaticIndex;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn engine(index: Arc<StaticIndex>, core: CoreModuleTable, jobs: usize) -> ResolutionEngine {
        let fetcher = PackageFetcher::new(index, Arc::new(MemoryCache::new()), Arc::new(core));
        ResolutionEngine::new(Arc::new(fetcher), jobs)
    }

    fn no_core() -> CoreModuleTable {
        CoreModuleTable::from_modules("5.036000", Vec::<(String, String)>::new())
    }

    #[tokio::test]
    async fn test_chain_takes_one_wave_per_level() {
        let index = StaticIndex::new()
            .with_package("A", json!({"version": "1", "requires": {"B": "0"}}))
            .with_package("B", json!({"version": "1", "requires": {"C": "0"}}))
            .with_package("C", json!({"version": "1", "requires": {"D": "0"}}))
            .with_package("D", json!({"version": "1"}));
        let state = engine(Arc::new(index), no_core(), 4)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();

        assert_eq!(state.waves, 4);
        assert_eq!(
            state.resolved.keys().collect::<Vec<_>>(),
            vec!["A", "B", "C", "D"]
        );
        assert!(state.failures.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let index = Arc::new(
            StaticIndex::new()
                .with_package("A", json!({"version": "1", "requires": {"B": "0"}}))
                .with_package("B", json!({"version": "1", "requires": {"A": "0"}})),
        );
        let state = engine(Arc::clone(&index), no_core(), 1)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();

        assert_eq!(state.waves, 2);
        assert_eq!(state.resolved.len(), 2);
        assert_eq!(index.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_package_is_a_failure_not_an_error() {
        let index = StaticIndex::new()
            .with_package("A", json!({"version": "1", "requires": {"Gone": "0"}}));
        let state = engine(Arc::new(index), no_core(), 2)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();

        assert!(state.resolved.contains_key("A"));
        assert_eq!(state.failures.iter().collect::<Vec<_>>(), vec!["Gone"]);
    }

    #[tokio::test]
    async fn test_build_requires_are_followed() {
        let index = StaticIndex::new()
            .with_package(
                "A",
                json!({"version": "1", "prereqs": {"build": {"requires": {"Tool": "0"}}}}),
            )
            .with_package("Tool", json!({"version": "1"}));
        let state = engine(Arc::new(index), no_core(), 2)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();

        assert!(state.resolved.contains_key("Tool"));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_aborts_run() {
        let index = StaticIndex::new()
            .with_package("A", json!({"version": "1", "requires": {"B": "0"}}))
            .with_package("B", json!({"version": "1"}))
            .corrupt("B");
        let err = engine(Arc::new(index), no_core(), 2)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap_err();

        assert!(matches!(err, SnapshotError::ChecksumMismatch { ref package, .. } if package == "B"));
    }

    #[tokio::test]
    async fn test_perl_is_never_fetched() {
        let index = Arc::new(
            StaticIndex::new()
                .with_package("A", json!({"version": "1", "requires": {"perl": "5.008"}})),
        );
        let state = engine(Arc::clone(&index), no_core(), 2)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();

        assert!(state.resolved["perl"].is_core);
        assert_eq!(index.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_independent_of_job_count() {
        let build = || {
            Arc::new(
                StaticIndex::new()
                    .with_package("A", json!({"version": "1", "requires": {"B": "0", "C": "0"}}))
                    .with_package("B", json!({"version": "1", "requires": {"C": "0", "X": "0"}}))
                    .with_package("C", json!({"version": "1", "requires": {"A": "0"}})),
            )
        };
        let serial = engine(build(), no_core(), 1)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();
        let parallel = engine(build(), no_core(), 8)
            .run(vec![DependencyRequest::latest("A")])
            .await
            .unwrap();

        assert_eq!(serial, parallel);
    }
}
