//! End-to-end snapshot runs against an in-memory index

use cpan_snapshot::{FsCache, RequestedDependencies, SnapshotError, Snapshotter};
use serde_json::json;
use std::sync::Arc;
mod common;
use common::*;

fn cpanfile(lines: &[&str]) -> RequestedDependencies {
    RequestedDependencies::parse(&lines.join("\n"))
}

fn snapshotter(
    requested: RequestedDependencies,
    core: &[(&str, &str)],
    index: Arc<StaticIndex>,
    cache: &TempCache,
    jobs: usize,
) -> Snapshotter {
    let fs_cache = FsCache::new(cache.path()).unwrap();
    Snapshotter::new(requested, core_table(core), index, Arc::new(fs_cache), jobs)
}

#[tokio::test]
async fn test_direct_dependency_on_core_module() {
    let index = Arc::new(StaticIndex::new().package(
        "Foo::Bar",
        json!({"name": "Foo-Bar", "version": "1.0", "requires": {"Baz::Qux": "0", "perl": "5.008"}}),
    ));
    let cache = TempCache::new();
    let snapshot = snapshotter(
        cpanfile(&[r#"requires "Foo::Bar", "1.0";"#]),
        &[("Baz::Qux", "1.2")],
        index.clone(),
        &cache,
        4,
    )
    .run()
    .await
    .unwrap();

    let value = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(
        value,
        json!({
            "failures": [],
            "requested": {"Foo::Bar": "1.0"},
            "resolved": {
                "Foo-Bar": {
                    "build_requires": [],
                    "dependencies": [],
                    "release": "Foo-Bar-1.0",
                    "sha256": snapshot.resolved["Foo-Bar"].sha256.clone().unwrap(),
                    "url": "https://cpan.test/authors/Foo-Bar-1.0.tar.gz"
                }
            }
        })
    );
    // The core module is cached as a sidecar-only entry.
    assert_eq!(
        cache.files(),
        vec!["Baz-Qux.archive.meta", "Foo-Bar.archive", "Foo-Bar.archive.meta"]
    );
}

#[tokio::test]
async fn test_unknown_package_is_reported() {
    let cache = TempCache::new();
    let snapshot = snapshotter(
        cpanfile(&[r#"requires "Unknown::Pkg";"#]),
        &[],
        Arc::new(StaticIndex::new()),
        &cache,
        1,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(snapshot.failures, vec!["Unknown::Pkg"]);
    assert!(snapshot.resolved.is_empty());
    assert_eq!(snapshot.requested.get("Unknown::Pkg"), Some(&None));
}

#[tokio::test]
async fn test_checksum_mismatch_aborts_without_caching() {
    let index = StaticIndex::new()
        .package("Good", json!({"version": "1", "requires": {"Bad": "0"}}))
        .package("Bad", json!({"version": "1"}))
        .corrupt("Bad");
    let cache = TempCache::new();
    let err = snapshotter(cpanfile(&[r#"requires "Good";"#]), &[], Arc::new(index), &cache, 2)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SnapshotError::ChecksumMismatch { ref package, .. } if package == "Bad"));
    // Neither the archive nor its staging file survive.
    assert!(!cache.files().iter().any(|f| f.starts_with("Bad")));
}

#[tokio::test]
async fn test_rerun_from_cache_is_byte_identical_and_offline() {
    let index = StaticIndex::new()
        .package("App", json!({"version": "2", "requires": {"Dep::One": "0", "Dep::Two": "0"}}))
        .package("Dep::One", json!({"version": "1", "requires": {"Dep::Two": "0", "List::Util": "0"}}))
        .package("Dep::Two", json!({"version": "1", "requires": {"App": "0"}}));
    let requested = cpanfile(&[r#"requires "App";"#, r#"requires "Missing";"#]);
    let core = [("List::Util", "1.63")];
    let cache = TempCache::new();

    let first = snapshotter(requested.clone(), &core, Arc::new(index), &cache, 3)
        .run()
        .await
        .unwrap()
        .to_json_pretty()
        .unwrap();

    // Only the failed lookup goes back to the index.
    let offline = Arc::new(StaticIndex::offline());
    let second = snapshotter(requested.clone(), &core, offline.clone(), &cache, 1)
        .run()
        .await;
    assert!(matches!(second, Err(SnapshotError::Transport(_))));
    assert_eq!(offline.downloads(), 0);

    let replay = Arc::new(StaticIndex::new());
    let second = snapshotter(requested, &core, replay.clone(), &cache, 1)
        .run()
        .await
        .unwrap()
        .to_json_pretty()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(replay.lookups(), 1);
    assert_eq!(replay.downloads(), 0);
}

#[tokio::test]
async fn test_shared_cache_across_perl_versions() {
    let requested = cpanfile(&[r#"requires "App";"#]);
    let index = || {
        Arc::new(StaticIndex::new().package("App", json!({"version": "1", "requires": {"Time::Piece": "0"}})))
    };
    let cache = TempCache::new();

    let newer_perl = snapshotter(requested.clone(), &[("Time::Piece", "1.3401")], index(), &cache, 2)
        .run()
        .await
        .unwrap();
    assert_eq!(newer_perl.resolved.keys().collect::<Vec<_>>(), vec!["App"]);
    assert!(newer_perl.failures.is_empty());
    assert!(cache.files().contains(&"Time-Piece.archive.meta".to_string()));

    // Not core any more and not in the index: reported, never dropped.
    let older_perl = snapshotter(requested.clone(), &[], index(), &cache, 2)
        .run()
        .await
        .unwrap();
    assert_eq!(older_perl.failures, vec!["Time::Piece"]);
    assert_eq!(older_perl.resolved.keys().collect::<Vec<_>>(), vec!["App"]);

    // Not core any more but released on its own: locked like any other package.
    let released = Arc::new(
        StaticIndex::new()
            .package("App", json!({"version": "1", "requires": {"Time::Piece": "0"}}))
            .package("Time::Piece", json!({"version": "1.3401"})),
    );
    let older_perl = snapshotter(requested, &[], released.clone(), &cache, 2)
        .run()
        .await
        .unwrap();
    assert!(older_perl.failures.is_empty());
    assert_eq!(older_perl.resolved["App"].dependencies, vec!["Time-Piece"]);
    assert_eq!(released.downloads(), 1);
}

#[tokio::test]
async fn test_core_shadowed_package_excluded() {
    let index = StaticIndex::new()
        .package("App", json!({"version": "1", "requires": {"Scalar::Util": "0", "Moo": "0"}}))
        .package("Scalar::Util", json!({"version": "1.50", "requires": {"XSLoader": "0"}}))
        .package("Moo", json!({"version": "2.005005"}));
    let cache = TempCache::new();
    let snapshot = snapshotter(
        cpanfile(&[r#"requires "App";"#]),
        &[("Scalar::Util", "1.63"), ("XSLoader", "0.32")],
        Arc::new(index),
        &cache,
        2,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(snapshot.resolved.keys().collect::<Vec<_>>(), vec!["App", "Moo"]);
    assert_eq!(snapshot.resolved["App"].dependencies, vec!["Moo"]);
}

#[tokio::test]
async fn test_test_namespace_filtering() {
    let index = StaticIndex::new()
        .package("App", json!({"version": "1", "requires": {"Test::Deep": "0", "Try::Tiny": "0"}}))
        .package("Try::Tiny", json!({"version": "0.31"}))
        .package("Test::Harness::Extra", json!({"version": "1", "requires": {"Test::Deep": "0"}}))
        .package("Test::Deep", json!({"version": "1.204"}));
    let cache = TempCache::new();
    let snapshot = snapshotter(
        cpanfile(&[r#"requires "App";"#, r#"requires "Test::Harness::Extra";"#]),
        &[],
        Arc::new(index),
        &cache,
        2,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(snapshot.resolved["App"].dependencies, vec!["Try-Tiny"]);
    assert_eq!(snapshot.resolved["Test-Harness-Extra"].dependencies, vec!["Test-Deep"]);
}

#[tokio::test]
async fn test_zip_archive_with_native_sources() {
    let index = StaticIndex::new().package_with(
        "Fast::Parse",
        json!({
            "version": "0.02",
            "prereqs": {"configure": {"requires": {"ExtUtils::ParseXS": "3.0", "ExtUtils::MakeMaker": "0"}}}
        }),
        &["Parse.xs", "ppport.h", "lib/Fast/Parse.pm"],
        Packing::Zip,
    )
    .package("ExtUtils::ParseXS", json!({"version": "3.51"}));
    let cache = TempCache::new();
    let snapshot = snapshotter(
        cpanfile(&[r#"requires "Fast::Parse";"#]),
        &[("ExtUtils::MakeMaker", "7.64")],
        Arc::new(index),
        &cache,
        2,
    )
    .run()
    .await
    .unwrap();

    let locked = &snapshot.resolved["Fast-Parse"];
    assert_eq!(
        locked.xs_module_files,
        Some(vec!["Fast-Parse-1.0/Parse.xs".to_string(), "Fast-Parse-1.0/ppport.h".to_string()])
    );
    assert_eq!(locked.build_requires, vec!["ExtUtils-ParseXS"]);
    assert!(snapshot.resolved.contains_key("ExtUtils-ParseXS"));
}

#[tokio::test]
async fn test_snapshot_is_closed_under_dependencies() {
    let index = StaticIndex::new()
        .package("A", json!({"version": "1", "requires": {"B": "0", "C": "0", "Gone": "0"}}))
        .package("B", json!({"version": "1", "requires": {"C": "0", "strict": "0"}}))
        .package("C", json!({"version": "1", "requires": {"A": "0"}}));
    let cache = TempCache::new();
    let snapshot = snapshotter(cpanfile(&[r#"requires "A";"#]), &[("strict", "1.12")], Arc::new(index), &cache, 8)
        .run()
        .await
        .unwrap();

    assert_eq!(snapshot.failures, vec!["Gone"]);
    for (name, locked) in &snapshot.resolved {
        for dep in locked.dependencies.iter().chain(&locked.build_requires) {
            assert!(snapshot.resolved.contains_key(dep), "{} -> {} dangles", name, dep);
        }
    }
}
