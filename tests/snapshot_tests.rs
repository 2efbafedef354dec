//! Integration tests for the snapshot cache and the load-or-build pipeline.

use tempfile::TempDir;

use keyspace_report::cache::{SnapshotCache, SnapshotMeta};
use keyspace_report::pipeline::{PipelineError, PipelineOptions, ReportPipeline, Source};
use keyspace_report::store::{KeySource, MemoryStore};
use keyspace_report::tree::{AggregationEngine, KeyTrie};

fn keyspace() -> MemoryStore {
    MemoryStore::with_sizes([
        ("user:1:profile", 300),
        ("user:1:avatar", 4096),
        ("user:2:profile", 280),
        ("session:abc", 64),
        ("session:def", 64),
        ("flag", 1),
    ])
}

fn pipeline(dir: &TempDir) -> ReportPipeline {
    ReportPipeline::new(
        KeyTrie::default(),
        AggregationEngine::default(),
        SnapshotCache::new(dir.path().join("snapshots"), 3),
    )
}

#[test]
fn test_save_then_load_reproduces_every_node() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();

    let keys = store.enumerate_keys().unwrap();
    let (root, meta) = pipeline.build(&mut store, "x", keys).unwrap();

    let path = pipeline.cache().save(&root, &meta).unwrap();
    assert!(path.ends_with("x.snapshot"));

    let loaded = pipeline.cache().load("x").unwrap().expect("snapshot present");
    assert_eq!(loaded.meta, meta);
    assert_eq!(loaded.root.node_count(), root.node_count());
    for ((depth_a, a), (depth_b, b)) in root.iter().zip(loaded.root.iter()) {
        assert_eq!(depth_a, depth_b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.leaf_count(), b.leaf_count());
        assert_eq!(a.size_bytes(), b.size_bytes());
        assert_eq!(a.is_leaf(), b.is_leaf());
    }
}

#[test]
fn test_save_replaces_previous_snapshot() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();

    let keys = store.enumerate_keys().unwrap();
    let (root, meta) = pipeline.build(&mut store, "r", keys).unwrap();
    pipeline.cache().save(&root, &meta).unwrap();

    store.remove("flag");
    let keys = store.enumerate_keys().unwrap();
    let (smaller, meta) = pipeline.build(&mut store, "r", keys).unwrap();
    pipeline.cache().save(&smaller, &meta).unwrap();

    let loaded = pipeline.cache().load("r").unwrap().unwrap();
    assert_eq!(loaded.root.leaf_count(), 5);

    let files: Vec<_> = std::fs::read_dir(pipeline.cache().dir())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files.len(), 1, "temporary files must not linger: {files:?}");
}

#[test]
fn test_regenerate_rescans() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();

    pipeline
        .load_or_build(&mut store, "client", PipelineOptions::default())
        .unwrap();
    store.remove("flag");

    // Without regenerate the stale snapshot is served as is.
    let stale = pipeline
        .load_or_build(&mut store, "client", PipelineOptions::default())
        .unwrap();
    assert_eq!(stale.source, Source::Cached);
    assert_eq!(stale.root.leaf_count(), 6);

    let fresh = pipeline
        .load_or_build(
            &mut store,
            "client",
            PipelineOptions {
                regenerate: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(fresh.source, Source::Built);
    assert_eq!(fresh.root.leaf_count(), 5);
}

#[test]
fn test_verify_keyspace_detects_changes() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();
    let verify = PipelineOptions {
        verify_keyspace: true,
        ..Default::default()
    };

    pipeline.load_or_build(&mut store, "v", verify).unwrap();
    let probes_after_build = store.probe_count();

    let unchanged = pipeline.load_or_build(&mut store, "v", verify).unwrap();
    assert_eq!(unchanged.source, Source::Cached);
    assert_eq!(store.probe_count(), probes_after_build);

    store.remove("session:def");
    let rebuilt = pipeline.load_or_build(&mut store, "v", verify).unwrap();
    assert_eq!(rebuilt.source, Source::Built);
    assert_eq!(rebuilt.root.leaf_count(), 5);
}

#[test]
fn test_corrupt_snapshot_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();

    let first = pipeline
        .load_or_build(&mut store, "c", PipelineOptions::default())
        .unwrap();

    let path = pipeline.cache().path_for("c").unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&path, bytes).unwrap();

    let second = pipeline
        .load_or_build(&mut store, "c", PipelineOptions::default())
        .unwrap();
    assert_eq!(second.source, Source::Built);
    assert_eq!(second.root, first.root);

    // The rebuilt snapshot is readable again.
    assert!(pipeline.cache().load("c").unwrap().is_some());
}

#[test]
fn test_store_outage_is_fatal_without_snapshot() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();
    store.set_unavailable(true);

    let err = pipeline
        .load_or_build(&mut store, "down", PipelineOptions::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Enumerate(_)));
    assert!(pipeline.cache().load("down").unwrap().is_none());
}

#[test]
fn test_probe_failure_saves_nothing() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = keyspace();
    store.fail_on("user:2:profile");

    let err = pipeline
        .load_or_build(&mut store, "partial", PipelineOptions::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Aggregation(_)));
    assert!(!pipeline.cache().path_for("partial").unwrap().exists());
}

#[test]
fn test_snapshot_meta_fingerprint() {
    let keys = vec!["b".to_string(), "a".to_string()];
    let meta = SnapshotMeta::for_keys("n", &keys);
    let same = SnapshotMeta::for_keys("n", &["a".to_string(), "b".to_string()]);
    assert_eq!(meta.fingerprint, same.fingerprint);
    assert_eq!(meta.key_count, 2);
}

#[test]
fn test_key_count_includes_shadowed_keys() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline(&tmp);
    let mut store = MemoryStore::with_sizes([("a:b", 5), ("a:b:c", 7), ("z", 1)]);

    let outcome = pipeline
        .load_or_build(&mut store, "shadow", PipelineOptions::default())
        .unwrap();

    // "a:b" is the parent of "a:b:c", so only two leaves are counted.
    assert_eq!(outcome.meta.key_count, 3);
    assert_eq!(outcome.root.leaf_count(), 2);
    assert_eq!(outcome.root.size_bytes(), 8);

    let cached = pipeline.cache().load("shadow").unwrap().unwrap();
    assert_eq!(cached.meta.key_count, 3);
}
