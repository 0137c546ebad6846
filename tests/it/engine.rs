use crate::helpers::*;
use babble::backend::{Backend, InMemoryBackend};
use babble::data::Document;
use babble::{Engine, Error, Result};
use serde_json::json;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// An in-memory backend whose first `load` blocks until released
struct SlowFirstLoad {
    inner: InMemoryBackend,
    entered: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Backend for SlowFirstLoad {
    fn load(&self, uid: &str) -> Result<Document> {
        let release = self.release.lock().unwrap().take();
        if let Some(release) = release {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                let _ = entered.send(());
            }
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        self.inner.load(uid)
    }

    fn save(&self, uid: &str, document: &Document) -> Result<()> {
        self.inner.save(uid, document)
    }

    fn create(&self, uid: &str) -> Result<()> {
        self.inner.create(uid)
    }

    fn destroy(&self, uid: &str) -> Result<bool> {
        self.inner.destroy(uid)
    }

    fn list_uids(&self) -> Result<Vec<String>> {
        self.inner.list_uids()
    }
}

/// Creates an engine over a SlowFirstLoad backend holding `{"v": 0}` under "db"
fn setup_slow_engine() -> (
    Arc<Engine>,
    Arc<SlowFirstLoad>,
    oneshot::Receiver<()>,
    mpsc::Sender<()>,
) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = Arc::new(SlowFirstLoad {
        inner: InMemoryBackend::new(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    });
    backend
        .inner
        .insert_raw("db", r#"{"v": 0}"#)
        .expect("Failed to seed backend");
    let engine = Arc::new(Engine::new(backend.clone()));
    (engine, backend, entered_rx, release_tx)
}

#[tokio::test]
async fn test_add_then_fetch() {
    let (engine, _backend) = setup_memory_engine();

    let written = engine
        .add("users/alice", json!({"age": 30}), "db")
        .await
        .expect("Failed to add document");
    assert_eq!(written, json!({"age": 30}));

    let fetched = engine.fetch("users/alice", "db").await.unwrap();
    assert_eq!(fetched, Some(json!({"age": 30})));

    let age = engine.fetch("users/alice/age", "db").await.unwrap();
    assert_eq!(age, Some(json!(30)));
}

#[tokio::test]
async fn test_path_normalisation() {
    let (engine, _backend) = setup_memory_engine();

    engine.add("/a//b/", json!(1), "db").await.unwrap();
    assert_eq!(engine.fetch("a/b", "db").await.unwrap(), Some(json!(1)));
    assert_eq!(engine.fetch("a/b/", "db").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_fetch_missing() {
    let (engine, _backend) = setup_memory_engine();

    assert_eq!(engine.fetch("nothing/here", "db").await.unwrap(), None);
    // The root of a missing database is an empty object
    assert_eq!(engine.fetch("", "db").await.unwrap(), Some(json!({})));
}

#[tokio::test]
async fn test_add_replaces_scalar_parent() {
    let (engine, _backend) = setup_memory_engine();

    engine.add("a", json!("scalar"), "db").await.unwrap();
    engine.add("a/b", json!(true), "db").await.unwrap();
    assert_eq!(engine.fetch("a", "db").await.unwrap(), Some(json!({"b": true})));
}

#[tokio::test]
async fn test_add_scalar_at_root_is_rejected() {
    let (engine, _backend) = setup_memory_engine();

    let result = engine.add("", json!(5), "db").await;
    assert!(matches!(result, Err(Error::InvalidOperation(_))));

    engine.add("", json!({"x": 1}), "db").await.unwrap();
    assert_eq!(engine.fetch("x", "db").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_modify_shallow_merge() {
    let (engine, _backend) = setup_memory_engine();

    engine
        .add("p", json!({"a": 1, "nested": {"x": 1, "y": 2}}), "db")
        .await
        .unwrap();
    let merged = engine
        .modify("p", json!({"b": 2, "nested": {"z": 3}}), "db")
        .await
        .unwrap();

    // Top-level keys merge, nested objects are replaced wholesale
    let expected = json!({"a": 1, "b": 2, "nested": {"z": 3}});
    assert_eq!(merged, expected);
    assert_eq!(engine.fetch("p", "db").await.unwrap(), Some(expected));
}

#[tokio::test]
async fn test_modify_non_object_replaces() {
    let (engine, _backend) = setup_memory_engine();

    engine.add("counter", json!(1), "db").await.unwrap();
    engine.modify("counter", json!({"v": 2}), "db").await.unwrap();
    assert_eq!(
        engine.fetch("counter", "db").await.unwrap(),
        Some(json!({"v": 2}))
    );

    // Modifying an absent path behaves like add
    engine.modify("fresh", json!([1, 2]), "db").await.unwrap();
    assert_eq!(engine.fetch("fresh", "db").await.unwrap(), Some(json!([1, 2])));
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let (engine, _backend) = setup_memory_engine();

    engine.add("a/b", json!(1), "db").await.unwrap();
    engine.add("a/c", json!(2), "db").await.unwrap();

    engine.remove("a/b", "db").await.expect("Failed to remove");
    engine.remove("a/b", "db").await.expect("Second remove must succeed");
    engine.remove("x/y/z", "db").await.expect("Removing an absent path must succeed");

    assert_eq!(engine.fetch("a/b", "db").await.unwrap(), None);
    assert_eq!(engine.fetch("a", "db").await.unwrap(), Some(json!({"c": 2})));
}

#[tokio::test]
async fn test_get_all_key_paths() {
    let (engine, _backend) = setup_memory_engine();

    engine
        .add("", json!({"z": 2, "x": {"y": 1, "list": [{"deep": 1}]}}), "db")
        .await
        .unwrap();

    let paths = engine.get_all_key_paths("db").await.unwrap();
    assert_eq!(paths, vec!["x", "x/list", "x/y", "z"]);

    let empty = engine.get_all_key_paths("other").await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_create_new_and_get_uids() {
    let (engine, _backend) = setup_memory_engine();

    assert!(engine.get_uids().await.is_empty());

    let uid = engine.create_new("beta").await.unwrap();
    assert_eq!(uid, "beta");
    engine.add("k", json!("v"), "alpha").await.unwrap();

    assert_eq!(engine.get_uids().await, vec!["alpha", "beta"]);
    assert!(engine.fetch_all("beta").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_new_resets_existing() {
    let (engine, _backend) = setup_memory_engine();

    engine.add("k", json!("v"), "db").await.unwrap();
    engine.create_new("db").await.unwrap();
    assert_eq!(engine.fetch("k", "db").await.unwrap(), None);
}

#[tokio::test]
async fn test_destroy() {
    let (engine, backend) = setup_memory_engine();

    engine.add("k", json!("v"), "db").await.unwrap();
    assert!(engine.destroy("db").await.unwrap());
    assert!(!engine.destroy("db").await.unwrap());

    assert!(backend.list_uids().unwrap().is_empty());
    assert!(engine.cache().get("db").is_none());
    assert_eq!(engine.fetch("k", "db").await.unwrap(), None);
}

#[tokio::test]
async fn test_invalid_uid_rejected() {
    let (engine, _backend) = setup_memory_engine();

    for uid in ["", "..", "a/b"] {
        assert!(
            matches!(engine.fetch("k", uid).await, Err(Error::InvalidUid(_))),
            "uid {uid:?} should be rejected"
        );
        assert!(matches!(
            engine.add("k", json!(1), uid).await,
            Err(Error::InvalidUid(_))
        ));
    }
}

#[tokio::test]
async fn test_corrupt_database_reads_as_empty() {
    let (engine, backend) = setup_memory_engine();

    backend.insert_raw("db", "{ not json").unwrap();
    assert_eq!(engine.fetch("", "db").await.unwrap(), Some(json!({})));

    // The next write replaces the corrupt content
    engine.add("k", json!(1), "db").await.unwrap();
    assert_eq!(backend.load("db").unwrap().as_value(), &json!({"k": 1}));
}

#[tokio::test]
async fn test_failed_save_keeps_previous_state() {
    let (engine, backend) = setup_memory_engine();

    engine.add("k", json!("old"), "db").await.unwrap();
    backend.fail_writes(true);

    let result = engine.add("k", json!("new"), "db").await;
    assert!(matches!(result, Err(Error::Io(_))));

    let result = engine.create_new("db").await;
    assert!(matches!(result, Err(Error::Io(_))));

    assert_eq!(engine.fetch("k", "db").await.unwrap(), Some(json!("old")));
    assert_eq!(backend.load("db").unwrap().as_value(), &json!({"k": "old"}));
}

#[tokio::test(start_paused = true)]
async fn test_cache_serves_reads_within_ttl() {
    let (engine, backend) = setup_memory_engine();
    let engine = engine.with_cache_ttl(Duration::from_secs(60));

    engine.add("k", json!("cached"), "db").await.unwrap();

    // Someone edits the stored database behind the engine's back
    backend.insert_raw("db", r#"{"k": "external"}"#).unwrap();

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(engine.fetch("k", "db").await.unwrap(), Some(json!("cached")));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(
        engine.fetch("k", "db").await.unwrap(),
        Some(json!("external"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_modify_keeps_both_patches() {
    let (engine, _backend) = setup_memory_engine();
    let engine = Arc::new(engine);
    engine.add("p", json!({}), "db").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        let mut patch = serde_json::Map::new();
        patch.insert(format!("k{i}"), json!(i));
        handles.push(tokio::spawn(async move {
            engine
                .modify("p", serde_json::Value::Object(patch), "db")
                .await
                .expect("Failed to modify")
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let merged = engine.fetch("p", "db").await.unwrap().unwrap();
    assert_eq!(merged.as_object().unwrap().len(), 16);
}

#[tokio::test]
async fn test_file_engine_persists_across_instances() {
    let (engine, dir) = setup_file_engine();

    engine.add("users/bob", json!({"n": 1}), "db").await.unwrap();
    drop(engine);

    let reopened = Engine::open(&babble::config::Config::new(dir.path())).unwrap();
    assert_eq!(
        reopened.fetch("users/bob/n", "db").await.unwrap(),
        Some(json!(1))
    );
    assert_eq!(reopened.get_uids().await, vec!["db"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_read_does_not_lose_concurrent_write() {
    let (engine, backend, entered, release) = setup_slow_engine();

    let reader = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.fetch("", "db").await })
    };
    entered.await.expect("Load never started");

    let writer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.add("a", json!(1), "db").await })
    };
    // Let the writer run while the load is stuck
    tokio::time::sleep(Duration::from_millis(100)).await;
    release.send(()).expect("Failed to release load");

    reader.await.unwrap().expect("Failed to fetch");
    writer.await.unwrap().expect("Failed to add");
    engine.add("b", json!(2), "db").await.unwrap();

    let expected = json!({"v": 0, "a": 1, "b": 2});
    assert_eq!(backend.inner.load("db").unwrap().as_value(), &expected);
    assert_eq!(engine.fetch("", "db").await.unwrap(), Some(expected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_read_does_not_revive_destroyed_database() {
    let (engine, backend, entered, release) = setup_slow_engine();

    let reader = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.fetch_all("db").await })
    };
    entered.await.expect("Load never started");

    let destroyer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.destroy("db").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    release.send(()).expect("Failed to release load");

    reader.await.unwrap().expect("Failed to fetch");
    assert!(destroyer.await.unwrap().expect("Failed to destroy"));

    assert!(backend.list_uids().unwrap().is_empty());
    assert_eq!(engine.fetch("v", "db").await.unwrap(), None);
}
