use babble::Error;
use babble::backend::{Backend, FileBackend, InMemoryBackend};
use babble::data::Document;
use serde_json::json;
use std::fs;

fn document(value: serde_json::Value) -> Document {
    Document::try_from(value).expect("Failed to build document")
}

#[test]
fn test_file_backend_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path().join("data")).unwrap();

    let doc = document(json!({"users": {"alice": {"age": 30}}}));
    backend.save("db", &doc).expect("Failed to save");

    let path = backend.database_path("db").unwrap();
    assert!(path.ends_with("data/db.json"));
    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"users": {"alice": {"age": 30}}}));

    let loaded = backend.load("db").unwrap();
    assert_eq!(loaded, doc);
}

#[test]
fn test_file_backend_load_missing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).unwrap();

    match backend.load("missing") {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("Expected NotFound I/O error, got {other:?}"),
    }
}

#[test]
fn test_file_backend_load_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).unwrap();
    fs::write(dir.path().join("bad.json"), "{ nope").unwrap();

    assert!(matches!(backend.load("bad"), Err(Error::Serialize(_))));
}

#[test]
fn test_file_backend_list_uids() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).unwrap();

    backend.create("zeta").unwrap();
    backend.create("alpha").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
    fs::write(dir.path().join(".babble-leftover.tmp"), "ignored").unwrap();
    fs::create_dir(dir.path().join("subdir.json")).unwrap();

    assert_eq!(backend.list_uids().unwrap(), vec!["alpha", "zeta"]);
}

#[test]
fn test_file_backend_destroy() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).unwrap();

    backend.create("db").unwrap();
    assert!(backend.destroy("db").unwrap());
    assert!(!backend.destroy("db").unwrap());
    assert!(backend.list_uids().unwrap().is_empty());
}

#[test]
fn test_file_backend_rejects_escaping_uid() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path().join("data")).unwrap();

    let result = backend.save("../outside", &Document::new());
    assert!(matches!(result, Err(Error::InvalidUid(_))));
    assert!(!dir.path().join("outside.json").exists());
}

#[test]
fn test_interrupted_save_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).unwrap();

    backend.save("db", &document(json!({"v": 1}))).unwrap();

    // Stage a new version but "crash" before the rename
    let staged = backend.stage_save("db", &document(json!({"v": 2}))).unwrap();
    let temp_path = staged.temp_path().to_path_buf();
    assert!(temp_path.exists());
    drop(staged);

    assert!(!temp_path.exists());
    assert_eq!(backend.load("db").unwrap().as_value(), &json!({"v": 1}));
    assert_eq!(backend.list_uids().unwrap(), vec!["db"]);
}

#[test]
fn test_in_memory_backend_basic_operations() {
    let backend = InMemoryBackend::new();

    backend.save("db", &document(json!({"a": 1}))).unwrap();
    assert_eq!(backend.load("db").unwrap().as_value(), &json!({"a": 1}));
    assert_eq!(backend.list_uids().unwrap(), vec!["db"]);

    assert!(backend.destroy("db").unwrap());
    assert!(backend.load("db").is_err());
}
