use crate::helpers::*;
use babble::backup::{BackupScheduler, SchedulerState, snapshot_name};
use chrono::{TimeDelta, Utc};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_tick_writes_snapshot_per_uid() {
    let (engine, _backend) = setup_memory_engine();
    let engine = Arc::new(engine);
    engine.add("k", json!("v"), "one").await.unwrap();
    engine.create_new("two").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let scheduler = BackupScheduler::new(Arc::clone(&engine), dir.path());

    let now = Utc::now();
    let report = scheduler.run_tick(now).await;
    assert_eq!(report.written, 2);
    assert!(report.failed.is_empty());
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    let snapshots = scheduler.list_snapshots("one").unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].ends_with(format!("one/{}.json", snapshot_name(now))));

    let content: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&snapshots[0]).unwrap()).unwrap();
    assert_eq!(content, json!({"k": "v"}));
}

#[tokio::test]
async fn test_tick_purges_expired_snapshots() {
    let (engine, _backend) = setup_memory_engine();
    let engine = Arc::new(engine);
    engine.add("k", json!(1), "db").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let scheduler = BackupScheduler::new(Arc::clone(&engine), dir.path())
        .with_retention(Duration::from_secs(3 * 24 * 60 * 60));

    let now = Utc::now();
    let uid_dir = scheduler.snapshot_dir("db").unwrap();
    fs::create_dir_all(&uid_dir).unwrap();
    let old = uid_dir.join(format!("{}.json", snapshot_name(now - TimeDelta::days(5))));
    let recent = uid_dir.join(format!("{}.json", snapshot_name(now - TimeDelta::days(1))));
    let unrelated = uid_dir.join("manual-copy.json");
    for path in [&old, &recent, &unrelated] {
        fs::write(path, "{}").unwrap();
    }

    let report = scheduler.run_tick(now).await;
    assert_eq!(report.written, 1);
    assert_eq!(report.purged, 1);

    assert!(!old.exists());
    assert!(recent.exists());
    assert!(unrelated.exists());
    assert_eq!(scheduler.list_snapshots("db").unwrap().len(), 2);
}

#[tokio::test]
async fn test_tick_isolates_failures() {
    let (engine, _backend) = setup_memory_engine();
    let engine = Arc::new(engine);
    for uid in ["a", "broken", "c"] {
        engine.create_new(uid).await.unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    // A plain file where the snapshot directory should go
    fs::write(dir.path().join("broken"), "in the way").unwrap();

    let scheduler = BackupScheduler::new(Arc::clone(&engine), dir.path());
    let report = scheduler.run_tick(Utc::now()).await;

    assert_eq!(report.written, 2);
    assert_eq!(report.failed, vec!["broken".to_string()]);
    assert_eq!(scheduler.list_snapshots("a").unwrap().len(), 1);
    assert_eq!(scheduler.list_snapshots("c").unwrap().len(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_list_snapshots_without_backups() {
    let (engine, _backend) = setup_memory_engine();
    let dir = tempfile::tempdir().unwrap();
    let scheduler = BackupScheduler::new(Arc::new(engine), dir.path());

    assert!(scheduler.list_snapshots("never").unwrap().is_empty());
    assert!(scheduler.list_snapshots("..").is_err());
}

#[tokio::test]
async fn test_spawned_scheduler_stops_on_shutdown() {
    let (engine, _backend) = setup_memory_engine();
    let engine = Arc::new(engine);
    engine.create_new("db").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let scheduler = Arc::new(
        BackupScheduler::new(Arc::clone(&engine), dir.path())
            .with_interval(Duration::from_millis(20)),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&scheduler).spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Scheduler did not stop")
        .expect("Scheduler task panicked");

    assert!(!scheduler.list_snapshots("db").unwrap().is_empty());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_tick_purges_snapshots_of_destroyed_database() {
    let (engine, _backend) = setup_memory_engine();
    let engine = Arc::new(engine);
    engine.create_new("gone").await.unwrap();
    engine.create_new("kept").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let scheduler = BackupScheduler::new(Arc::clone(&engine), dir.path());

    let now = Utc::now();
    let gone_dir = scheduler.snapshot_dir("gone").unwrap();
    fs::create_dir_all(&gone_dir).unwrap();
    let old = gone_dir.join(format!("{}.json", snapshot_name(now - TimeDelta::days(5))));
    let recent = gone_dir.join(format!("{}.json", snapshot_name(now - TimeDelta::days(1))));
    fs::write(&old, "{}").unwrap();
    fs::write(&recent, "{}").unwrap();

    assert!(engine.destroy("gone").await.unwrap());

    let report = scheduler.run_tick(now).await;
    assert_eq!(report.written, 1);
    assert_eq!(report.purged, 1);
    assert!(report.failed.is_empty());

    assert!(!old.exists(), "Expired snapshot of a destroyed database must be purged");
    assert!(recent.exists());
    // No new snapshot for a database that no longer exists
    assert_eq!(scheduler.list_snapshots("gone").unwrap(), vec![recent]);
}
