//! Periodic snapshots of every database.
//!
//! Each tick walks all uids, drops snapshots older than the retention period and
//! writes a fresh one to `<backups>/<uid>/<timestamp>.json`. The timestamp is RFC 3339
//! in UTC with millisecond precision (`2026-10-16T08:30:00.000Z`), which is also how
//! expired snapshots are recognised. Files whose names do not parse are left alone.
//!
//! Snapshot directories left behind by destroyed databases are purged on the same
//! schedule. A failure while backing up one uid is logged and does not stop the others.

use crate::backend::atomic;
use crate::config::Config;
use crate::constants::{BACKUP_INTERVAL, BACKUP_RETENTION, JSON_EXT};
use crate::{Engine, Result, validate_uid};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// Taking snapshots.
    Running,
}

/// Outcome of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Snapshots written.
    pub written: usize,
    /// Expired snapshots deleted.
    pub purged: usize,
    /// Uids whose snapshot could not be written.
    pub failed: Vec<String>,
}

pub struct BackupScheduler {
    engine: Arc<Engine>,
    dir: PathBuf,
    interval: Duration,
    retention: Duration,
    running: AtomicBool,
}

impl BackupScheduler {
    /// Creates a scheduler writing into `dir` with the default interval and retention.
    pub fn new<P: Into<PathBuf>>(engine: Arc<Engine>, dir: P) -> Self {
        Self {
            engine,
            dir: dir.into(),
            interval: BACKUP_INTERVAL,
            retention: BACKUP_RETENTION,
            running: AtomicBool::new(false),
        }
    }

    pub fn from_config(engine: Arc<Engine>, config: &Config) -> Self {
        Self::new(engine, &config.backups_dir)
            .with_interval(config.backup_interval)
            .with_retention(config.backup_retention)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Directory holding the snapshots of `uid`.
    pub fn snapshot_dir(&self, uid: &str) -> Result<PathBuf> {
        validate_uid(uid)?;
        Ok(self.dir.join(uid))
    }

    /// Snapshot files of `uid`, oldest first. Empty if none were taken yet.
    pub fn list_snapshots(&self, uid: &str) -> Result<Vec<PathBuf>> {
        let dir = self.snapshot_dir(uid)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| snapshot_time(path).is_some())
            .collect();
        snapshots.sort();
        Ok(snapshots)
    }

    /// Runs one backup pass as of `now`.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        self.running.store(true, Ordering::SeqCst);
        let mut report = TickReport::default();

        let uids = self.engine.get_uids().await;
        for uid in &uids {
            match self.backup_one(uid, now).await {
                Ok(purged) => {
                    report.written += 1;
                    report.purged += purged;
                }
                Err(e) => {
                    error!(uid = %uid, error = %e, "Failed to back up database");
                    report.failed.push(uid.clone());
                }
            }
        }
        report.purged += self.purge_orphans(uids, now).await;

        self.running.store(false, Ordering::SeqCst);
        report
    }

    /// Starts ticking on a background task until `shutdown` changes or its sender is dropped.
    ///
    /// The first tick happens immediately.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?self.interval, dir = %self.dir.display(), "Backup scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_tick(Utc::now()).await;
                        debug!(?report, "Backup tick finished");
                    }
                    _ = shutdown.changed() => {
                        info!("Backup scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Purges and snapshots one uid. Returns how many snapshots were purged.
    async fn backup_one(&self, uid: &str, now: DateTime<Utc>) -> Result<usize> {
        let document = self.engine.fetch_all(uid).await?;
        let dir = self.snapshot_dir(uid)?;
        let retention = self.retention_delta();

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&dir)?;

            let purged = purge_expired(&dir, now, retention).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "Failed to clean up old backups");
                0
            });

            let target = dir.join(format!("{}.{JSON_EXT}", snapshot_name(now)));
            atomic::write_json(&target, &document)?;
            Ok::<_, crate::Error>(purged)
        })
        .await?
    }

    fn retention_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.retention).unwrap_or(TimeDelta::MAX)
    }

    /// Purges expired snapshots of uids that no longer have a database.
    ///
    /// `live` are the uids backed up this tick; their directories were already purged.
    async fn purge_orphans(&self, live: Vec<String>, now: DateTime<Utc>) -> usize {
        let dir = self.dir.clone();
        let retention = self.retention_delta();

        let swept = tokio::task::spawn_blocking(move || {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return 0,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to scan backup directory");
                    return 0;
                }
            };

            let mut purged = 0;
            for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
                let Some(uid) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if !path.is_dir() || live.iter().any(|l| l == uid) {
                    continue;
                }
                match purge_expired(&path, now, retention) {
                    Ok(n) => purged += n,
                    Err(e) => warn!(uid, error = %e, "Failed to clean up backups of removed database"),
                }
            }
            purged
        })
        .await;

        swept.unwrap_or_else(|e| {
            error!(error = %e, "Backup cleanup task failed");
            0
        })
    }
}

/// File stem used for a snapshot taken at `time`.
pub fn snapshot_name(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The instant encoded in a snapshot file name, if it is one.
fn snapshot_time(path: &Path) -> Option<DateTime<Utc>> {
    if path.extension()? != JSON_EXT {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    DateTime::parse_from_rfc3339(stem)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Deletes snapshots in `dir` older than `retention` relative to `now`.
fn purge_expired(dir: &Path, now: DateTime<Utc>, retention: TimeDelta) -> Result<usize> {
    let mut purged = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(taken) = snapshot_time(&path) else {
            continue;
        };
        if now.signed_duration_since(taken) <= retention {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => purged += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete expired backup"),
        }
    }
    Ok(purged)
}
