//!
//! Provides the main database structure (`Engine`).
//!
//! `Engine` manages every database (uid) of one data store. It reads through a
//! `TreeCache` and writes through a `Backend`, and it serialises the
//! read-modify-write cycle of each uid so concurrent writers never lose updates.

use crate::backend::{Backend, FileBackend};
use crate::cache::TreeCache;
use crate::config::Config;
use crate::constants;
use crate::data::{Document, shallow_merge};
use crate::path::to_segments;
use crate::{Error, Result, validate_uid};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, warn};

/// The document engine.
///
/// Every operation takes the uid of the database it applies to. Paths are
/// slash-delimited (`"users/alice"`); the empty path is the database root.
///
/// Reads are served from the cache while it is fresh and reload from the backend
/// afterwards. A database that cannot be read (missing or corrupt) behaves as an empty
/// one. Writes are durable once the call returns `Ok`.
pub struct Engine {
    /// The backend used by the engine.
    backend: Arc<dyn Backend>,
    cache: TreeCache,
    locks: UidLocks,
}

impl Engine {
    /// Creates an engine over `backend` with the default cache TTL.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            cache: TreeCache::new(constants::CACHE_TTL),
            locks: UidLocks::default(),
        }
    }

    /// Opens a file-backed engine as described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let backend = FileBackend::new(&config.data_dir)?;
        Ok(Self::new(Arc::new(backend)).with_cache_ttl(config.cache_ttl))
    }

    /// Replaces the cache, dropping any cached snapshots.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = TreeCache::new(ttl);
        self
    }

    /// Get a reference to the backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn cache(&self) -> &TreeCache {
        &self.cache
    }

    /// Stores `document` at `path`, creating intermediate objects as needed.
    ///
    /// # Returns
    /// The written document.
    pub async fn add(&self, path: &str, document: Value, uid: &str) -> Result<Value> {
        validate_uid(uid)?;
        let segments = to_segments(path);
        let _guard = self.locks.acquire(uid).await;

        let mut tree = self.read_through(uid).await?;
        tree.set(&segments, document.clone())?;
        self.write_through(uid, tree).await?;

        debug!(uid, path, "Added document");
        Ok(document)
    }

    /// Returns the value at `path`, or `None` if nothing is stored there.
    pub async fn fetch(&self, path: &str, uid: &str) -> Result<Option<Value>> {
        validate_uid(uid)?;
        let tree = self.read(uid).await?;
        Ok(tree.get(&to_segments(path)).cloned())
    }

    /// Applies `patch` to the value at `path`.
    ///
    /// If the current value is an object, the patch is shallow-merged over it (patch
    /// keys win, nested objects are replaced wholesale). Otherwise the patch replaces the
    /// value.
    ///
    /// # Returns
    /// The value actually written.
    pub async fn modify(&self, path: &str, patch: Value, uid: &str) -> Result<Value> {
        validate_uid(uid)?;
        let segments = to_segments(path);
        let _guard = self.locks.acquire(uid).await;

        let mut tree = self.read_through(uid).await?;
        let merged = shallow_merge(tree.get(&segments), patch);
        tree.set(&segments, merged.clone())?;
        self.write_through(uid, tree).await?;

        debug!(uid, path, "Modified document");
        Ok(merged)
    }

    /// Deletes the value at `path`.
    ///
    /// Removing an absent path is not an error. The database is written back either way.
    pub async fn remove(&self, path: &str, uid: &str) -> Result<()> {
        validate_uid(uid)?;
        let segments = to_segments(path);
        let _guard = self.locks.acquire(uid).await;

        let mut tree = self.read_through(uid).await?;
        let removed = tree.delete(&segments);
        self.write_through(uid, tree).await?;

        debug!(uid, path, removed, "Removed document");
        Ok(())
    }

    /// Every key path in the database, parents before children, siblings in key order.
    pub async fn get_all_key_paths(&self, uid: &str) -> Result<Vec<String>> {
        validate_uid(uid)?;
        Ok(self.read(uid).await?.key_paths())
    }

    /// Lists every database known to the backend.
    ///
    /// A backend failure is logged and yields an empty list.
    pub async fn get_uids(&self) -> Vec<String> {
        match self.blocking(|backend| backend.list_uids()).await {
            Ok(uids) => uids,
            Err(e) => {
                error!(error = %e, "Failed to list databases");
                Vec::new()
            }
        }
    }

    /// Creates an empty database for `uid`, replacing any existing content.
    ///
    /// # Returns
    /// The uid.
    pub async fn create_new(&self, uid: &str) -> Result<String> {
        validate_uid(uid)?;
        let _guard = self.locks.acquire(uid).await;

        let owned = uid.to_string();
        if let Err(e) = self.blocking(move |backend| backend.create(&owned)).await {
            error!(uid, error = %e, "Failed to create database");
            return Err(e);
        }
        self.cache.insert(uid, Document::new());

        debug!(uid, "Created database");
        Ok(uid.to_string())
    }

    /// Returns the whole database.
    pub async fn fetch_all(&self, uid: &str) -> Result<Document> {
        validate_uid(uid)?;
        self.read(uid).await
    }

    /// Deletes the database for `uid` and forgets its cached snapshot.
    ///
    /// # Returns
    /// `true` if the database existed.
    pub async fn destroy(&self, uid: &str) -> Result<bool> {
        validate_uid(uid)?;
        let _guard = self.locks.acquire(uid).await;

        let owned = uid.to_string();
        let existed = self
            .blocking(move |backend| backend.destroy(&owned))
            .await
            .inspect_err(|e| error!(uid, error = %e, "Failed to destroy database"))?;
        self.cache.invalidate(uid);

        debug!(uid, existed, "Destroyed database");
        Ok(existed)
    }

    /// Read path for callers that do not hold the uid lock.
    ///
    /// A fresh cache entry is returned directly. On a miss the load runs under the uid
    /// lock, so it can never overwrite a tree a writer cached while the load was running.
    async fn read(&self, uid: &str) -> Result<Document> {
        if let Some(tree) = self.cache.get(uid) {
            return Ok(tree);
        }
        let _guard = self.locks.acquire(uid).await;
        self.read_through(uid).await
    }

    /// Returns the cached document for `uid`, loading it from the backend when the cache
    /// has nothing fresh. The caller must hold the uid lock.
    ///
    /// A load failure is logged and cached as an empty document, so a missing or corrupt
    /// database reads as `{}` until it is written.
    async fn read_through(&self, uid: &str) -> Result<Document> {
        if let Some(tree) = self.cache.get(uid) {
            return Ok(tree);
        }

        let owned = uid.to_string();
        let tree = match self.blocking(move |backend| backend.load(&owned)).await {
            Ok(tree) => tree,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(uid, "Database does not exist yet, starting empty");
                Document::new()
            }
            Err(e) => {
                warn!(uid, error = %e, "Failed to read database, treating it as empty");
                Document::new()
            }
        };
        self.cache.insert(uid, tree.clone());
        Ok(tree)
    }

    /// Saves `tree` and, only if that succeeds, makes it the cached snapshot.
    async fn write_through(&self, uid: &str, tree: Document) -> Result<()> {
        let owned = uid.to_string();
        let saved = self
            .blocking(move |backend| backend.save(&owned, &tree).map(|()| tree))
            .await;
        match saved {
            Ok(tree) => {
                self.cache.insert(uid, tree);
                Ok(())
            }
            Err(e) => {
                error!(uid, error = %e, "Failed to write database");
                Err(e)
            }
        }
    }

    /// Runs a backend call on tokio's blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Backend) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref())).await?
    }
}

/// One async mutex per uid, created on first use.
#[derive(Default)]
struct UidLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UidLocks {
    async fn acquire(&self, uid: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(uid.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
