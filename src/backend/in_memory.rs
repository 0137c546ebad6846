use crate::backend::Backend;
use crate::data::Document;
use crate::{Error, Result, validate_uid};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A simple in-memory backend implementation using a `HashMap` for storage.
///
/// This backend is suitable for testing and development, where data
/// persistence is not required.
///
/// Databases are kept as serialized JSON text, so loading still parses and can fail
/// exactly like the file backend does when a database is corrupt.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    databases: RwLock<HashMap<String, String>>,
    /// When set, every `save` and `create` fails with an I/O error.
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    /// Creates a new, empty `InMemoryBackend`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text for `uid` without validating it, e.g. to simulate a corrupt database.
    pub fn insert_raw<S: Into<String>>(&self, uid: &str, raw: S) -> Result<()> {
        self.write_guard()?.insert(uid.to_string(), raw.into());
        Ok(())
    }

    /// Makes every subsequent write fail (or succeed again) to simulate a full disk.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("simulated write failure")));
        }
        Ok(())
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, HashMap<String, String>>> {
        self.databases
            .read()
            .map_err(|_| Error::Io(std::io::Error::other("Failed to lock backend")))
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, String>>> {
        self.databases
            .write()
            .map_err(|_| Error::Io(std::io::Error::other("Failed to lock backend")))
    }
}

impl Backend for InMemoryBackend {
    fn load(&self, uid: &str) -> Result<Document> {
        validate_uid(uid)?;
        let databases = self.read_guard()?;
        let raw = databases.get(uid).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database '{uid}' does not exist"),
            ))
        })?;
        Ok(serde_json::from_str(raw)?)
    }

    fn save(&self, uid: &str, document: &Document) -> Result<()> {
        validate_uid(uid)?;
        self.check_writable()?;
        let json = serde_json::to_string_pretty(document)?;
        self.write_guard()?.insert(uid.to_string(), json);
        Ok(())
    }

    fn create(&self, uid: &str) -> Result<()> {
        self.save(uid, &Document::new())
    }

    fn destroy(&self, uid: &str) -> Result<bool> {
        validate_uid(uid)?;
        Ok(self.write_guard()?.remove(uid).is_some())
    }

    fn list_uids(&self) -> Result<Vec<String>> {
        let mut uids: Vec<String> = self.read_guard()?.keys().cloned().collect();
        uids.sort();
        Ok(uids)
    }
}
