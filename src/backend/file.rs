use crate::backend::Backend;
use crate::backend::atomic::{self, StagedWrite};
use crate::constants::JSON_EXT;
use crate::data::Document;
use crate::{Result, validate_uid};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A backend storing each database as `<uid>.json` in one directory.
///
/// Every write goes through an atomic replace, so a crash mid-write leaves the previous
/// version of the file in place.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (and creates if needed) the data directory at `dir`.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "Created data directory");
        }
        Ok(Self { dir })
    }

    /// The directory holding the database files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `uid`.
    pub fn database_path(&self, uid: &str) -> Result<PathBuf> {
        validate_uid(uid)?;
        Ok(self.dir.join(format!("{uid}.{JSON_EXT}")))
    }

    /// Writes `document` next to the database file without replacing it yet.
    ///
    /// `save` is `stage_save` followed by `StagedWrite::commit`.
    pub fn stage_save(&self, uid: &str, document: &Document) -> Result<StagedWrite> {
        atomic::stage_json(&self.database_path(uid)?, document)
    }
}

impl Backend for FileBackend {
    fn load(&self, uid: &str) -> Result<Document> {
        let path = self.database_path(uid)?;
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, uid: &str, document: &Document) -> Result<()> {
        self.stage_save(uid, document)?.commit()?;
        debug!(uid, "Saved database");
        Ok(())
    }

    fn create(&self, uid: &str) -> Result<()> {
        self.save(uid, &Document::new())
    }

    fn destroy(&self, uid: &str) -> Result<bool> {
        match fs::remove_file(self.database_path(uid)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_uids(&self) -> Result<Vec<String>> {
        let mut uids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != JSON_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_uid(stem).is_ok() {
                    uids.push(stem.to_string());
                }
            }
        }
        uids.sort();
        Ok(uids)
    }
}
