//! Atomic file replacement.
//!
//! Content is written to a temporary file in the target's directory, flushed to disk,
//! and then renamed over the target. Readers see either the old file or the new one,
//! never a truncated mix. A `StagedWrite` that is dropped without `commit` deletes its
//! temporary file and leaves the target untouched.

use crate::{Error, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Fully written temporary content waiting to be renamed over its target.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// The file that `commit` will replace.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Location of the temporary file holding the staged content.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Renames the staged content over the target.
    pub fn commit(self) -> Result<()> {
        self.temp
            .persist(&self.target)
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Writes `bytes` into a temporary sibling of `target` without replacing it yet.
pub fn stage_bytes(target: &Path, bytes: &[u8]) -> Result<StagedWrite> {
    let dir = target.parent().ok_or_else(|| {
        Error::Io(std::io::Error::other(format!(
            "{} has no parent directory",
            target.display()
        )))
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(".babble-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;

    Ok(StagedWrite {
        temp,
        target: target.to_path_buf(),
    })
}

/// Serializes `value` as pretty JSON into a staged write for `target`.
pub fn stage_json<T: Serialize + ?Sized>(target: &Path, value: &T) -> Result<StagedWrite> {
    let json = serde_json::to_vec_pretty(value)?;
    stage_bytes(target, &json)
}

/// Atomically replaces `target` with `bytes`.
pub fn write_bytes(target: &Path, bytes: &[u8]) -> Result<()> {
    stage_bytes(target, bytes)?.commit()
}

/// Atomically replaces `target` with `value` as pretty JSON.
pub fn write_json<T: Serialize + ?Sized>(target: &Path, value: &T) -> Result<()> {
    stage_json(target, value)?.commit()
}
