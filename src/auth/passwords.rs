//! Password records and the per-request verification gate.
//!
//! A database is protected once `<uid>.hash` exists in the passwords directory. The
//! file holds a bcrypt hash of the plaintext password, recovered from the encrypted
//! credential the client sent at registration.

use crate::auth::keys::KeyPair;
use crate::backend::atomic;
use crate::constants::HASH_EXT;
use crate::{Error, Result, validate_uid};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stores password hashes and checks credentials against them.
#[derive(Debug, Clone)]
pub struct PasswordStore {
    dir: PathBuf,
    keys: Arc<KeyPair>,
    cost: u32,
}

impl PasswordStore {
    /// Opens (and creates if needed) the password directory at `dir`.
    ///
    /// # Arguments
    /// * `keys` - Key pair used to decrypt incoming credentials.
    /// * `cost` - bcrypt cost factor for new hashes.
    pub fn new<P: Into<PathBuf>>(dir: P, keys: Arc<KeyPair>, cost: u32) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "Created password directory");
        }
        Ok(Self { dir, keys, cost })
    }

    pub fn keys(&self) -> &Arc<KeyPair> {
        &self.keys
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn hash_path(&self, uid: &str) -> Result<PathBuf> {
        validate_uid(uid)?;
        Ok(self.dir.join(format!("{uid}.{HASH_EXT}")))
    }

    /// Registers a password for `uid`, replacing any previous one.
    ///
    /// `encrypted` is the base64 RSA-OAEP ciphertext of the password. Decryption and
    /// hashing run on the blocking pool.
    ///
    /// # Errors
    /// `Error::Decryption` if the credential cannot be decrypted, `Error::Io` if the
    /// hash cannot be written.
    pub async fn store_password(&self, encrypted: &str, uid: &str) -> Result<()> {
        let path = self.hash_path(uid)?;
        let keys = Arc::clone(&self.keys);
        let encrypted = encrypted.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || {
            let password = keys.decrypt(&encrypted)?;
            let hash = bcrypt::hash(password, cost)?;
            atomic::write_bytes(&path, hash.as_bytes())
        })
        .await??;

        info!(uid, "Stored password");
        Ok(())
    }

    /// Returns true if `uid` has a stored password.
    pub async fn is_protected(&self, uid: &str) -> Result<bool> {
        let path = self.hash_path(uid)?;
        Ok(tokio::task::spawn_blocking(move || path.is_file()).await?)
    }

    /// The verification gate.
    ///
    /// Unprotected databases always pass. For a protected one the credential must be
    /// present, decrypt with the server key, and match the stored hash.
    ///
    /// # Errors
    /// * `Error::AuthRequired` - protected and `credential` is `None`.
    /// * `Error::Decryption` - the credential is malformed or encrypted for another key.
    /// * `Error::AuthDenied` - the password does not match.
    pub async fn verify(&self, uid: &str, credential: Option<&str>) -> Result<()> {
        let path = self.hash_path(uid)?;
        let keys = Arc::clone(&self.keys);
        let credential = credential.map(str::to_string);
        let owned_uid = uid.to_string();

        tokio::task::spawn_blocking(move || {
            let hash = match fs::read_to_string(&path) {
                Ok(hash) => hash,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(Error::Io(e)),
            };

            let Some(credential) = credential else {
                return Err(Error::AuthRequired(owned_uid));
            };
            let password = keys.decrypt(&credential)?;

            if bcrypt::verify(password, hash.trim())? {
                Ok(())
            } else {
                Err(Error::AuthDenied(owned_uid))
            }
        })
        .await?
        .inspect_err(|e| warn!(uid, error = %e, "Rejected credential"))
    }

    /// Deletes the password for `uid`. Returns true if one existed.
    pub async fn remove(&self, uid: &str) -> Result<bool> {
        let path = self.hash_path(uid)?;
        let removed = tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        })
        .await??;

        debug!(uid, removed, "Removed password");
        Ok(removed)
    }
}
