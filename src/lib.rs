//!
//! Babble: a file-backed, path-addressable JSON document store.
//! This library provides the document engine and the HTTP surface built on top of it.
//!
//! ## Core Concepts
//!
//! * **Databases**: independent JSON documents, each identified by a caller-chosen `uid`
//!   and persisted as `<uid>.json`.
//! * **Paths (`path`)**: slash-delimited addresses of nodes inside a database, e.g. `users/alice/age`.
//! * **Documents (`data::Document`)**: the in-memory tree of one database with get/set/delete by path.
//! * **Backends (`backend::Backend`)**: a pluggable storage layer. `FileBackend` writes each
//!   database with an atomic replace, `InMemoryBackend` keeps everything in memory.
//! * **Engine (`engine::Engine`)**: the CRUD API. Reads go through a TTL cache, writes go
//!   through the backend and refresh the cache. Mutations of one uid are serialised.
//! * **Backups (`backup::BackupScheduler`)**: periodic timestamped snapshots with retention.
//! * **Auth (`auth`)**: RSA-OAEP transport encryption of passwords, bcrypt storage, and
//!   the per-request verification gate.
//! * **Server (`server`)**: the axum router exposing all of the above.

pub mod auth;
pub mod backend;
pub mod backup;
pub mod cache;
pub mod config;
pub mod constants;
pub mod data;
pub mod engine;
pub mod path;
pub mod server;

/// Re-export the `Engine` struct for easier access.
pub use engine::Engine;

/// Result type used throughout the Babble library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Babble library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt JSON on disk, or a value that failed to serialize.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The uid cannot be used as a database name.
    #[error("Invalid uid: {0}")]
    InvalidUid(String),

    /// An encrypted password could not be decoded or decrypted.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// The database is password protected and no credential was supplied.
    #[error("Authorization required for database '{0}'")]
    AuthRequired(String),

    /// The supplied credential does not match the stored hash.
    #[error("Authorization denied for database '{0}'")]
    AuthDenied(String),

    /// Public or private key parsing or encoding failed
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<bcrypt::BcryptError> for Error {
    fn from(err: bcrypt::BcryptError) -> Self {
        Error::PasswordHash(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

/// Checks that a uid can safely be used as a file name.
///
/// A uid becomes `<uid>.json`, `<uid>.hash` and a backup directory, so anything that
/// could escape the configured directories is rejected.
pub fn validate_uid(uid: &str) -> Result<()> {
    if uid.is_empty() {
        return Err(Error::InvalidUid("uid must not be empty".to_string()));
    }
    if uid.len() > constants::MAX_UID_LEN {
        return Err(Error::InvalidUid(format!(
            "uid is longer than {} bytes",
            constants::MAX_UID_LEN
        )));
    }
    if uid == "." || uid == ".." {
        return Err(Error::InvalidUid(format!("'{uid}' is reserved")));
    }
    if uid.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidUid(format!(
            "'{uid}' contains a path separator or NUL"
        )));
    }
    Ok(())
}
