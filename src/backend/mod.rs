//!
//! Defines the storage backend trait and implementations.
//!
//! The `Backend` trait defines the interface for loading and saving whole databases.
//! This allows the engine (`Engine`) to be independent of the specific storage mechanism.

use crate::Result;
use crate::data::Document;

pub mod atomic;
mod file;
mod in_memory;

pub use file::FileBackend;
pub use in_memory::InMemoryBackend;

/// Backend trait abstracting the underlying storage mechanism for Babble databases.
///
/// A backend stores one `Document` per uid and always reads and writes it whole. All
/// methods are synchronous; the engine calls them from tokio's blocking pool.
///
/// All backend implementations must be `Send` and `Sync` so one instance can be
/// shared between the engine and the backup scheduler.
pub trait Backend: Send + Sync {
    /// Loads the database stored under `uid`.
    ///
    /// # Errors
    /// `Error::Io` if the database does not exist or cannot be read, and
    /// `Error::Serialize` if its content is not a JSON object.
    fn load(&self, uid: &str) -> Result<Document>;

    /// Replaces the stored database for `uid` with `document`.
    ///
    /// Implementations must never leave a partially written database behind.
    fn save(&self, uid: &str, document: &Document) -> Result<()>;

    /// Creates an empty database for `uid`, overwriting any existing one.
    fn create(&self, uid: &str) -> Result<()>;

    /// Deletes the database for `uid`.
    ///
    /// # Returns
    /// `Ok(true)` if a database was removed, `Ok(false)` if none existed.
    fn destroy(&self, uid: &str) -> Result<bool>;

    /// Lists the uids of all stored databases, sorted.
    fn list_uids(&self) -> Result<Vec<String>>;
}
