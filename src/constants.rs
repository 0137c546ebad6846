//! Constants used throughout the Babble library.
//!
//! This module provides central definitions for directory names, file names, and the
//! default timing parameters of the cache and the backup scheduler.

use std::time::Duration;

/// How long a cached database snapshot stays valid for reads.
pub const CACHE_TTL: Duration = Duration::from_millis(60_000);

/// How often the backup scheduler takes snapshots.
pub const BACKUP_INTERVAL: Duration = Duration::from_secs(60);

/// Snapshots older than this are purged on each backup tick.
pub const BACKUP_RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// bcrypt cost factor for stored password hashes.
pub const BCRYPT_COST: u32 = 12;

/// Modulus size of the server's RSA key pair.
pub const RSA_KEY_BITS: usize = 2048;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 6363;

/// Longest uid accepted, a common file name limit.
pub const MAX_UID_LEN: usize = 255;

/// Directory (under the root) holding `<uid>.json` databases.
pub const DATA_DIR: &str = "data";

/// Directory (under the root) holding the RSA key pair.
pub const KEYS_DIR: &str = "auth/keys";

/// Directory (under the root) holding `<uid>.hash` password records.
pub const PASSWORDS_DIR: &str = "auth/pass";

/// Directory (under the root) holding one snapshot directory per uid.
pub const BACKUPS_DIR: &str = "backups";

pub const PUBLIC_KEY_FILE: &str = "public.pem";
pub const PRIVATE_KEY_FILE: &str = "private.pem";

/// Extension of database and snapshot files.
pub const JSON_EXT: &str = "json";

/// Extension of password hash files.
pub const HASH_EXT: &str = "hash";

/// Header carrying the encrypted password on gated requests.
pub const PASSWORD_HEADER: &str = "x-babble-password";
