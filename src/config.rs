//! Runtime configuration.
//!
//! Every directory is derived from a single root (the current directory by default)
//! unless overridden, giving the layout:
//!
//! ```text
//! <root>/data/<uid>.json
//! <root>/auth/keys/{public,private}.pem
//! <root>/auth/pass/<uid>.hash
//! <root>/backups/<uid>/<timestamp>.json
//! ```

use crate::constants;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub keys_dir: PathBuf,
    pub passwords_dir: PathBuf,
    pub backups_dir: PathBuf,
    /// Freshness window of cached databases.
    pub cache_ttl: Duration,
    pub backup_interval: Duration,
    pub backup_retention: Duration,
    pub bcrypt_cost: u32,
    pub rsa_key_bits: usize,
    /// Reuse an existing key pair instead of generating a new one at startup.
    pub keep_keys: bool,
    pub listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Config {
    /// Default configuration with every directory placed under `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join(constants::DATA_DIR),
            keys_dir: root.join(constants::KEYS_DIR),
            passwords_dir: root.join(constants::PASSWORDS_DIR),
            backups_dir: root.join(constants::BACKUPS_DIR),
            cache_ttl: constants::CACHE_TTL,
            backup_interval: constants::BACKUP_INTERVAL,
            backup_retention: constants::BACKUP_RETENTION,
            bcrypt_cost: constants::BCRYPT_COST,
            rsa_key_bits: constants::RSA_KEY_BITS,
            keep_keys: false,
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, constants::DEFAULT_PORT)),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    pub fn with_backup_retention(mut self, retention: Duration) -> Self {
        self.backup_retention = retention;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_keep_keys(mut self, keep: bool) -> Self {
        self.keep_keys = keep;
        self
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }
}
