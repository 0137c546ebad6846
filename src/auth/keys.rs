//! The server's RSA key pair.
//!
//! The pair lives in memory for the lifetime of the process and is mirrored to
//! `public.pem` / `private.pem` in the keys directory. By default a fresh pair is
//! generated at every start and overwrites the previous files; `provision` with
//! `keep = true` reuses a readable pair from disk instead.

use crate::auth::crypto::{
    decrypt_password, format_private_key, format_public_key, generate_keypair,
    parse_private_key,
};
use crate::backend::atomic;
use crate::constants::{PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
use crate::Result;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    public_pem: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_pem", &self.public_pem)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a new key pair with a modulus of `bits` bits.
    pub fn generate(bits: usize) -> Result<Self> {
        let (private_key, _) = generate_keypair(bits)?;
        Self::from_private_key(private_key)
    }

    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        let public_pem = format_public_key(&public_key)?;
        Ok(Self {
            private_key,
            public_key,
            public_pem,
        })
    }

    /// The public key as SPKI PEM, safe to hand to any client.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Decrypts a base64 credential encrypted against this pair's public key.
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        decrypt_password(encrypted, &self.private_key)
    }

    /// Writes both halves into `dir`, replacing existing files.
    ///
    /// Files are created through an atomic replace and keep the temporary file's
    /// owner-only permissions on unix.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        atomic::write_bytes(&dir.join(PUBLIC_KEY_FILE), self.public_pem.as_bytes())?;
        let private_pem = format_private_key(&self.private_key)?;
        atomic::write_bytes(&dir.join(PRIVATE_KEY_FILE), private_pem.as_bytes())?;
        Ok(())
    }

    /// Reads the private key from `dir` and derives the public half from it.
    pub fn load_from<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let pem = fs::read_to_string(dir.as_ref().join(PRIVATE_KEY_FILE))?;
        Self::from_private_key(parse_private_key(&pem)?)
    }

    /// Returns the key pair the server should use.
    ///
    /// With `keep` set, an existing pair in `dir` is reused. Otherwise, or if no usable
    /// pair exists, a new one is generated and written to `dir`.
    pub fn provision<P: AsRef<Path>>(dir: P, bits: usize, keep: bool) -> Result<Self> {
        let dir = dir.as_ref();
        if keep {
            match Self::load_from(dir) {
                Ok(pair) => {
                    info!(dir = %dir.display(), "Reusing existing key pair");
                    // Rewrite the public half in case it went missing
                    pair.write_to(dir)?;
                    return Ok(pair);
                }
                Err(e) => warn!(error = %e, "No usable key pair on disk, generating a new one"),
            }
        }

        let pair = Self::generate(bits)?;
        pair.write_to(dir)?;
        info!(dir = %dir.display(), bits, "Generated new key pair");
        Ok(pair)
    }
}
