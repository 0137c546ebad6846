//! Authentication module for Babble
//!
//! This module provides the RSA key pair used to protect passwords in transit, the
//! bcrypt-backed password store, and the verification gate that guards protected
//! databases.

pub mod crypto;
pub mod keys;
pub mod passwords;

// Re-export main types for easier access
pub use keys::KeyPair;
pub use passwords::PasswordStore;
