//! Cryptographic operations for Babble authentication
//!
//! Passwords never travel in the clear: clients encrypt them with the server's RSA
//! public key (OAEP padding, SHA-256) and send the base64-encoded ciphertext. The server
//! decrypts with its private key.

use crate::{Error, Result};
use base64ct::{Base64, Encoding};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// Parse a public key from SPKI PEM format
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| Error::InvalidKeyFormat(format!("Invalid RSA public key: {e}")))
}

/// Parse a private key from PKCS#8 PEM format
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| Error::InvalidKeyFormat(format!("Invalid RSA private key: {e}")))
}

/// Format a public key as SPKI PEM
pub fn format_public_key(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::InvalidKeyFormat(format!("Failed to encode public key: {e}")))
}

/// Format a private key as PKCS#8 PEM
pub fn format_private_key(key: &RsaPrivateKey) -> Result<String> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| Error::InvalidKeyFormat(format!("Failed to encode private key: {e}")))
}

/// Generate an RSA key pair
///
/// Uses cryptographically secure random number generation
pub fn generate_keypair(bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| Error::InvalidKeyFormat(format!("Failed to generate RSA key: {e}")))?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok((private_key, public_key))
}

/// Encrypt a password for transmission
///
/// This is the client side of the handshake. Returns base64-encoded ciphertext.
pub fn encrypt_password(password: &str, public_key: &RsaPublicKey) -> Result<String> {
    let ciphertext = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), password.as_bytes())
        .map_err(|e| Error::InvalidOperation(format!("Failed to encrypt password: {e}")))?;
    Ok(Base64::encode_string(&ciphertext))
}

/// Encrypt a password against a public key given as PEM text
pub fn encrypt_password_pem(password: &str, public_pem: &str) -> Result<String> {
    encrypt_password(password, &parse_public_key(public_pem)?)
}

/// Decrypt a password produced by `encrypt_password`
///
/// # Errors
/// `Error::Decryption` if the input is not base64, was encrypted for another key, or
/// does not decrypt to UTF-8.
pub fn decrypt_password(encrypted: &str, private_key: &RsaPrivateKey) -> Result<String> {
    let ciphertext = Base64::decode_vec(encrypted.trim())
        .map_err(|_| Error::Decryption("credential is not valid base64".to_string()))?;

    let plaintext = private_key
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|_| Error::Decryption("credential could not be decrypted".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| Error::Decryption("credential is not valid UTF-8".to_string()))
}
