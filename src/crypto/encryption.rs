//! AES-256-GCM authenticated encryption.
//!
//! Unlike the usual nonce-prepended blob, the vault envelope stores
//! every nonce in its header, so `encrypt` takes the nonce explicitly
//! and the caller is responsible for generating a fresh one per call
//! via `generate_nonce`.  Associated data (the header bytes) is folded
//! into the GCM tag so header tampering fails decryption.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};

use crate::errors::{PassCliError, Result};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Generate a fresh random 12-byte nonce.
///
/// Callers must never reuse a nonce under the same key.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    Aes256Gcm::generate_nonce(&mut OsRng).into()
}

/// Encrypt `plaintext` with a 32-byte `key` under an explicit nonce.
///
/// Returns ciphertext with the 16-byte auth tag appended. `aad` is
/// authenticated but not encrypted; pass `&[]` when there is none.
pub fn encrypt(key: &[u8], nonce: &[u8; NONCE_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| PassCliError::EncryptionFailed(format!("invalid key length: {e}")))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| PassCliError::EncryptionFailed(format!("encryption error: {e}")))
}

/// Decrypt data produced by `encrypt`, verifying the auth tag.
///
/// Fails with `AuthenticationFailed` if the key, nonce, ciphertext,
/// tag, or associated data do not match what was encrypted.
pub fn decrypt(key: &[u8], nonce: &[u8; NONCE_LEN], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(PassCliError::AuthenticationFailed);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| PassCliError::AuthenticationFailed)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| PassCliError::AuthenticationFailed)
}
