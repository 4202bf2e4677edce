//! Zeroizing key containers and raw randomness.

use rand::TryRngCore;
use zeroize::Zeroize;

use super::kdf::KEY_LEN;

/// Fill a buffer of `n` bytes from the OS CSPRNG.
pub fn secure_random(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.try_fill_bytes(&mut buf).expect("OS RNG failure");
    buf
}

/// A wrapper around a 32-byte key that zeroes its memory on drop.
///
/// Holds the vault master key (and, during recovery, the recovery key)
/// so the bytes cannot linger after the session ends.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random master key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.try_fill_bytes(&mut bytes).expect("OS RNG failure");
        Self { bytes }
    }

    /// Build a key from a slice, failing on length mismatch.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_LEN] = slice.try_into().ok()?;
        Some(Self { bytes })
    }

    /// Access the raw key bytes (e.g. to pass to the cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}
