//! Password-based key derivation.
//!
//! Two algorithms are supported, selected per vault and recorded in the
//! vault header so readers always re-derive with the parameters the
//! vault was written with:
//!
//! - **PBKDF2-HMAC-SHA256** — the default. New vaults use 600 000
//!   iterations; vaults written by old releases at 100 000 iterations
//!   still open and are upgraded on the next password change.
//! - **Argon2id** — memory-hard alternative (64 MiB, 1 pass, 4 lanes).

use argon2::{Algorithm, Argon2, Params, Version};
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::{PassCliError, Result};

/// Length of the salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// PBKDF2 iteration count for newly created vaults.
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 600_000;

/// Iteration count used by legacy vaults. Still accepted on read.
pub const PBKDF2_LEGACY_ITERATIONS: u32 = 100_000;

/// Minimum PBKDF2 iterations accepted anywhere.
const PBKDF2_MIN_ITERATIONS: u32 = 100_000;

/// Minimum safe Argon2 memory cost in KiB (8 MiB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Which KDF a vault uses. Serialized into the vault header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256,
    #[serde(rename = "argon2id")]
    Argon2id,
}

/// KDF parameters stored in the vault header so the exact same
/// settings are used when re-opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,

    /// PBKDF2 iteration count. Ignored by Argon2id.
    pub iterations: u32,

    /// Argon2 memory cost in KiB. Ignored by PBKDF2.
    pub memory_kib: u32,

    /// Argon2 parallelism lanes. Ignored by PBKDF2.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::pbkdf2(PBKDF2_DEFAULT_ITERATIONS)
    }
}

impl KdfParams {
    /// PBKDF2-HMAC-SHA256 parameters with an explicit iteration count.
    pub fn pbkdf2(iterations: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2Sha256,
            iterations,
            memory_kib: 0,
            parallelism: 0,
        }
    }

    /// Argon2id parameters: 64 MiB memory, 1 pass, 4 lanes.
    pub fn argon2id() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            iterations: 1,
            memory_kib: 65_536,
            parallelism: 4,
        }
    }

    /// True if these parameters predate the current cost floor and
    /// should be upgraded on the next password change.
    pub fn is_legacy(&self) -> bool {
        matches!(self.algorithm, KdfAlgorithm::Pbkdf2Sha256)
            && self.iterations < PBKDF2_DEFAULT_ITERATIONS
    }
}

/// Derive a 32-byte key from a password and salt.
///
/// Deterministic in `(password, salt, params)`. Enforces minimum cost
/// parameters so a mangled header cannot silently weaken the KDF.
pub fn derive_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<[u8; KEY_LEN]> {
    match params.algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => {
            if params.iterations < PBKDF2_MIN_ITERATIONS {
                return Err(PassCliError::KeyDerivationFailed(format!(
                    "PBKDF2 iterations must be at least {PBKDF2_MIN_ITERATIONS} (got {})",
                    params.iterations
                )));
            }
            let mut key = [0u8; KEY_LEN];
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut key);
            Ok(key)
        }
        KdfAlgorithm::Argon2id => {
            if params.memory_kib < MIN_MEMORY_KIB {
                return Err(PassCliError::KeyDerivationFailed(format!(
                    "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                    params.memory_kib
                )));
            }
            if params.iterations < 1 {
                return Err(PassCliError::KeyDerivationFailed(
                    "Argon2 iterations must be at least 1".into(),
                ));
            }
            if params.parallelism < 1 {
                return Err(PassCliError::KeyDerivationFailed(
                    "Argon2 parallelism must be at least 1".into(),
                ));
            }

            let argon_params = Params::new(
                params.memory_kib,
                params.iterations,
                params.parallelism,
                Some(KEY_LEN),
            )
            .map_err(|e| {
                PassCliError::KeyDerivationFailed(format!("invalid Argon2 params: {e}"))
            })?;

            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

            let mut key = [0u8; KEY_LEN];
            argon2.hash_password_into(password, salt, &mut key).map_err(|e| {
                PassCliError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
            })?;

            Ok(key)
        }
    }
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.try_fill_bytes(&mut salt).expect("OS RNG failure");
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let params = KdfParams::pbkdf2(PBKDF2_LEGACY_ITERATIONS);
        let k1 = derive_key(b"correct horse", &salt, &params).unwrap();
        let k2 = derive_key(b"correct horse", &salt, &params).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn pbkdf2_differs_by_salt() {
        let params = KdfParams::pbkdf2(PBKDF2_LEGACY_ITERATIONS);
        let k1 = derive_key(b"pw", &[1u8; SALT_LEN], &params).unwrap();
        let k2 = derive_key(b"pw", &[2u8; SALT_LEN], &params).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn argon2id_is_deterministic() {
        let salt = [9u8; SALT_LEN];
        let params = KdfParams {
            memory_kib: MIN_MEMORY_KIB,
            ..KdfParams::argon2id()
        };
        let k1 = derive_key(b"pw", &salt, &params).unwrap();
        let k2 = derive_key(b"pw", &salt, &params).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn pbkdf2_rejects_iterations_below_floor() {
        let params = KdfParams::pbkdf2(1_000);
        let result = derive_key(b"pw", &[0u8; SALT_LEN], &params);
        assert!(result.is_err());
    }

    #[test]
    fn argon2_rejects_weak_memory() {
        let params = KdfParams {
            memory_kib: 1_024,
            ..KdfParams::argon2id()
        };
        let result = derive_key(b"pw", &[0u8; SALT_LEN], &params);
        assert!(result.is_err());
    }

    #[test]
    fn legacy_detection() {
        assert!(KdfParams::pbkdf2(PBKDF2_LEGACY_ITERATIONS).is_legacy());
        assert!(!KdfParams::pbkdf2(PBKDF2_DEFAULT_ITERATIONS).is_legacy());
        assert!(!KdfParams::argon2id().is_legacy());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
