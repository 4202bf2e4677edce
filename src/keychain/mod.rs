//! OS keychain adapter.
//!
//! Two kinds of entries live in the platform credential store:
//! - the optional master-password cache, service `pass-cli`, keyed by
//!   the canonical vault path;
//! - the per-vault audit signing key, service `pass-cli-audit`, keyed
//!   the same way, so audit logs stay verifiable without the master
//!   password.
//!
//! Backends: macOS Keychain Services, Windows Credential Manager, and
//! the Linux Secret Service, all through the `keyring` crate.  Every
//! operation fails gracefully — when no secret service responds the
//! caller degrades (prompt instead of cache, audit disabled) rather
//! than failing the vault operation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{PassCliError, Result};

/// Service namespace of the master-password cache.
pub const MASTER_SERVICE: &str = "pass-cli";

/// Service namespace of audit signing keys.
pub const AUDIT_SERVICE: &str = "pass-cli-audit";

/// The capability set every keychain backend provides.
///
/// Values are opaque byte strings of up to a few KiB.  `get` on a
/// missing key returns `Ok(None)`, distinct from an I/O error.
pub trait SecretStore {
    fn set(&self, service: &str, key: &str, value: &[u8]) -> Result<()>;
    fn get(&self, service: &str, key: &str) -> Result<Option<Vec<u8>>>;
    fn delete(&self, service: &str, key: &str) -> Result<()>;
    /// False in headless environments where no secret service responds.
    fn available(&self) -> bool;
}

/// The real OS credential store.
pub struct OsKeychain;

impl OsKeychain {
    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, key).map_err(|e| {
            PassCliError::KeychainUnavailable(format!("failed to create keychain entry: {e}"))
        })
    }
}

impl SecretStore for OsKeychain {
    fn set(&self, service: &str, key: &str, value: &[u8]) -> Result<()> {
        Self::entry(service, key)?.set_secret(value).map_err(|e| {
            PassCliError::KeychainUnavailable(format!("failed to store keychain entry: {e}"))
        })
    }

    fn get(&self, service: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match Self::entry(service, key)?.get_secret() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(PassCliError::KeychainUnavailable(format!(
                "failed to read keychain entry: {e}"
            ))),
        }
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        match Self::entry(service, key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already gone, that's fine.
            Err(e) => Err(PassCliError::KeychainUnavailable(format!(
                "failed to delete keychain entry: {e}"
            ))),
        }
    }

    fn available(&self) -> bool {
        // Probing a key that does not exist distinguishes "service is
        // up but has no entry" (NoEntry) from "no service at all".
        match Self::entry(MASTER_SERVICE, "availability-probe") {
            Ok(entry) => matches!(
                entry.get_secret(),
                Ok(_) | Err(keyring::Error::NoEntry)
            ),
            Err(_) => false,
        }
    }
}

/// In-memory store for tests and explicitly headless operation.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn set(&self, service: &str, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .expect("keychain mutex poisoned")
            .insert((service.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn get(&self, service: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .expect("keychain mutex poisoned")
            .get(&(service.to_string(), key.to_string()))
            .cloned())
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("keychain mutex poisoned")
            .remove(&(service.to_string(), key.to_string()));
        Ok(())
    }

    fn available(&self) -> bool {
        true
    }
}

/// The store for this process, chosen once at startup.
pub fn platform_store() -> Box<dyn SecretStore> {
    Box::new(OsKeychain)
}
