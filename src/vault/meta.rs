//! Plaintext metadata sidecar (`vault.meta`).
//!
//! The sidecar exists so operations that cannot decrypt the vault
//! (status queries, vault removal, audit setup at unlock time) still
//! know the audit configuration.  It must never contain secrets — its
//! only secret-adjacent content is a filesystem path.
//!
//! When the vault is unlocked the encrypted payload's audit fields are
//! authoritative; on disagreement the sidecar is rewritten to match,
//! never the reverse.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PassCliError, Result};

/// Sidecar file name, stored next to the vault file.
pub const META_FILE_NAME: &str = "vault.meta";

/// Current sidecar schema version.
pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMetadata {
    /// Absolute path of the vault file this sidecar describes.
    pub vault_id: String,

    pub audit_enabled: bool,

    /// Absolute path of the audit log. Non-empty when audit is on.
    pub audit_log_path: String,

    pub created_at: DateTime<Utc>,

    pub version: u32,
}

impl VaultMetadata {
    pub fn new(vault_id: &str, audit_enabled: bool, audit_log_path: &str) -> Self {
        Self {
            vault_id: vault_id.to_string(),
            audit_enabled,
            audit_log_path: audit_log_path.to_string(),
            created_at: Utc::now(),
            version: META_VERSION,
        }
    }

    /// Structural checks applied after load.
    fn validate(&self) -> Result<()> {
        if self.version < 1 {
            return Err(PassCliError::CorruptedFile(
                "vault.meta version must be >= 1".into(),
            ));
        }
        if !Path::new(&self.vault_id).is_absolute() {
            return Err(PassCliError::CorruptedFile(
                "vault.meta vault_id must be an absolute path".into(),
            ));
        }
        if self.audit_enabled {
            if self.audit_log_path.is_empty() {
                return Err(PassCliError::CorruptedFile(
                    "vault.meta audit_log_path is empty while audit is enabled".into(),
                ));
            }
            if !Path::new(&self.audit_log_path).is_absolute() {
                return Err(PassCliError::CorruptedFile(
                    "vault.meta audit_log_path must be an absolute path".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Path of the sidecar for a given vault file.
pub fn meta_path(vault_path: &Path) -> PathBuf {
    vault_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(META_FILE_NAME)
}

/// Load the sidecar next to `vault_path`.
///
/// A missing file is not an error and returns `Ok(None)`.  A sidecar
/// with an unknown future version is parsed best-effort; the warning
/// is the caller's to surface.
pub fn load(vault_path: &Path) -> Result<Option<VaultMetadata>> {
    let path = meta_path(vault_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    let metadata: VaultMetadata = serde_json::from_str(&contents)
        .map_err(|e| PassCliError::CorruptedFile(format!("vault.meta: {e}")))?;

    metadata.validate()?;
    Ok(Some(metadata))
}

/// Write the sidecar atomically (tempfile + rename), world-readable.
pub fn save(metadata: &VaultMetadata, vault_path: &Path) -> Result<()> {
    let path = meta_path(vault_path);
    let parent = vault_path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(".vault.meta.tmp");

    let contents = serde_json::to_string_pretty(metadata)
        .map_err(|e| PassCliError::SerializationError(format!("vault.meta: {e}")))?;

    fs::write(&tmp_path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o644);
        fs::set_permissions(&tmp_path, perms)?;
    }

    fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Remove the sidecar. Idempotent: a missing file is success.
pub fn delete(vault_path: &Path) -> Result<()> {
    let path = meta_path(vault_path);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
