//! Tamper-evident audit log.
//!
//! Vault lifecycle events are appended as one JSON object per line to
//! `audit.log`, each signed with HMAC-SHA256 under a per-vault random
//! key held in the OS keychain.  The signing key never depends on the
//! master password, so a log can be verified without unlocking the
//! vault.
//!
//! Designed for graceful degradation: if the log file cannot be
//! written, operations continue without logging.  An audit failure
//! never fails the vault operation that produced it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::errors::{PassCliError, Result};

/// Length of the per-vault signing key in bytes.
pub const SIGNING_KEY_LEN: usize = 32;

/// Rotation threshold for the live log file.
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// How long rotated `.old` files are kept.
pub const ROTATED_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Separator in the canonical signed string.
const CANONICAL_SEP: char = '|';

/// Every event the engine can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    VaultInit,
    VaultUnlock,
    VaultLock,
    VaultPasswordChange,
    VaultRemoveAttempt,
    VaultRemove,
    CredentialAdd,
    CredentialUpdate,
    CredentialDelete,
    CredentialAccess,
    KeychainStatus,
    RecoveryEnabled,
    RecoverySuccess,
    RecoveryFailed,
    VerificationStarted,
    VerificationPassed,
    VerificationFailed,
    AtomicSaveStarted,
    AtomicRenameCompleted,
    RollbackStarted,
    RollbackCompleted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VaultInit => "vault_init",
            Self::VaultUnlock => "vault_unlock",
            Self::VaultLock => "vault_lock",
            Self::VaultPasswordChange => "vault_password_change",
            Self::VaultRemoveAttempt => "vault_remove_attempt",
            Self::VaultRemove => "vault_remove",
            Self::CredentialAdd => "credential_add",
            Self::CredentialUpdate => "credential_update",
            Self::CredentialDelete => "credential_delete",
            Self::CredentialAccess => "credential_access",
            Self::KeychainStatus => "keychain_status",
            Self::RecoveryEnabled => "recovery_enabled",
            Self::RecoverySuccess => "recovery_success",
            Self::RecoveryFailed => "recovery_failed",
            Self::VerificationStarted => "verification_started",
            Self::VerificationPassed => "verification_passed",
            Self::VerificationFailed => "verification_failed",
            Self::AtomicSaveStarted => "atomic_save_started",
            Self::AtomicRenameCompleted => "atomic_rename_completed",
            Self::RollbackStarted => "rollback_started",
            Self::RollbackCompleted => "rollback_completed",
        }
    }
}

/// Result of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Attempt,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Attempt => "attempt",
        }
    }
}

/// One line of the audit log.
///
/// `credential_name` may name a service; no field ever carries a
/// credential value, password, key, or mnemonic word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub event_type: String,
    pub outcome: String,
    pub credential_name: String,
    pub hmac_signature: String,
}

impl AuditEntry {
    /// The exact byte string the HMAC covers.
    fn canonical_string(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.timestamp,
            self.event_type,
            self.outcome,
            self.credential_name,
            sep = CANONICAL_SEP
        )
    }
}

/// Result of verifying a log file.
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub total: usize,
    pub valid: usize,
    /// 1-based line number of the first entry that failed, if any.
    pub first_invalid: Option<usize>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.first_invalid.is_none()
    }
}

/// Append-only signed audit log for one vault.
pub struct AuditLog {
    path: PathBuf,
    signing_key: Vec<u8>,
    max_size: u64,
}

impl AuditLog {
    pub fn new(path: PathBuf, signing_key: Vec<u8>) -> Self {
        Self {
            path,
            signing_key,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub fn with_max_size(path: PathBuf, signing_key: Vec<u8>, max_size: u64) -> Self {
        Self {
            path,
            signing_key,
            max_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an event. Fire-and-forget: write errors are swallowed so
    /// an unwritable log never fails the surrounding vault operation.
    pub fn log(&self, event: EventType, outcome: Outcome, credential_name: &str) {
        let _ = self.append(event, outcome, credential_name);
    }

    fn append(&self, event: EventType, outcome: Outcome, credential_name: &str) -> Result<()> {
        self.rotate_if_needed()?;
        self.purge_old_rotations();

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut entry = AuditEntry {
            timestamp,
            event_type: event.as_str().to_string(),
            outcome: outcome.as_str().to_string(),
            credential_name: credential_name.to_string(),
            hmac_signature: String::new(),
        };
        entry.hmac_signature = sign(&self.signing_key, &entry.canonical_string())?;

        let mut line = serde_json::to_string(&entry)
            .map_err(|e| PassCliError::AuditError(format!("entry encode: {e}")))?;
        line.push('\n');

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PassCliError::AuditError(format!("open log: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }

        // Exclusive lock so operator-initiated concurrent runs do not
        // interleave partial lines.
        let mut lock = fd_lock::RwLock::new(file);
        let mut guard = lock
            .write()
            .map_err(|e| PassCliError::AuditError(format!("lock log: {e}")))?;
        guard
            .write_all(line.as_bytes())
            .map_err(|e| PassCliError::AuditError(format!("append log: {e}")))?;

        Ok(())
    }

    /// Rename the live log aside once it crosses the size threshold.
    fn rotate_if_needed(&self) -> Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(()),
        };
        if size <= self.max_size {
            return Ok(());
        }

        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let rotated = self
            .path
            .with_file_name(format!("audit.log.{stamp}.old"));
        fs::rename(&self.path, rotated)
            .map_err(|e| PassCliError::AuditError(format!("rotate log: {e}")))?;
        Ok(())
    }

    /// Delete rotated files past the retention window. Best-effort.
    fn purge_old_rotations(&self) {
        let Some(dir) = self.path.parent() else { return };
        let Ok(entries) = fs::read_dir(dir) else { return };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("audit.log.") && name.ends_with(".old")) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if modified.elapsed().map(|age| age > ROTATED_RETENTION).unwrap_or(false) {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.signing_key.zeroize();
    }
}

/// HMAC-SHA256 over the canonical string, base64-encoded.
pub fn sign(signing_key: &[u8], canonical: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key)
        .map_err(|e| PassCliError::AuditError(format!("invalid signing key: {e}")))?;
    mac.update(canonical.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Recompute every entry's HMAC and report the first mismatch.
///
/// Needs only the signing key from the keychain — never the master
/// password.  A line that fails to parse counts as tampered.
pub fn verify_file(path: &Path, signing_key: &[u8]) -> Result<AuditReport> {
    let contents = fs::read_to_string(path)
        .map_err(|e| PassCliError::AuditError(format!("read log: {e}")))?;

    let mut total = 0;
    let mut valid = 0;
    let mut first_invalid = None;

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        total += 1;
        let line_no = index + 1;

        let ok = match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => sign(signing_key, &entry.canonical_string())
                .map(|expected| {
                    expected
                        .as_bytes()
                        .ct_eq(entry.hmac_signature.as_bytes())
                        .into()
                })
                .unwrap_or(false),
            Err(_) => false,
        };

        if ok {
            valid += 1;
        } else if first_invalid.is_none() {
            first_invalid = Some(line_no);
        }
    }

    Ok(AuditReport {
        total,
        valid,
        first_invalid,
    })
}

/// Read entries back for display (most recent last).
pub fn read_entries(path: &Path, limit: usize) -> Result<Vec<AuditEntry>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| PassCliError::AuditError(format!("read log: {e}")))?;

    let entries: Vec<AuditEntry> = contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();

    let skip = entries.len().saturating_sub(limit);
    Ok(entries.into_iter().skip(skip).collect())
}
