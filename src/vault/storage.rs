//! Atomic persistence for the vault file.
//!
//! Every save follows the same protocol so that a crash at any point
//! leaves the filesystem in one of exactly two consistent states:
//!
//! 1. Remove orphaned temp files from earlier interrupted saves.
//! 2. Write the complete envelope to `<vault>.tmp.<ts>.<hex>` with the
//!    vault's permissions, then fsync it.
//! 3. Read the temp back and verify it decrypts and parses. On any
//!    failure the temp is unlinked and the live vault is untouched.
//! 4. Rename live -> `<vault>.backup` (the N-1 generation).
//! 5. Rename temp -> live.
//! 6. Fsync the containing directory.
//!
//! A crash before step 4 leaves the old vault plus an orphan temp; a
//! crash between 4 and 5 leaves the backup as the newest good state
//! (detected at the next load as `BackupAvailable`); a crash after 5
//! is a completed save.  The backup is deleted at the end of the next
//! successful unlock, not at save time, so a bad save can always be
//! rolled back by restarting.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::TryRngCore;

use crate::audit::{AuditLog, EventType, Outcome};
use crate::errors::{PassCliError, Result};

/// Suffix of the N-1 backup file.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Mode bits required on the vault, backup, and temp files.
#[cfg(unix)]
const VAULT_MODE: u32 = 0o600;

/// Path of the backup sibling for a vault file.
pub fn backup_path(vault_path: &Path) -> PathBuf {
    let mut name = vault_path
        .file_name()
        .unwrap_or_default()
        .to_os_string();
    name.push(BACKUP_SUFFIX);
    vault_path.with_file_name(name)
}

/// Generate `<vault>.tmp.<YYYYMMDD-HHMMSS>.<6-hex>`.
fn temp_path(vault_path: &Path) -> PathBuf {
    let mut rand_bytes = [0u8; 3];
    rand::rngs::OsRng.try_fill_bytes(&mut rand_bytes).expect("OS RNG failure");
    let hex: String = rand_bytes.iter().map(|b| format!("{b:02x}")).collect();

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let mut name = vault_path
        .file_name()
        .unwrap_or_default()
        .to_os_string();
    name.push(format!(".tmp.{stamp}.{hex}"));
    vault_path.with_file_name(name)
}

/// True when `name` is a temp sibling of `vault_path`.
fn is_temp_sibling(vault_path: &Path, name: &str) -> bool {
    let Some(vault_name) = vault_path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(&format!("{vault_name}.tmp."))
}

/// Remove temp files abandoned by interrupted saves.
///
/// Returns how many were removed. Also run at unlock so an aborted
/// save or migration never leaves debris behind.
pub fn clean_orphaned_temps(vault_path: &Path) -> Result<usize> {
    let dir = vault_path.parent().unwrap_or(Path::new("."));
    let mut removed = 0;

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_temp_sibling(vault_path, name) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Map a filesystem error to the storage taxonomy.
fn classify_io_error(e: io::Error, path: &Path) -> PassCliError {
    #[cfg(unix)]
    if let Some(errno) = e.raw_os_error() {
        if errno == libc::ENOSPC {
            return PassCliError::DiskSpaceExhausted;
        }
        if errno == libc::EXDEV {
            return PassCliError::FilesystemNotAtomic;
        }
    }
    if e.kind() == io::ErrorKind::PermissionDenied {
        return PassCliError::PermissionDenied(path.to_path_buf());
    }
    PassCliError::Io(e)
}

/// Create the temp file with the vault's mode and write the envelope.
fn write_temp(tmp: &Path, live: &Path, envelope: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mode = fs::metadata(live)
            .ok()
            .map(|m| {
                use std::os::unix::fs::PermissionsExt;
                m.permissions().mode() & 0o777
            })
            .unwrap_or(VAULT_MODE);
        options.mode(mode);
    }

    let mut file = options.open(tmp).map_err(|e| classify_io_error(e, tmp))?;
    file.write_all(envelope)
        .map_err(|e| classify_io_error(e, tmp))?;
    file.sync_all().map_err(|e| classify_io_error(e, tmp))?;
    Ok(())
}

/// Fsync the directory so the renames are durable. Best-effort on
/// platforms where directories cannot be opened.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// Write `envelope` to `vault_path` atomically.
///
/// `verify` receives the bytes read back from the temp file and must
/// confirm they decrypt and parse; a `VerificationFailed` return
/// guarantees the live vault was never touched.  Audit events are
/// emitted at the protocol points they describe.
pub fn atomic_save(
    vault_path: &Path,
    envelope: &[u8],
    verify: &dyn Fn(&[u8]) -> Result<()>,
    audit: Option<&AuditLog>,
) -> Result<()> {
    if let Some(log) = audit {
        log.log(EventType::AtomicSaveStarted, Outcome::Attempt, "");
    }

    // Step 1: orphan cleanup.
    clean_orphaned_temps(vault_path)?;

    // Step 2: temp creation + fsync.
    let tmp = temp_path(vault_path);
    if let Err(e) = write_temp(&tmp, vault_path, envelope) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    // Step 3: verification. Read the temp back through the filesystem
    // so disk corruption, cipher bugs, and encoder regressions are all
    // caught before the live vault is touched.
    if let Some(log) = audit {
        log.log(EventType::VerificationStarted, Outcome::Attempt, "");
    }
    let verified = fs::read(&tmp)
        .map_err(|e| PassCliError::VerificationFailed(format!("temp read-back: {e}")))
        .and_then(|bytes| verify(&bytes));

    match verified {
        Ok(()) => {
            if let Some(log) = audit {
                log.log(EventType::VerificationPassed, Outcome::Success, "");
            }
        }
        Err(e) => {
            if let Some(log) = audit {
                log.log(EventType::VerificationFailed, Outcome::Failure, "");
            }
            let _ = fs::remove_file(&tmp);
            let message = match e {
                PassCliError::VerificationFailed(m) => m,
                other => other.to_string(),
            };
            return Err(PassCliError::VerificationFailed(message));
        }
    }

    // Step 4: rotate live -> backup (N-1 generation, overwrite prior).
    let backup = backup_path(vault_path);
    let had_live = vault_path.exists();
    if had_live {
        if let Err(e) = fs::rename(vault_path, &backup) {
            let _ = fs::remove_file(&tmp);
            return Err(classify_io_error(e, vault_path));
        }
    }

    // Step 5: rotate temp -> live.
    if let Err(e) = fs::rename(&tmp, vault_path) {
        // Roll the backup straight back so the live file reappears.
        if let Some(log) = audit {
            log.log(EventType::RollbackStarted, Outcome::Attempt, "");
        }
        if had_live {
            let _ = fs::rename(&backup, vault_path);
        }
        let _ = fs::remove_file(&tmp);
        if let Some(log) = audit {
            log.log(EventType::RollbackCompleted, Outcome::Success, "");
        }
        return Err(classify_io_error(e, vault_path));
    }

    if let Some(log) = audit {
        log.log(EventType::AtomicRenameCompleted, Outcome::Success, "");
    }

    // Step 6: durability of the renames themselves.
    sync_dir(vault_path.parent().unwrap_or(Path::new(".")));

    Ok(())
}

/// Read the vault envelope bytes.
///
/// If the live file is missing or unreadable but a backup exists, the
/// caller is told via `BackupAvailable` so it can offer a restore.
pub fn load(vault_path: &Path) -> Result<Vec<u8>> {
    match fs::read(vault_path) {
        Ok(data) => Ok(data),
        Err(e) => {
            let backup = backup_path(vault_path);
            if backup.exists() {
                Err(PassCliError::BackupAvailable(backup))
            } else if e.kind() == io::ErrorKind::NotFound {
                Err(PassCliError::VaultNotFound(vault_path.to_path_buf()))
            } else {
                Err(classify_io_error(e, vault_path))
            }
        }
    }
}

/// Promote the backup to the live file (user-driven restore).
pub fn restore_backup(vault_path: &Path) -> Result<()> {
    let backup = backup_path(vault_path);
    if !backup.exists() {
        return Err(PassCliError::VaultNotFound(backup));
    }
    fs::rename(&backup, vault_path).map_err(|e| classify_io_error(e, vault_path))
}

/// Delete the stale backup after a successful unlock. Returns whether
/// a backup existed.
pub fn delete_backup(vault_path: &Path) -> Result<bool> {
    let backup = backup_path(vault_path);
    match fs::remove_file(&backup) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(classify_io_error(e, &backup)),
    }
}

/// Enforce identical 0600 mode bits on vault and backup.
///
/// Returns `true` when drift was found and reset, so the caller can
/// surface a warning.
pub fn ensure_permissions(vault_path: &Path) -> Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut reset = false;
        for path in [vault_path.to_path_buf(), backup_path(vault_path)] {
            let Ok(metadata) = fs::metadata(&path) else { continue };
            if metadata.permissions().mode() & 0o777 != VAULT_MODE {
                fs::set_permissions(&path, fs::Permissions::from_mode(VAULT_MODE))?;
                reset = true;
            }
        }
        Ok(reset)
    }
    #[cfg(not(unix))]
    {
        let _ = vault_path;
        Ok(false)
    }
}
