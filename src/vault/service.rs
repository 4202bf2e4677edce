//! High-level vault operations used by CLI commands.
//!
//! `VaultService` is the single owner of the decrypted payload and the
//! session master key.  It coordinates the crypto layer, the atomic
//! storage protocol, the metadata sidecar, the audit log, and the OS
//! keychain.  Two states exist: locked (nothing decrypted in memory)
//! and unlocked (payload resident, master key held); `lock` wipes
//! both.
//!
//! Credential reads update per-directory usage statistics in memory
//! only; the dirty state is persisted by the next mutating save or by
//! `lock`, never by a save-per-read.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use zeroize::{Zeroize, Zeroizing};

use crate::audit::{self, AuditLog, AuditReport, EventType, Outcome, SIGNING_KEY_LEN};
use crate::crypto::encryption;
use crate::crypto::kdf::{self, KdfParams};
use crate::crypto::keys::{secure_random, MasterKey};
use crate::errors::{PassCliError, Result};
use crate::keychain::{SecretStore, AUDIT_SERVICE, MASTER_SERVICE};
use crate::policy::{self, RateLimiter};
use crate::recovery;

use super::format::{self, VaultHeader, WrappedKey, FORMAT_V1, FORMAT_V2};
use super::meta::{self, VaultMetadata};
use super::payload::{Credential, CredentialSummary, VaultPayload};
use super::storage;

/// Default audit log file name inside the vault directory.
pub const AUDIT_FILE_NAME: &str = "audit.log";

/// Options for vault initialization.
pub struct InitOptions {
    pub kdf: KdfParams,
    pub audit: bool,
    /// Override for the audit log location; defaults to
    /// `<vault-dir>/audit.log`.
    pub audit_log_path: Option<PathBuf>,
    pub recovery: bool,
    /// Optional BIP39 passphrase for the recovery mnemonic.
    pub passphrase: Option<Zeroizing<String>>,
    /// Cache the master password in the OS keychain.
    pub cache_password: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            audit: true,
            audit_log_path: None,
            recovery: false,
            passphrase: None,
            cache_password: false,
        }
    }
}

/// Partial update applied to an existing credential. `None` keeps the
/// current value.
#[derive(Default)]
pub struct CredentialUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub totp_secret: Option<String>,
}

/// Decrypted state held between unlock and lock.
struct Session {
    header: VaultHeader,
    payload: VaultPayload,
    master_key: MasterKey,
    usage_dirty: bool,
}

/// The vault engine. One instance per vault file.
pub struct VaultService {
    vault_path: PathBuf,
    keychain: Box<dyn SecretStore>,
    audit: Option<AuditLog>,
    session: Option<Session>,
    limiter: RateLimiter,
    warnings: Vec<String>,
}

impl VaultService {
    /// Create a service against the platform keychain.
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self::with_store(vault_path, crate::keychain::platform_store())
    }

    /// Create a service with an explicit keychain backend.
    pub fn with_store(vault_path: impl Into<PathBuf>, keychain: Box<dyn SecretStore>) -> Self {
        Self {
            vault_path: absolutize(vault_path.into()),
            keychain,
            audit: None,
            session: None,
            limiter: RateLimiter::new(),
            warnings: Vec::new(),
        }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_some()
    }

    /// Drain accumulated non-fatal warnings for display.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn vault_id(&self) -> String {
        self.vault_path.display().to_string()
    }

    fn default_audit_path(&self) -> PathBuf {
        self.vault_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(AUDIT_FILE_NAME)
    }

    fn emit(&self, event: EventType, outcome: Outcome, credential_name: &str) {
        if let Some(log) = &self.audit {
            log.log(event, outcome, credential_name);
        }
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Create a new vault. Returns the recovery mnemonic when recovery
    /// was requested — this is the only time it is ever available.
    pub fn init(
        &mut self,
        password: &str,
        options: &InitOptions,
    ) -> Result<Option<Zeroizing<String>>> {
        if self.vault_path.exists() {
            return Err(PassCliError::VaultAlreadyExists(self.vault_path.clone()));
        }

        self.check_policy(password)?;

        if let Some(dir) = self.vault_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let vault_id = self.vault_id();
        let audit_path = options
            .audit_log_path
            .clone()
            .unwrap_or_else(|| self.default_audit_path());
        let audit_path = absolutize(audit_path);

        // Audit first so vault_init itself is logged.
        let audit_enabled = if options.audit {
            self.open_audit(&vault_id, &audit_path, true)
        } else {
            false
        };

        // Derive the password KEK and wrap a fresh master key.
        let salt = kdf::generate_salt();
        let mut kek = kdf::derive_key(password.as_bytes(), &salt, &options.kdf)?;
        let master_key = MasterKey::generate();

        let mut header = VaultHeader::new_v2(options.kdf, salt.to_vec());
        header.password_wrap = Some(WrappedKey::wrap(&kek, &master_key)?);
        kek.zeroize();

        let mut payload = VaultPayload::new(
            &vault_id,
            audit_enabled,
            &audit_path.display().to_string(),
        );

        // Recovery setup wraps the same master key under the recovery
        // key so the mnemonic is a full unlock path.
        let mut mnemonic = None;
        if options.recovery {
            let passphrase = options.passphrase.as_ref().map(|p| p.as_str());
            let setup = recovery::setup(passphrase, &options.kdf)?;
            header.recovery_wrap = Some(WrappedKey::wrap(
                setup.recovery_key.as_bytes(),
                &master_key,
            )?);
            header.recovery = Some(setup.blob);
            payload.recovery_enabled = true;
            mnemonic = Some(setup.mnemonic);
        }

        self.session = Some(Session {
            header,
            payload,
            master_key,
            usage_dirty: false,
        });

        if let Err(e) = self.persist() {
            self.session = None;
            self.emit(EventType::VaultInit, Outcome::Failure, "");
            return Err(e);
        }

        // Sidecar enables audit-before-unlock for later runs.
        let metadata = VaultMetadata::new(
            &vault_id,
            audit_enabled,
            &audit_path.display().to_string(),
        );
        if let Err(e) = meta::save(&metadata, &self.vault_path) {
            self.warn(format!("could not write vault.meta: {e}"));
        }

        self.emit(EventType::VaultInit, Outcome::Success, "");
        if options.recovery {
            self.emit(EventType::RecoveryEnabled, Outcome::Success, "");
        }

        if options.cache_password {
            self.cache_master_password(password);
        }

        Ok(mnemonic)
    }

    // ------------------------------------------------------------------
    // Unlock / lock
    // ------------------------------------------------------------------

    /// Unlock the vault with the master password.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        // Sidecar first: audit must work before any decryption.
        self.audit_from_sidecar();

        let bytes = storage::load(&self.vault_path)?;
        match storage::ensure_permissions(&self.vault_path) {
            Ok(true) => self.warn("vault file permissions were reset to 0600"),
            Ok(false) => {}
            Err(e) => self.warn(format!("could not check vault permissions: {e}")),
        }

        let raw = format::parse(&bytes)?;
        let mut kek = kdf::derive_key(password.as_bytes(), &raw.header.salt, &raw.header.kdf)?;

        let master_key = match (raw.version, &raw.header.password_wrap) {
            (FORMAT_V2, Some(wrap)) => wrap.unwrap_key(&kek),
            (FORMAT_V1, _) => Ok(MasterKey::new(kek)),
            (FORMAT_V2, None) => Err(PassCliError::CorruptedFile(
                "v2 envelope is missing the password wrap".into(),
            )),
            _ => Err(PassCliError::CorruptedFile("unknown envelope layout".into())),
        };
        kek.zeroize();

        let master_key = match master_key {
            Ok(key) => key,
            Err(e) => {
                if matches!(e, PassCliError::AuthenticationFailed) {
                    self.emit(EventType::VaultUnlock, Outcome::Failure, "");
                }
                return Err(e);
            }
        };

        let nonce = raw.header.nonce()?;
        let plaintext = encryption::decrypt(
            master_key.as_bytes(),
            &nonce,
            &raw.body,
            &raw.header_bytes,
        );
        let mut plaintext = match plaintext {
            Ok(p) => p,
            Err(_) => {
                self.emit(EventType::VaultUnlock, Outcome::Failure, "");
                return Err(PassCliError::AuthenticationFailed);
            }
        };

        let payload = VaultPayload::from_json(&plaintext);
        plaintext.zeroize();
        let payload = payload?;

        self.emit(EventType::VaultUnlock, Outcome::Success, "");

        // Payload audit configuration is authoritative; repair the
        // sidecar (and a missing logger) to match it.
        self.sync_sidecar(&payload);

        // The previous save's backup has served its purpose.
        if let Err(e) = storage::delete_backup(&self.vault_path) {
            self.warn(format!("could not delete stale backup: {e}"));
        }
        // Debris from an interrupted save or migration.
        if let Err(e) = storage::clean_orphaned_temps(&self.vault_path) {
            self.warn(format!("could not clean orphaned temp files: {e}"));
        }

        self.session = Some(Session {
            header: raw.header,
            payload,
            master_key,
            usage_dirty: false,
        });
        Ok(())
    }

    /// Lock the vault: persist coalesced usage, then wipe the payload
    /// and master key.
    pub fn lock(&mut self) -> Result<()> {
        let dirty = match &self.session {
            Some(session) => session.usage_dirty,
            None => return Ok(()),
        };

        let result = if dirty { self.persist() } else { Ok(()) };

        self.emit(EventType::VaultLock, Outcome::Success, "");
        // Dropping the session zeroizes the payload and master key.
        self.session = None;
        result
    }

    // ------------------------------------------------------------------
    // Credential operations
    // ------------------------------------------------------------------

    /// Fetch a credential and record the access for the current
    /// working directory. The usage update is persisted lazily.
    pub fn get(&mut self, service: &str) -> Result<Credential> {
        let directory = std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let git_repo = std::env::current_dir().ok().and_then(|d| detect_git_repo(&d));

        let session = self.session.as_mut().ok_or(PassCliError::VaultLocked)?;
        let credential = session
            .payload
            .credentials
            .get_mut(service)
            .ok_or_else(|| PassCliError::CredentialNotFound(service.to_string()))?;

        if !directory.is_empty() {
            credential.record_usage(&directory, git_repo);
            session.usage_dirty = true;
        }
        let result = credential.clone();

        self.emit(EventType::CredentialAccess, Outcome::Success, service);
        Ok(result)
    }

    /// Sorted summaries of all credentials. No secrets included.
    pub fn list(&self) -> Result<Vec<CredentialSummary>> {
        let session = self.session.as_ref().ok_or(PassCliError::VaultLocked)?;
        Ok(session.payload.summaries())
    }

    /// Add a new credential and save.
    pub fn add(&mut self, credential: Credential) -> Result<()> {
        let service = credential.service.clone();
        {
            let session = self.session.as_mut().ok_or(PassCliError::VaultLocked)?;
            if session.payload.credentials.contains_key(&service) {
                return Err(PassCliError::CredentialAlreadyExists(service));
            }
            session
                .payload
                .credentials
                .insert(service.clone(), credential);
        }

        match self.persist() {
            Ok(()) => {
                self.emit(EventType::CredentialAdd, Outcome::Success, &service);
                Ok(())
            }
            Err(e) => {
                // Keep memory consistent with the untouched file.
                if let Some(session) = &mut self.session {
                    session.payload.credentials.remove(&service);
                }
                self.emit(EventType::CredentialAdd, Outcome::Failure, &service);
                Err(e)
            }
        }
    }

    /// Apply a partial update to an existing credential and save.
    pub fn update(&mut self, service: &str, update: CredentialUpdate) -> Result<()> {
        let previous = {
            let session = self.session.as_mut().ok_or(PassCliError::VaultLocked)?;
            let credential = session
                .payload
                .credentials
                .get_mut(service)
                .ok_or_else(|| PassCliError::CredentialNotFound(service.to_string()))?;

            let previous = credential.clone();
            if let Some(username) = update.username {
                credential.username = username;
            }
            if let Some(password) = update.password {
                credential.password.zeroize();
                credential.password = password;
            }
            if let Some(url) = update.url {
                credential.url = Some(url);
            }
            if let Some(notes) = update.notes {
                credential.notes = Some(notes);
            }
            if let Some(category) = update.category {
                credential.category = Some(category);
            }
            if let Some(totp) = update.totp_secret {
                credential.totp_secret = Some(totp);
            }
            credential.updated_at = Utc::now();
            previous
        };

        match self.persist() {
            Ok(()) => {
                self.emit(EventType::CredentialUpdate, Outcome::Success, service);
                Ok(())
            }
            Err(e) => {
                if let Some(session) = &mut self.session {
                    session
                        .payload
                        .credentials
                        .insert(service.to_string(), previous);
                }
                self.emit(EventType::CredentialUpdate, Outcome::Failure, service);
                Err(e)
            }
        }
    }

    /// Delete a credential and save.
    pub fn delete(&mut self, service: &str) -> Result<()> {
        let removed = {
            let session = self.session.as_mut().ok_or(PassCliError::VaultLocked)?;
            session
                .payload
                .credentials
                .remove(service)
                .ok_or_else(|| PassCliError::CredentialNotFound(service.to_string()))?
        };

        match self.persist() {
            Ok(()) => {
                self.emit(EventType::CredentialDelete, Outcome::Success, service);
                Ok(())
            }
            Err(e) => {
                if let Some(session) = &mut self.session {
                    session
                        .payload
                        .credentials
                        .insert(service.to_string(), removed);
                }
                self.emit(EventType::CredentialDelete, Outcome::Failure, service);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Password change / migration / recovery
    // ------------------------------------------------------------------

    /// Change the master password. Legacy vaults (v1 envelope or
    /// below-floor KDF cost) are migrated to the current format in the
    /// same atomic save; if the old vault claimed recovery, a fresh
    /// mnemonic is generated and returned.
    pub fn change_password(&mut self, new_password: &str) -> Result<Option<Zeroizing<String>>> {
        self.check_policy(new_password)?;
        let session = self.session.as_mut().ok_or(PassCliError::VaultLocked)?;

        let legacy = session.header.version == FORMAT_V1 || session.header.kdf.is_legacy();
        let mut mnemonic = None;

        if legacy {
            // Full migration: current KDF cost, fresh master key, and
            // a working recovery blob when the old vault claimed one.
            let new_kdf = KdfParams::default();
            let salt = kdf::generate_salt();
            let master_key = MasterKey::generate();

            let mut header = VaultHeader::new_v2(new_kdf, salt.to_vec());
            header.created_at = session.header.created_at;

            let mut kek = kdf::derive_key(new_password.as_bytes(), &salt, &new_kdf)?;
            header.password_wrap = Some(WrappedKey::wrap(&kek, &master_key)?);
            kek.zeroize();

            let had_recovery = session.payload.recovery_enabled
                || session
                    .header
                    .recovery
                    .as_ref()
                    .map(|r| r.enabled)
                    .unwrap_or(false);
            if had_recovery {
                let setup = recovery::setup(None, &new_kdf)?;
                header.recovery_wrap =
                    Some(WrappedKey::wrap(setup.recovery_key.as_bytes(), &master_key)?);
                header.recovery = Some(setup.blob);
                session.payload.recovery_enabled = true;
                mnemonic = Some(setup.mnemonic);
            }

            session.header = header;
            session.master_key = master_key;
        } else {
            // Same master key, new password wrap with a fresh salt.
            // The recovery wrap binds the recovery key to the master
            // key, not to the password, so it is untouched.
            let salt = kdf::generate_salt();
            session.header.salt = salt.to_vec();
            let mut kek = kdf::derive_key(new_password.as_bytes(), &salt, &session.header.kdf)?;
            session.header.password_wrap =
                Some(WrappedKey::wrap(&kek, &session.master_key)?);
            kek.zeroize();
        }

        match self.persist() {
            Ok(()) => {
                self.emit(EventType::VaultPasswordChange, Outcome::Success, "");
            }
            Err(e) => {
                self.emit(EventType::VaultPasswordChange, Outcome::Failure, "");
                return Err(e);
            }
        }

        // Keep the keychain cache in step if one exists.
        let vault_id = self.vault_id();
        match self.keychain.get(MASTER_SERVICE, &vault_id) {
            Ok(Some(_)) => {
                if let Err(e) = self
                    .keychain
                    .set(MASTER_SERVICE, &vault_id, new_password.as_bytes())
                {
                    self.warn(format!("could not refresh cached password: {e}"));
                }
            }
            Ok(None) => {}
            Err(_) => {}
        }

        Ok(mnemonic)
    }

    /// Recover a locked vault with 6 challenge words and set a new
    /// master password in the same atomic save.
    pub fn recover(
        &mut self,
        challenge_words: &[String],
        passphrase: Option<&str>,
        new_password: &str,
    ) -> Result<()> {
        self.check_policy(new_password)?;
        self.audit_from_sidecar();

        let bytes = storage::load(&self.vault_path)?;
        let raw = format::parse(&bytes)?;

        let Some(blob) = raw.header.recovery.clone() else {
            return Err(PassCliError::RecoveryDisabled);
        };

        let recovery_key = match recovery::recover(&blob, challenge_words, passphrase) {
            Ok(key) => key,
            Err(e) => {
                self.emit(EventType::RecoveryFailed, Outcome::Failure, "");
                return Err(e);
            }
        };

        let Some(recovery_wrap) = &raw.header.recovery_wrap else {
            self.emit(EventType::RecoveryFailed, Outcome::Failure, "");
            return Err(PassCliError::MetadataCorrupted(
                "recovery blob present but master key is not recovery-wrapped".into(),
            ));
        };

        let master_key = match recovery_wrap.unwrap_key(recovery_key.as_bytes()) {
            Ok(key) => key,
            Err(_) => {
                self.emit(EventType::RecoveryFailed, Outcome::Failure, "");
                return Err(PassCliError::DecryptionFailed);
            }
        };

        let nonce = raw.header.nonce()?;
        let plaintext = encryption::decrypt(
            master_key.as_bytes(),
            &nonce,
            &raw.body,
            &raw.header_bytes,
        );
        let mut plaintext = match plaintext {
            Ok(p) => p,
            Err(_) => {
                self.emit(EventType::RecoveryFailed, Outcome::Failure, "");
                return Err(PassCliError::DecryptionFailed);
            }
        };
        let payload = VaultPayload::from_json(&plaintext);
        plaintext.zeroize();
        let payload = payload?;

        // Re-wrap under the new password, upgrading legacy KDF cost.
        let mut header = raw.header.clone();
        if header.kdf.is_legacy() {
            header.kdf = KdfParams::default();
        }
        let salt = kdf::generate_salt();
        header.salt = salt.to_vec();
        let mut kek = kdf::derive_key(new_password.as_bytes(), &salt, &header.kdf)?;
        header.password_wrap = Some(WrappedKey::wrap(&kek, &master_key)?);
        kek.zeroize();
        header.version = FORMAT_V2;

        self.session = Some(Session {
            header,
            payload,
            master_key,
            usage_dirty: false,
        });

        match self.persist() {
            Ok(()) => {
                self.emit(EventType::RecoverySuccess, Outcome::Success, "");
                self.emit(EventType::VaultPasswordChange, Outcome::Success, "");
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.emit(EventType::RecoveryFailed, Outcome::Failure, "");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Delete the vault, its backup, both keychain entries, and — after
    /// the final audit event — the metadata sidecar.
    pub fn remove(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(PassCliError::VaultLocked);
        }

        self.emit(EventType::VaultRemoveAttempt, Outcome::Attempt, "");

        let vault_id = self.vault_id();
        let mut failures = Vec::new();

        if let Err(e) = std::fs::remove_file(&self.vault_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                failures.push(format!("vault file: {e}"));
            }
        }
        match storage::delete_backup(&self.vault_path) {
            Ok(_) => {}
            Err(e) => failures.push(format!("backup file: {e}")),
        }
        if let Err(e) = self.keychain.delete(MASTER_SERVICE, &vault_id) {
            failures.push(format!("cached password: {e}"));
        }

        if !failures.is_empty() {
            self.emit(EventType::VaultRemove, Outcome::Failure, "");
            return Err(PassCliError::CommandFailed(format!(
                "vault removal incomplete — {}",
                failures.join("; ")
            )));
        }

        self.emit(EventType::VaultRemove, Outcome::Success, "");

        // Sidecar goes only after the final event is on disk.
        if let Err(e) = meta::delete(&self.vault_path) {
            self.warn(format!("could not delete vault.meta: {e}"));
        }
        if let Err(e) = self.keychain.delete(AUDIT_SERVICE, &vault_id) {
            self.warn(format!("could not delete audit signing key: {e}"));
        }

        self.audit = None;
        self.session = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------

    /// Verify every entry of the audit log against the signing key in
    /// the keychain. Works on a locked vault.
    pub fn verify_audit(&self) -> Result<AuditReport> {
        let metadata = meta::load(&self.vault_path)?.ok_or_else(|| {
            PassCliError::AuditError("no vault.meta sidecar — audit was never enabled".into())
        })?;
        if !metadata.audit_enabled {
            return Err(PassCliError::AuditError(
                "audit logging is not enabled for this vault".into(),
            ));
        }

        let signing_key = self
            .keychain
            .get(AUDIT_SERVICE, &metadata.vault_id)?
            .ok_or_else(|| {
                PassCliError::AuditError("audit signing key not found in the keychain".into())
            })?;

        let report = audit::verify_file(Path::new(&metadata.audit_log_path), &signing_key)?;
        match report.first_invalid {
            Some(line) => Err(PassCliError::AuditTampered { line }),
            None => Ok(report),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Policy gate with failure rate limiting.
    fn check_policy(&mut self, password: &str) -> Result<()> {
        let now = Instant::now();
        self.limiter.check(now)?;
        if let Err(e) = policy::validate(password) {
            self.limiter.register_failure(now);
            return Err(e);
        }
        Ok(())
    }

    /// Look up the cached master password, if any.
    pub fn cached_password(&self) -> Option<Zeroizing<String>> {
        let bytes = self
            .keychain
            .get(MASTER_SERVICE, &self.vault_id())
            .ok()
            .flatten()?;
        String::from_utf8(bytes).ok().map(Zeroizing::new)
    }

    fn cache_master_password(&mut self, password: &str) {
        if !self.keychain.available() {
            self.warn("OS keychain unavailable — password not cached");
            self.emit(EventType::KeychainStatus, Outcome::Failure, "");
            return;
        }
        let vault_id = self.vault_id();
        match self
            .keychain
            .set(MASTER_SERVICE, &vault_id, password.as_bytes())
        {
            Ok(()) => self.emit(EventType::KeychainStatus, Outcome::Success, ""),
            Err(e) => {
                self.warn(format!("could not cache password: {e}"));
                self.emit(EventType::KeychainStatus, Outcome::Failure, "");
            }
        }
    }

    /// Open the audit logger for `vault_id`, creating the signing key
    /// on first use when `create_key` is set. Returns whether audit is
    /// effectively enabled.
    fn open_audit(&mut self, vault_id: &str, audit_path: &Path, create_key: bool) -> bool {
        if !self.keychain.available() {
            self.warn("OS keychain unavailable — audit logging disabled");
            return false;
        }

        let signing_key = match self.keychain.get(AUDIT_SERVICE, vault_id) {
            Ok(Some(key)) => key,
            Ok(None) if create_key => {
                let key = secure_random(SIGNING_KEY_LEN);
                if let Err(e) = self.keychain.set(AUDIT_SERVICE, vault_id, &key) {
                    self.warn(format!("could not store audit signing key: {e}"));
                    return false;
                }
                key
            }
            Ok(None) => {
                self.warn("audit signing key missing from keychain — audit logging disabled");
                return false;
            }
            Err(e) => {
                self.warn(format!("keychain error: {e} — audit logging disabled"));
                return false;
            }
        };

        self.audit = Some(AuditLog::new(audit_path.to_path_buf(), signing_key));
        true
    }

    /// Initialize audit from the sidecar, before any decryption.
    fn audit_from_sidecar(&mut self) {
        if self.audit.is_some() {
            return;
        }
        match meta::load(&self.vault_path) {
            Ok(Some(metadata)) if metadata.audit_enabled => {
                let path = PathBuf::from(&metadata.audit_log_path);
                let vault_id = metadata.vault_id.clone();
                self.open_audit(&vault_id, &path, true);
            }
            Ok(_) => {}
            Err(e) => self.warn(format!("could not read vault.meta: {e}")),
        }
    }

    /// Rewrite the sidecar (and reopen the logger) to match the
    /// payload, which is authoritative while unlocked.
    fn sync_sidecar(&mut self, payload: &VaultPayload) {
        let in_sync = match meta::load(&self.vault_path) {
            Ok(Some(existing)) => {
                existing.vault_id == payload.vault_id
                    && existing.audit_enabled == payload.audit_enabled
                    && existing.audit_log_path == payload.audit_log_path
            }
            _ => false,
        };

        if !in_sync {
            let metadata = VaultMetadata::new(
                &payload.vault_id,
                payload.audit_enabled,
                &payload.audit_log_path,
            );
            if let Err(e) = meta::save(&metadata, &self.vault_path) {
                self.warn(format!("could not rewrite vault.meta: {e}"));
            }
        }

        if payload.audit_enabled && self.audit.is_none() {
            let path = PathBuf::from(&payload.audit_log_path);
            let vault_id = payload.vault_id.clone();
            self.open_audit(&vault_id, &path, true);
        } else if !payload.audit_enabled {
            self.audit = None;
        }
    }

    /// Encrypt the payload and run the atomic save protocol.
    fn persist(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(PassCliError::VaultLocked)?;
        session.payload.updated_at = Utc::now();

        // Fresh nonce per save; the header is AAD, so it must be
        // serialized before the body is encrypted.
        session.header.payload_nonce = encryption::generate_nonce().to_vec();
        let header_bytes = session.header.serialize()?;

        let mut payload_json = session.payload.to_json()?;
        let nonce = session.header.nonce()?;
        let body = encryption::encrypt(
            session.master_key.as_bytes(),
            &nonce,
            &payload_json,
            &header_bytes,
        );
        payload_json.zeroize();
        let body = body?;

        let envelope = format::assemble(session.header.version, &header_bytes, &body)?;

        // The verifier decrypts and parses the exact bytes read back
        // from the temp file, so a bad disk, cipher, or encoder is
        // caught before the live vault is touched.
        let mut key_copy = *session.master_key.as_bytes();
        let verify = |bytes: &[u8]| -> Result<()> {
            let raw = format::parse(bytes)
                .map_err(|e| PassCliError::VerificationFailed(e.to_string()))?;
            let nonce = raw
                .header
                .nonce()
                .map_err(|e| PassCliError::VerificationFailed(e.to_string()))?;
            let mut plaintext =
                encryption::decrypt(&key_copy, &nonce, &raw.body, &raw.header_bytes)
                    .map_err(|_| {
                        PassCliError::VerificationFailed("temp file failed decryption".into())
                    })?;
            let parsed = VaultPayload::from_json(&plaintext)
                .map_err(|e| PassCliError::VerificationFailed(e.to_string()));
            plaintext.zeroize();
            parsed.map(|_| ())
        };

        let result = storage::atomic_save(&self.vault_path, &envelope, &verify, self.audit.as_ref());
        key_copy.zeroize();
        if result.is_ok() {
            session.usage_dirty = false;
        }
        result
    }

    /// Whether the vault is on a legacy layout (v1 envelope or
    /// below-floor KDF cost). Migration itself only happens through
    /// `change_password`, so the user consents to the new format and,
    /// when recovery is enabled, to the new mnemonic.
    pub fn needs_migration(&self) -> Result<bool> {
        let session = self.session.as_ref().ok_or(PassCliError::VaultLocked)?;
        Ok(session.header.version == FORMAT_V1 || session.header.kdf.is_legacy())
    }
}

impl Drop for VaultService {
    fn drop(&mut self) {
        // Session drop wipes payload and master key on every exit path.
        self.session = None;
    }
}

/// Make a path absolute against the current directory without
/// requiring it to exist.
fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }
}

/// Walk up from `dir` looking for an enclosing git repository.
fn detect_git_repo(dir: &Path) -> Option<String> {
    let mut current = Some(dir);
    while let Some(candidate) = current {
        if candidate.join(".git").exists() {
            return Some(candidate.display().to_string());
        }
        current = candidate.parent();
    }
    None
}
