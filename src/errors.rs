use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in pass-cli.
#[derive(Debug, Error)]
pub enum PassCliError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Incorrect password")]
    AuthenticationFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Storage errors ---
    #[error("Save failed: {0}. Your vault was not modified.")]
    VerificationFailed(String),

    #[error("Disk is full — free some space and retry. Your vault was not modified.")]
    DiskSpaceExhausted,

    #[error("Permission denied writing {0} — check file ownership. Your vault was not modified.")]
    PermissionDenied(PathBuf),

    #[error("Vault and temp file are on different filesystems — atomic rename is not possible. Move the vault to a single filesystem.")]
    FilesystemNotAtomic,

    #[error("Vault file is corrupted: {0}. Restore from the .backup file if one exists.")]
    CorruptedFile(String),

    #[error("Vault file is missing or unreadable, but a backup exists at {0}")]
    BackupAvailable(PathBuf),

    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    // --- Policy errors ---
    #[error("Password too weak — missing: {}", .0.join(", "))]
    WeakPassword(Vec<String>),

    #[error("Too many weak-password attempts — wait {0} seconds before retrying")]
    PolicyCooldown(u64),

    // --- Recovery errors ---
    #[error("Recovery is not enabled for this vault — restore from backup or the OS keychain instead")]
    RecoveryDisabled,

    #[error("Recovery metadata is corrupted: {0}")]
    MetadataCorrupted(String),

    #[error("'{0}' is not a BIP39 word")]
    InvalidWord(String),

    #[error("Incorrect recovery words")]
    DecryptionFailed,

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    // --- Keychain errors ---
    #[error("OS keychain unavailable: {0}")]
    KeychainUnavailable(String),

    // --- Audit errors ---
    #[error("Audit log is tampered — entry {line} failed HMAC verification")]
    AuditTampered { line: usize },

    #[error("Audit error: {0}")]
    AuditError(String),

    // --- Credential errors ---
    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),

    #[error("Credential '{0}' already exists (use `update` to change it)")]
    CredentialAlreadyExists(String),

    // --- Service state errors ---
    #[error("Vault is locked — unlock it first")]
    VaultLocked,

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,
}

impl PassCliError {
    /// Map an error to the process exit code contract:
    /// 1 user error, 2 system error, 3 security error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuditTampered { .. } => 3,
            Self::Io(_)
            | Self::DiskSpaceExhausted
            | Self::PermissionDenied(_)
            | Self::FilesystemNotAtomic
            | Self::VerificationFailed(_)
            | Self::SerializationError(_)
            | Self::KeychainUnavailable(_)
            | Self::AuditError(_) => 2,
            _ => 1,
        }
    }
}

/// Convenience type alias for pass-cli results.
pub type Result<T> = std::result::Result<T, PassCliError>;
