//! Decrypted vault contents: the credential map and its companions.
//!
//! The payload exists only in memory between unlock and lock; on disk
//! it lives exclusively inside the vault envelope ciphertext.  Unknown
//! JSON fields are preserved through a flattened extras map so a vault
//! written by a newer release survives a round-trip through this one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::errors::{PassCliError, Result};

/// Where and how often a credential has been used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub access_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
}

/// A single stored credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Service name. Always equals the key this credential is stored
    /// under in the payload map.
    pub service: String,

    pub username: String,

    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_secret: Option<String>,

    /// Absolute directory path -> usage statistics.
    #[serde(default)]
    pub usage_locations: BTreeMap<String, UsageRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Fields written by newer releases, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credential {
    pub fn new(service: &str, username: &str, password: String) -> Self {
        let now = Utc::now();
        Self {
            service: service.to_string(),
            username: username.to_string(),
            password,
            url: None,
            notes: None,
            category: None,
            totp_secret: None,
            usage_locations: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            extra: serde_json::Map::new(),
        }
    }

    /// Record an access from `directory`, bumping the counter.
    pub fn record_usage(&mut self, directory: &str, git_repo: Option<String>) {
        let record = self.usage_locations.entry(directory.to_string()).or_default();
        record.access_count += 1;
        record.last_accessed = Some(Utc::now());
        if git_repo.is_some() {
            record.git_repo = git_repo;
        }
    }

    /// Overwrite secret-bearing fields with zeros.
    fn wipe(&mut self) {
        self.password.zeroize();
        if let Some(totp) = self.totp_secret.as_mut() {
            totp.zeroize();
        }
        if let Some(notes) = self.notes.as_mut() {
            notes.zeroize();
        }
    }
}

/// Lightweight listing entry (no password material).
#[derive(Debug, Clone)]
pub struct CredentialSummary {
    pub service: String,
    pub username: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The decrypted contents of a vault file.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultPayload {
    /// Service name -> credential. The map key is authoritative.
    #[serde(default)]
    pub credentials: BTreeMap<String, Credential>,

    /// Canonical audit configuration while the vault is unlocked.
    pub audit_enabled: bool,
    pub audit_log_path: String,

    /// Absolute path of the vault file this payload belongs to.
    pub vault_id: String,

    /// Mirrors whether the envelope header carries a recovery blob.
    #[serde(default)]
    pub recovery_enabled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VaultPayload {
    pub fn new(vault_id: &str, audit_enabled: bool, audit_log_path: &str) -> Self {
        let now = Utc::now();
        Self {
            credentials: BTreeMap::new(),
            audit_enabled,
            audit_log_path: audit_log_path.to_string(),
            vault_id: vault_id.to_string(),
            recovery_enabled: false,
            created_at: now,
            updated_at: now,
            extra: serde_json::Map::new(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| PassCliError::SerializationError(format!("payload: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PassCliError::SerializationError(format!("payload: {e}")))
    }

    /// Sorted summaries of every credential.
    pub fn summaries(&self) -> Vec<CredentialSummary> {
        self.credentials
            .values()
            .map(|c| CredentialSummary {
                service: c.service.clone(),
                username: c.username.clone(),
                category: c.category.clone(),
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
            .collect()
    }

    /// Zero every secret-bearing field, then drop the map.
    pub fn wipe(&mut self) {
        for credential in self.credentials.values_mut() {
            credential.wipe();
        }
        self.credentials.clear();
    }
}

impl Drop for VaultPayload {
    fn drop(&mut self) {
        self.wipe();
    }
}
