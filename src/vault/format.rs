//! Binary vault envelope and key wrapping.
//!
//! A `vault.enc` file has this layout:
//!
//! ```text
//! [PVLT: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][ciphertext + 16-byte tag]
//! ```
//!
//! - **Magic** (`PVLT`): identifies the file as a pass-cli vault.
//! - **Version**: envelope format version (`2` current, `1` legacy).
//! - **Header length**: little-endian u32 delimiting the header JSON.
//! - **Header JSON**: serialized `VaultHeader` — KDF params, salt,
//!   nonces, wrapped master key, optional recovery blob.
//! - **Body**: AES-256-GCM ciphertext of the payload JSON, with the
//!   raw header bytes as associated data, so the tag authenticates
//!   both body and header.
//!
//! v2 encrypts the payload under a random 32-byte master key that the
//! header carries wrapped under the password-derived KEK (and, when
//! recovery is on, also under the recovery key).  v1 encrypted the
//! payload directly under the password-derived key; it is read-only
//! compatible and upgraded during password change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::encryption::{self, NONCE_LEN};
use crate::crypto::kdf::KdfParams;
use crate::crypto::keys::MasterKey;
use crate::errors::{PassCliError, Result};
use crate::recovery::RecoveryBlob;

/// Magic bytes at the start of every vault file.
pub const MAGIC: &[u8; 4] = b"PVLT";

/// Legacy envelope version: payload encrypted directly under the
/// password-derived key.
pub const FORMAT_V1: u8 = 1;

/// Current envelope version: wrapped master key, recovery support.
pub const FORMAT_V2: u8 = 2;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

/// A 32-byte key encrypted under another key, with its own nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// Encrypt `key` under `kek` with a fresh nonce.
    pub fn wrap(kek: &[u8], key: &MasterKey) -> Result<Self> {
        let nonce = encryption::generate_nonce();
        let ciphertext = encryption::encrypt(kek, &nonce, key.as_bytes(), b"")?;
        Ok(Self {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt the wrapped key, failing with `AuthenticationFailed`
    /// when `kek` is not the key it was wrapped under.
    pub fn unwrap_key(&self, kek: &[u8]) -> Result<MasterKey> {
        let nonce: [u8; NONCE_LEN] = self
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| PassCliError::CorruptedFile("bad wrap nonce length".into()))?;

        let mut plaintext = encryption::decrypt(kek, &nonce, &self.ciphertext, b"")?;
        let key = MasterKey::from_slice(&plaintext)
            .ok_or_else(|| PassCliError::CorruptedFile("bad wrapped key length".into()));
        use zeroize::Zeroize;
        plaintext.zeroize();
        key
    }
}

/// Metadata stored in the clear (but authenticated) at the beginning
/// of a vault file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultHeader {
    /// Envelope format version. Mirrors the envelope version byte.
    pub version: u8,

    /// KDF algorithm and cost parameters for the password KEK.
    pub kdf: KdfParams,

    /// Salt for the password KEK derivation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// Nonce for the payload ciphertext.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub payload_nonce: Vec<u8>,

    /// The vault master key wrapped under the password KEK. Absent in
    /// v1 envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_wrap: Option<WrappedKey>,

    /// The vault master key wrapped under the recovery key. Present
    /// iff recovery is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_wrap: Option<WrappedKey>,

    /// Recovery challenge material. Readable before unlock; contains
    /// nothing recoverable without the challenge words.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryBlob>,

    pub created_at: DateTime<Utc>,
}

impl VaultHeader {
    /// Build a fresh v2 header with a random payload nonce.
    pub fn new_v2(kdf: KdfParams, salt: Vec<u8>) -> Self {
        Self {
            version: FORMAT_V2,
            kdf,
            salt,
            payload_nonce: encryption::generate_nonce().to_vec(),
            password_wrap: None,
            recovery_wrap: None,
            recovery: None,
            created_at: Utc::now(),
        }
    }

    /// The payload nonce as a fixed-size array.
    pub fn nonce(&self) -> Result<[u8; NONCE_LEN]> {
        self.payload_nonce
            .as_slice()
            .try_into()
            .map_err(|_| PassCliError::CorruptedFile("bad payload nonce length".into()))
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| PassCliError::SerializationError(format!("header: {e}")))
    }
}

/// A vault file split into its parts, raw header bytes preserved so
/// the body can be decrypted with the exact AAD it was written with.
pub struct RawEnvelope {
    pub version: u8,
    pub header: VaultHeader,
    pub header_bytes: Vec<u8>,
    pub body: Vec<u8>,
}

/// Assemble the full envelope bytes from serialized parts.
pub fn assemble(version: u8, header_bytes: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        PassCliError::SerializationError(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(PREFIX_LEN + header_bytes.len() + body.len());
    buf.extend_from_slice(MAGIC);
    buf.push(version);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(header_bytes);
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Parse envelope bytes into header + body, validating the framing.
pub fn parse(data: &[u8]) -> Result<RawEnvelope> {
    if data.len() < PREFIX_LEN {
        return Err(PassCliError::CorruptedFile(
            "file too small to be a vault".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(PassCliError::CorruptedFile("missing PVLT magic bytes".into()));
    }

    let version = data[4];
    if version != FORMAT_V1 && version != FORMAT_V2 {
        return Err(PassCliError::CorruptedFile(format!(
            "unsupported envelope version {version}"
        )));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| PassCliError::CorruptedFile("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32)
        .map_err(|_| PassCliError::CorruptedFile("header length overflow".into()))?;

    let header_end = PREFIX_LEN
        .checked_add(header_len)
        .ok_or_else(|| PassCliError::CorruptedFile("header length overflow".into()))?;
    if header_end > data.len() {
        return Err(PassCliError::CorruptedFile(
            "header length exceeds file size".into(),
        ));
    }

    let header_bytes = data[PREFIX_LEN..header_end].to_vec();
    let body = data[header_end..].to_vec();

    let header: VaultHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| PassCliError::CorruptedFile(format!("header JSON: {e}")))?;

    if header.version != version {
        return Err(PassCliError::CorruptedFile(format!(
            "header version {} disagrees with envelope version {version}",
            header.version
        )));
    }

    Ok(RawEnvelope {
        version,
        header,
        header_bytes,
        body,
    })
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
