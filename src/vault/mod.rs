//! Vault module — the encrypted credential store.
//!
//! This module provides:
//! - `VaultPayload` and `Credential` types (`payload`)
//! - The binary envelope with wrapped master keys (`format`)
//! - The atomic save protocol and backup handling (`storage`)
//! - The plaintext metadata sidecar (`meta`)
//! - The high-level `VaultService` coordinating all of it (`service`)

pub mod format;
pub mod meta;
pub mod payload;
pub mod service;
pub mod storage;

// Re-export the most commonly used items.
pub use format::{VaultHeader, WrappedKey};
pub use meta::VaultMetadata;
pub use payload::{Credential, CredentialSummary, VaultPayload};
pub use service::{CredentialUpdate, InitOptions, VaultService};
