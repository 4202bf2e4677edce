//! Integration tests for the vault service: init, unlock, CRUD, and
//! the password-change laws.

use std::path::PathBuf;

use pass_cli::crypto::kdf::{KdfAlgorithm, KdfParams};
use pass_cli::errors::PassCliError;
use pass_cli::keychain::MemoryStore;
use pass_cli::vault::{Credential, CredentialUpdate, InitOptions, VaultService};
use tempfile::TempDir;

/// Fast, non-legacy KDF params so tests never trigger an implicit
/// migration and never pay production-level derivation cost.
fn test_kdf() -> KdfParams {
    KdfParams {
        algorithm: KdfAlgorithm::Argon2id,
        iterations: 1,
        memory_kib: 8_192,
        parallelism: 1,
    }
}

fn test_options() -> InitOptions {
    InitOptions {
        kdf: test_kdf(),
        audit: false,
        ..InitOptions::default()
    }
}

fn service_at(dir: &TempDir) -> (VaultService, PathBuf) {
    let path = dir.path().join("vault.enc");
    let service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));
    (service, path)
}

const PASSWORD: &str = "CorrectHorse7!Staple";

// ---------------------------------------------------------------------------
// Init and re-open round-trip
// ---------------------------------------------------------------------------

#[test]
fn init_then_unlock_roundtrip() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = service_at(&dir);

    service.init(PASSWORD, &test_options()).unwrap();
    assert!(path.exists());
    service.lock().unwrap();
    assert!(!service.is_unlocked());

    service.unlock(PASSWORD).unwrap();
    assert!(service.is_unlocked());
    assert!(service.list().unwrap().is_empty());
}

#[test]
fn init_refuses_existing_vault() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();

    let (mut second, _) = service_at(&dir);
    assert!(matches!(
        second.init(PASSWORD, &test_options()),
        Err(PassCliError::VaultAlreadyExists(_))
    ));
}

#[test]
fn init_rejects_weak_password() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = service_at(&dir);

    let err = service.init("alllowercase", &test_options()).unwrap_err();
    assert!(matches!(err, PassCliError::WeakPassword(_)));
    assert!(!path.exists());
}

// ---------------------------------------------------------------------------
// Wrong password (scenario: failed unlock, then retry succeeds)
// ---------------------------------------------------------------------------

#[test]
fn wrong_password_fails_then_retry_succeeds() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service.lock().unwrap();

    assert!(matches!(
        service.unlock("WrongPass9!Staple"),
        Err(PassCliError::AuthenticationFailed)
    ));
    // No save happened, so no backup should have appeared.
    assert!(!pass_cli::vault::storage::backup_path(&path).exists());

    service.unlock(PASSWORD).unwrap();
    assert!(service.is_unlocked());
}

// ---------------------------------------------------------------------------
// Credential CRUD
// ---------------------------------------------------------------------------

#[test]
fn add_get_update_delete() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();

    service
        .add(Credential::new("github", "octocat", "p1".into()))
        .unwrap();

    let credential = service.get("github").unwrap();
    assert_eq!(credential.username, "octocat");
    assert_eq!(credential.password, "p1");

    service
        .update(
            "github",
            CredentialUpdate {
                password: Some("p2".into()),
                url: Some("https://github.com".into()),
                ..CredentialUpdate::default()
            },
        )
        .unwrap();
    let credential = service.get("github").unwrap();
    assert_eq!(credential.password, "p2");
    assert_eq!(credential.url.as_deref(), Some("https://github.com"));

    service.delete("github").unwrap();
    assert!(matches!(
        service.get("github"),
        Err(PassCliError::CredentialNotFound(_))
    ));
}

#[test]
fn credentials_survive_lock_unlock() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service
        .add(Credential::new("github", "u", "p1".into()))
        .unwrap();

    service.lock().unwrap();
    service.unlock(PASSWORD).unwrap();

    let credential = service.get("github").unwrap();
    assert_eq!(credential.password, "p1");
}

#[test]
fn duplicate_add_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service
        .add(Credential::new("github", "u", "p".into()))
        .unwrap();

    assert!(matches!(
        service.add(Credential::new("github", "u2", "p2".into())),
        Err(PassCliError::CredentialAlreadyExists(_))
    ));
}

#[test]
fn operations_require_unlock() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service.lock().unwrap();

    assert!(matches!(service.get("x"), Err(PassCliError::VaultLocked)));
    assert!(matches!(service.list(), Err(PassCliError::VaultLocked)));
    assert!(matches!(
        service.delete("x"),
        Err(PassCliError::VaultLocked)
    ));
    assert!(matches!(service.remove(), Err(PassCliError::VaultLocked)));
}

// ---------------------------------------------------------------------------
// Usage tracking is coalesced
// ---------------------------------------------------------------------------

#[test]
fn usage_is_persisted_on_lock_not_per_read() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service
        .add(Credential::new("github", "u", "p".into()))
        .unwrap();

    let bytes_after_add = std::fs::read(&path).unwrap();

    // Reads must not write the vault file.
    service.get("github").unwrap();
    service.get("github").unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), bytes_after_add);

    // Lock flushes the coalesced usage.
    service.lock().unwrap();
    assert_ne!(std::fs::read(&path).unwrap(), bytes_after_add);

    service.unlock(PASSWORD).unwrap();
    let credential = service.get("github").unwrap();
    let total: u64 = credential
        .usage_locations
        .values()
        .map(|u| u.access_count)
        .sum();
    assert!(total >= 2, "persisted usage should count both reads");
}

// ---------------------------------------------------------------------------
// Password change laws
// ---------------------------------------------------------------------------

#[test]
fn change_password_then_back_restores_original() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service
        .add(Credential::new("github", "u", "p".into()))
        .unwrap();

    let other = "NewerHorse8!Staple";
    assert!(service.change_password(other).unwrap().is_none());
    service.lock().unwrap();

    service.unlock(other).unwrap();
    assert!(service.change_password(PASSWORD).unwrap().is_none());
    service.lock().unwrap();

    // A -> B -> A: the original password opens the vault again.
    service.unlock(PASSWORD).unwrap();
    assert_eq!(service.get("github").unwrap().password, "p");
}

#[test]
fn old_password_stops_working_after_change() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service.change_password("NewerHorse8!Staple").unwrap();
    service.lock().unwrap();

    assert!(matches!(
        service.unlock(PASSWORD),
        Err(PassCliError::AuthenticationFailed)
    ));
    service.unlock("NewerHorse8!Staple").unwrap();
}

// ---------------------------------------------------------------------------
// Legacy migration
// ---------------------------------------------------------------------------

#[test]
fn legacy_kdf_is_upgraded_on_password_change() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = service_at(&dir);

    // A vault created at the legacy PBKDF2 cost.
    let options = InitOptions {
        kdf: KdfParams::pbkdf2(100_000),
        audit: false,
        ..InitOptions::default()
    };
    service.init(PASSWORD, &options).unwrap();
    service
        .add(Credential::new("github", "u", "p".into()))
        .unwrap();

    // Password change migrates to the current cost in one save.
    service.change_password("NewerHorse8!Staple").unwrap();
    service.lock().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let raw = pass_cli::vault::format::parse(&bytes).unwrap();
    assert!(!raw.header.kdf.is_legacy());

    service.unlock("NewerHorse8!Staple").unwrap();
    assert_eq!(service.get("github").unwrap().password, "p");
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[test]
fn remove_deletes_vault_and_sidecars() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service
        .add(Credential::new("github", "u", "p".into()))
        .unwrap();

    service.remove().unwrap();
    assert!(!path.exists());
    assert!(!pass_cli::vault::storage::backup_path(&path).exists());
    assert!(pass_cli::vault::meta::load(&path).unwrap().is_none());
    assert!(!service.is_unlocked());
}

// ---------------------------------------------------------------------------
// Boundary: empty vault, large payload
// ---------------------------------------------------------------------------

#[test]
fn empty_vault_roundtrips() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init(PASSWORD, &test_options()).unwrap();
    service.lock().unwrap();
    service.unlock(PASSWORD).unwrap();
    assert!(service.list().unwrap().is_empty());
}

#[test]
fn unicode_only_password_passes_policy() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = service_at(&dir);
    service.init("Ärger7Straße€¥münze", &test_options()).unwrap();
    service.lock().unwrap();
    service.unlock("Ärger7Straße€¥münze").unwrap();
}
