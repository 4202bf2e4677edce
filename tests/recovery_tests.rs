//! End-to-end recovery tests: mnemonic at init, challenge words back
//! to an unlocked vault with a new master password.

use std::fs;

use pass_cli::crypto::kdf::{KdfAlgorithm, KdfParams};
use pass_cli::errors::PassCliError;
use pass_cli::keychain::MemoryStore;
use pass_cli::vault::{format, Credential, InitOptions, VaultService};
use tempfile::TempDir;

const PASSWORD: &str = "CorrectHorse7!Staple";
const NEW_PASSWORD: &str = "NewerHorse8!Staple";

fn recovery_options(passphrase: Option<&str>) -> InitOptions {
    InitOptions {
        kdf: KdfParams {
            algorithm: KdfAlgorithm::Argon2id,
            iterations: 1,
            memory_kib: 8_192,
            parallelism: 1,
        },
        audit: true,
        recovery: true,
        passphrase: passphrase.map(|p| zeroize::Zeroizing::new(p.to_string())),
        ..InitOptions::default()
    }
}

/// Read the challenge words for a vault from its envelope header and
/// the mnemonic returned at init.
fn challenge_words(vault_path: &std::path::Path, mnemonic: &str) -> Vec<String> {
    let bytes = fs::read(vault_path).unwrap();
    let raw = format::parse(&bytes).unwrap();
    let blob = raw.header.recovery.as_ref().unwrap();
    let words: Vec<&str> = mnemonic.split(' ').collect();
    blob.challenge_positions
        .iter()
        .map(|&p| words[usize::from(p)].to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[test]
fn recover_resets_password_and_preserves_credentials() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));

    let mnemonic = service
        .init(PASSWORD, &recovery_options(None))
        .unwrap()
        .expect("init with recovery returns a mnemonic");
    service
        .add(Credential::new("github", "u", "p1".into()))
        .unwrap();
    service.lock().unwrap();

    let words = challenge_words(&path, &mnemonic);
    service.recover(&words, None, NEW_PASSWORD).unwrap();
    assert!(service.is_unlocked());
    assert_eq!(service.get("github").unwrap().password, "p1");
    service.lock().unwrap();

    // The new password works, the old one does not.
    service.unlock(NEW_PASSWORD).unwrap();
    service.lock().unwrap();
    assert!(matches!(
        service.unlock(PASSWORD),
        Err(PassCliError::AuthenticationFailed)
    ));

    // The recovery is on the audit record.
    let log = fs::read_to_string(dir.path().join("audit.log")).unwrap();
    assert!(log.contains("recovery_success"));
}

#[test]
fn recovery_with_passphrase_requires_it() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));

    let mnemonic = service
        .init(PASSWORD, &recovery_options(Some("horse battery")))
        .unwrap()
        .unwrap();
    service.lock().unwrap();

    let words = challenge_words(&path, &mnemonic);

    assert!(matches!(
        service.recover(&words, None, NEW_PASSWORD),
        Err(PassCliError::DecryptionFailed)
    ));
    assert!(matches!(
        service.recover(&words, Some("wrong phrase"), NEW_PASSWORD),
        Err(PassCliError::DecryptionFailed)
    ));

    service
        .recover(&words, Some("horse battery"), NEW_PASSWORD)
        .unwrap();
}

// ---------------------------------------------------------------------------
// Recovery survives a password change
// ---------------------------------------------------------------------------

#[test]
fn recovery_still_works_after_password_change() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));

    let mnemonic = service
        .init(PASSWORD, &recovery_options(None))
        .unwrap()
        .unwrap();
    service
        .add(Credential::new("github", "u", "p1".into()))
        .unwrap();
    service.change_password("Interim0!Password").unwrap();
    service.lock().unwrap();

    // The original mnemonic still recovers the vault.
    let words = challenge_words(&path, &mnemonic);
    service.recover(&words, None, NEW_PASSWORD).unwrap();
    assert_eq!(service.get("github").unwrap().password, "p1");
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[test]
fn wrong_words_fail_without_unlocking() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));
    service.init(PASSWORD, &recovery_options(None)).unwrap();
    service.lock().unwrap();

    let wrong: Vec<String> = ["abandon", "ability", "able", "about", "above", "absent"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    assert!(matches!(
        service.recover(&wrong, None, NEW_PASSWORD),
        Err(PassCliError::DecryptionFailed)
    ));
    assert!(!service.is_unlocked());

    let log = fs::read_to_string(dir.path().join("audit.log")).unwrap();
    assert!(log.contains("recovery_failed"));
}

#[test]
fn recovery_disabled_vault_refuses() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path, Box::new(MemoryStore::new()));

    let mut options = recovery_options(None);
    options.recovery = false;
    assert!(service.init(PASSWORD, &options).unwrap().is_none());
    service.lock().unwrap();

    let words: Vec<String> = ["abandon"; 6].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        service.recover(&words, None, NEW_PASSWORD),
        Err(PassCliError::RecoveryDisabled)
    ));
}

#[test]
fn recover_rejects_weak_new_password() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));
    let mnemonic = service
        .init(PASSWORD, &recovery_options(None))
        .unwrap()
        .unwrap();
    service.lock().unwrap();

    let words = challenge_words(&path, &mnemonic);
    assert!(matches!(
        service.recover(&words, None, "weakpw"),
        Err(PassCliError::WeakPassword(_))
    ));
}
