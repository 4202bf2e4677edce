//! Crash-consistency tests for the atomic save protocol, exercised
//! through the service where possible and through filesystem
//! manipulation where a crash must be simulated.

use std::fs;

use pass_cli::crypto::encryption;
use pass_cli::crypto::kdf::{KdfAlgorithm, KdfParams};
use pass_cli::crypto::keys::MasterKey;
use pass_cli::errors::PassCliError;
use pass_cli::keychain::MemoryStore;
use pass_cli::vault::format::{self, VaultHeader, WrappedKey, FORMAT_V2};
use pass_cli::vault::payload::{Credential, VaultPayload};
use pass_cli::vault::{storage, InitOptions, VaultService};
use tempfile::TempDir;

const PASSWORD: &str = "CorrectHorse7!Staple";

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

fn prepared_vault(dir: &TempDir) -> (VaultService, std::path::PathBuf) {
    let path = dir.path().join("vault.enc");
    let mut service = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));
    service.init(PASSWORD, &test_options()).unwrap();
    service
        .add(Credential::new("github", "u", "p1".into()))
        .unwrap();
    (service, path)
}

// ---------------------------------------------------------------------------
// Backup rotation across saves
// ---------------------------------------------------------------------------

#[test]
fn each_save_keeps_exactly_one_backup_generation() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = prepared_vault(&dir);

    let generation_1 = fs::read(&path).unwrap();
    service
        .add(Credential::new("gitlab", "u", "p2".into()))
        .unwrap();
    let generation_2 = fs::read(&path).unwrap();

    // The backup holds exactly the pre-save generation.
    let backup = storage::backup_path(&path);
    assert_eq!(fs::read(&backup).unwrap(), generation_1);

    service
        .add(Credential::new("sourcehut", "u", "p3".into()))
        .unwrap();
    assert_eq!(fs::read(&backup).unwrap(), generation_2);

    // N-1 means one generation only: no second backup file exists.
    let backups = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().contains(".backup"))
        .count();
    assert_eq!(backups, 1);
}

#[test]
fn backup_is_deleted_on_next_successful_unlock() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = prepared_vault(&dir);
    service
        .add(Credential::new("gitlab", "u", "p".into()))
        .unwrap();
    assert!(storage::backup_path(&path).exists());

    service.lock().unwrap();
    service.unlock(PASSWORD).unwrap();
    assert!(!storage::backup_path(&path).exists());
}

#[test]
fn no_orphan_temp_after_any_mutation() {
    let dir = TempDir::new().unwrap();
    let (mut service, _path) = prepared_vault(&dir);
    service
        .add(Credential::new("gitlab", "u", "p".into()))
        .unwrap();
    service.delete("gitlab").unwrap();

    let temps = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
        .count();
    assert_eq!(temps, 0);
}

// ---------------------------------------------------------------------------
// Simulated crash between backup rotation and live rename
// ---------------------------------------------------------------------------

#[test]
fn crash_between_rotations_is_recoverable_from_backup() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = prepared_vault(&dir);
    service.lock().unwrap();

    // Crash window: the live file became the backup, the temp never
    // made it to the live name.
    let pre_crash = fs::read(&path).unwrap();
    fs::rename(&path, storage::backup_path(&path)).unwrap();

    // The next unlock must not invent a vault; it reports the backup.
    let mut recovered = VaultService::with_store(path.clone(), Box::new(MemoryStore::new()));
    match recovered.unlock(PASSWORD) {
        Err(PassCliError::BackupAvailable(backup)) => {
            assert!(backup.exists());
        }
        other => panic!("expected BackupAvailable, got {other:?}"),
    }

    // User-driven restore promotes the backup; unlock then works.
    storage::restore_backup(&path).unwrap();
    recovered.unlock(PASSWORD).unwrap();
    assert_eq!(fs::read(&path).unwrap(), pre_crash);
    assert_eq!(recovered.get("github").unwrap().password, "p1");
}

// ---------------------------------------------------------------------------
// Tampered vault file
// ---------------------------------------------------------------------------

#[test]
fn flipped_ciphertext_bit_fails_unlock() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = prepared_vault(&dir);
    service.lock().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        service.unlock(PASSWORD),
        Err(PassCliError::AuthenticationFailed)
    ));
}

#[test]
fn mangled_header_fails_parse() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = prepared_vault(&dir);
    service.lock().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        service.unlock(PASSWORD),
        Err(PassCliError::CorruptedFile(_))
    ));
}

#[test]
fn header_tampering_is_caught_by_the_tag() {
    let dir = TempDir::new().unwrap();
    let (mut service, path) = prepared_vault(&dir);
    service.lock().unwrap();

    // Rewrite the header with an extra recovery flag flipped off/on:
    // the envelope still parses, but the AAD no longer matches.
    let bytes = fs::read(&path).unwrap();
    let raw = format::parse(&bytes).unwrap();
    let mut header_json: serde_json::Value =
        serde_json::from_slice(&raw.header_bytes).unwrap();
    header_json["created_at"] = serde_json::json!("1999-01-01T00:00:00Z");
    let forged_header = serde_json::to_vec(&header_json).unwrap();
    let forged = format::assemble(raw.version, &forged_header, &raw.body).unwrap();
    fs::write(&path, forged).unwrap();

    assert!(matches!(
        service.unlock(PASSWORD),
        Err(PassCliError::AuthenticationFailed) | Err(PassCliError::CorruptedFile(_))
    ));
}

// ---------------------------------------------------------------------------
// Boundary: a payload with 10 000 credentials round-trips
// ---------------------------------------------------------------------------

#[test]
fn ten_thousand_credentials_roundtrip() {
    let mut payload = VaultPayload::new("/v/vault.enc", false, "");
    for i in 0..10_000 {
        let name = format!("service-{i}");
        payload
            .credentials
            .insert(name.clone(), Credential::new(&name, "user", format!("pw-{i}")));
    }

    let master = MasterKey::generate();
    let kek = [0x33u8; 32];
    let mut header = VaultHeader::new_v2(test_kdf(), vec![0u8; 32]);
    header.password_wrap = Some(WrappedKey::wrap(&kek, &master).unwrap());

    let header_bytes = header.serialize().unwrap();
    let nonce = header.nonce().unwrap();
    let body = encryption::encrypt(
        master.as_bytes(),
        &nonce,
        &payload.to_json().unwrap(),
        &header_bytes,
    )
    .unwrap();
    let envelope = format::assemble(FORMAT_V2, &header_bytes, &body).unwrap();

    let raw = format::parse(&envelope).unwrap();
    let unwrapped = raw
        .header
        .password_wrap
        .as_ref()
        .unwrap()
        .unwrap_key(&kek)
        .unwrap();
    let plaintext = encryption::decrypt(
        unwrapped.as_bytes(),
        &raw.header.nonce().unwrap(),
        &raw.body,
        &raw.header_bytes,
    )
    .unwrap();
    let restored = VaultPayload::from_json(&plaintext).unwrap();
    assert_eq!(restored.credentials.len(), 10_000);
    assert_eq!(restored.credentials["service-9999"].password, "pw-9999");
}
