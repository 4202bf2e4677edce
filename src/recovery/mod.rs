//! BIP39 password recovery.
//!
//! At vault creation the user can opt into a 24-word recovery
//! mnemonic.  Six of the positions become the *challenge*: to recover,
//! the user supplies exactly those six words (2^66 combinations, each
//! attempt paying full KDF cost).  The other eighteen *stored* words
//! are kept encrypted under a key derived from the challenge words, so
//! the vault itself never contains enough to reconstruct the mnemonic.
//!
//! Key graph:
//!
//! ```text
//! challenge words (+passphrase) --KDF--> challenge_key --> stored words
//! full mnemonic  (+passphrase)  --KDF--> recovery_kek  --> recovery key
//! recovery key --------------------------------------> master key (envelope header)
//! ```
//!
//! The recovery key is a random 32-byte value generated at setup; the
//! envelope header wraps the vault master key under it, which is what
//! makes recovery an unlock path rather than a password replacement.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::encryption::{self, NONCE_LEN};
use crate::crypto::kdf::{self, KdfParams, SALT_LEN};
use crate::crypto::keys::MasterKey;
use crate::errors::{PassCliError, Result};
use crate::vault::format::{base64_decode, base64_encode};

/// Words in a full mnemonic (256 bits of entropy).
pub const WORD_COUNT: usize = 24;

/// Words the user must supply at recovery.
pub const CHALLENGE_COUNT: usize = 6;

/// Current recovery blob schema version.
pub const RECOVERY_VERSION: u32 = 2;

/// Iterations of the BIP39 seed stretch (fixed by the standard).
const BIP39_SEED_ROUNDS: u32 = 2048;

/// Recovery material persisted in the clear, authenticated vault
/// header.  Contains two ciphertexts and their salts — nothing here is
/// recoverable without the challenge words.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryBlob {
    pub enabled: bool,
    pub version: u32,

    /// Whether a BIP39 passphrase was set. The passphrase itself is
    /// never persisted.
    pub passphrase_required: bool,

    /// Sorted, distinct positions in [0, 23] the user must answer.
    pub challenge_positions: Vec<u8>,

    /// KDF used for both the challenge key and the recovery KEK.
    pub kdf: KdfParams,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt_challenge: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt_recovery: Vec<u8>,

    /// The 18 non-challenge words, JSON-encoded and encrypted under
    /// the challenge key.
    pub stored_words: WrappedBlob,

    /// The 32-byte recovery key encrypted under the recovery KEK.
    pub recovery_key: WrappedBlob,
}

/// A ciphertext with its nonce. Same shape as `WrappedKey` but for
/// variable-length plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedBlob {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,
}

impl RecoveryBlob {
    /// Structural invariants, checked before any cryptographic work.
    pub fn validate(&self) -> Result<()> {
        if self.challenge_positions.len() != CHALLENGE_COUNT {
            return Err(PassCliError::MetadataCorrupted(format!(
                "expected {CHALLENGE_COUNT} challenge positions, found {}",
                self.challenge_positions.len()
            )));
        }
        let mut seen = [false; WORD_COUNT];
        for &pos in &self.challenge_positions {
            let index = usize::from(pos);
            if index >= WORD_COUNT {
                return Err(PassCliError::MetadataCorrupted(format!(
                    "challenge position {pos} out of range"
                )));
            }
            if seen[index] {
                return Err(PassCliError::MetadataCorrupted(format!(
                    "duplicate challenge position {pos}"
                )));
            }
            seen[index] = true;
        }
        if !self.challenge_positions.windows(2).all(|w| w[0] < w[1]) {
            return Err(PassCliError::MetadataCorrupted(
                "challenge positions are not sorted".into(),
            ));
        }
        if self.salt_challenge.len() != SALT_LEN || self.salt_recovery.len() != SALT_LEN {
            return Err(PassCliError::MetadataCorrupted("bad salt length".into()));
        }
        if self.salt_challenge == self.salt_recovery {
            return Err(PassCliError::MetadataCorrupted(
                "challenge and recovery salts are identical".into(),
            ));
        }
        for blob in [&self.stored_words, &self.recovery_key] {
            if blob.nonce.len() != NONCE_LEN {
                return Err(PassCliError::MetadataCorrupted("bad nonce length".into()));
            }
            if blob.ciphertext.is_empty() {
                return Err(PassCliError::MetadataCorrupted("missing ciphertext".into()));
            }
        }
        Ok(())
    }
}

/// Everything produced by recovery setup.
pub struct RecoverySetup {
    /// The 24 words, space-joined. Shown to the user exactly once.
    pub mnemonic: Zeroizing<String>,

    pub blob: RecoveryBlob,

    /// The random recovery key. The caller wraps the vault master key
    /// under it and then drops it.
    pub recovery_key: MasterKey,
}

/// Uniformly select 6 distinct sorted positions from [0, 23].
pub fn select_challenge_positions() -> Vec<u8> {
    let sampled = rand::seq::index::sample(&mut rand::rng(), WORD_COUNT, CHALLENGE_COUNT);
    let mut positions: Vec<u8> = sampled.iter().map(|i| i as u8).collect();
    positions.sort_unstable();
    positions
}

/// The challenge positions in a randomized prompt order.
///
/// The shuffle only resists shoulder-surfing memorization of the
/// prompt sequence; the positions themselves are already public in
/// the blob, so a non-crypto RNG is fine here.
pub fn shuffled_prompt_order(blob: &RecoveryBlob) -> Vec<u8> {
    let mut order = blob.challenge_positions.clone();
    order.shuffle(&mut rand::rng());
    order
}

/// Reject a word that is not on the BIP39 English wordlist.
pub fn validate_word(word: &str) -> Result<()> {
    let list = bip39::Language::English.word_list();
    if list.binary_search_by(|probe| (*probe).cmp(word)).is_ok() {
        Ok(())
    } else {
        Err(PassCliError::InvalidWord(word.to_string()))
    }
}

/// Generate the mnemonic and build the recovery blob.
///
/// Every transient buffer (seeds, derived keys, word strings) is
/// zeroized before return.
pub fn setup(passphrase: Option<&str>, params: &KdfParams) -> Result<RecoverySetup> {
    // 256 bits of entropy -> 24 words, checksum in the last word.
    let mut entropy = [0u8; 32];
    {
        use rand::TryRngCore;
        rand::rngs::OsRng.try_fill_bytes(&mut entropy).expect("OS RNG failure");
    }
    let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
        .map_err(|e| PassCliError::InvalidMnemonic(e.to_string()))?;
    entropy.zeroize();

    let words: Vec<&'static str> = mnemonic.words().collect();
    debug_assert_eq!(words.len(), WORD_COUNT);

    let positions = select_challenge_positions();

    let challenge_words: Vec<&str> = positions.iter().map(|&p| words[usize::from(p)]).collect();
    let stored_words: Vec<&str> = (0..WORD_COUNT)
        .filter(|i| !positions.contains(&(*i as u8)))
        .map(|i| words[i])
        .collect();

    let passphrase = passphrase.unwrap_or("");
    let salt_challenge = kdf::generate_salt().to_vec();
    let salt_recovery = kdf::generate_salt().to_vec();

    // Challenge key: stretch the 6 words the BIP39 way, then run the
    // vault KDF over the result so every guess pays full cost.
    let mut challenge_key = derive_word_key(&challenge_words, passphrase, &salt_challenge, params)?;

    let stored_json = serde_json::to_vec(&stored_words)
        .map_err(|e| PassCliError::SerializationError(format!("stored words: {e}")))?;
    let stored_nonce = encryption::generate_nonce();
    let stored_ciphertext = encryption::encrypt(&challenge_key, &stored_nonce, &stored_json, b"")?;
    challenge_key.zeroize();

    // Recovery KEK comes from the full mnemonic; it wraps a random key
    // that in turn wraps the vault master key in the envelope header.
    let mut full_seed = mnemonic.to_seed(passphrase);
    let mut recovery_kek = kdf::derive_key(&full_seed, &salt_recovery, params)?;
    full_seed.zeroize();

    let recovery_key = MasterKey::generate();
    let recovery_nonce = encryption::generate_nonce();
    let recovery_ciphertext =
        encryption::encrypt(&recovery_kek, &recovery_nonce, recovery_key.as_bytes(), b"")?;
    recovery_kek.zeroize();

    let blob = RecoveryBlob {
        enabled: true,
        version: RECOVERY_VERSION,
        passphrase_required: !passphrase.is_empty(),
        challenge_positions: positions,
        kdf: *params,
        salt_challenge,
        salt_recovery,
        stored_words: WrappedBlob {
            nonce: stored_nonce.to_vec(),
            ciphertext: stored_ciphertext,
        },
        recovery_key: WrappedBlob {
            nonce: recovery_nonce.to_vec(),
            ciphertext: recovery_ciphertext,
        },
    };

    Ok(RecoverySetup {
        mnemonic: Zeroizing::new(mnemonic.words().collect::<Vec<_>>().join(" ")),
        blob,
        recovery_key,
    })
}

/// Run the recovery flow: 6 challenge words in ascending-position
/// order (plus the passphrase when one was set) back to the recovery
/// key.
pub fn recover(
    blob: &RecoveryBlob,
    challenge_words: &[String],
    passphrase: Option<&str>,
) -> Result<MasterKey> {
    if !blob.enabled {
        return Err(PassCliError::RecoveryDisabled);
    }
    blob.validate()?;

    if challenge_words.len() != CHALLENGE_COUNT {
        return Err(PassCliError::MetadataCorrupted(format!(
            "expected {CHALLENGE_COUNT} challenge words, got {}",
            challenge_words.len()
        )));
    }
    for word in challenge_words {
        validate_word(word)?;
    }

    let passphrase = passphrase.unwrap_or("");

    // Decrypt the stored words with the challenge key. A GCM failure
    // here means the entered words are wrong.
    let word_refs: Vec<&str> = challenge_words.iter().map(String::as_str).collect();
    let mut challenge_key =
        derive_word_key(&word_refs, passphrase, &blob.salt_challenge, &blob.kdf)?;

    let stored_nonce: [u8; NONCE_LEN] = blob
        .stored_words
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| PassCliError::MetadataCorrupted("bad nonce length".into()))?;

    let stored_json = encryption::decrypt(
        &challenge_key,
        &stored_nonce,
        &blob.stored_words.ciphertext,
        b"",
    )
    .map_err(|_| PassCliError::DecryptionFailed);
    challenge_key.zeroize();
    let mut stored_json = stored_json?;

    let stored_words: Vec<String> = serde_json::from_slice(&stored_json)
        .map_err(|e| PassCliError::MetadataCorrupted(format!("stored words: {e}")))?;
    stored_json.zeroize();

    if stored_words.len() != WORD_COUNT - CHALLENGE_COUNT {
        return Err(PassCliError::MetadataCorrupted(format!(
            "expected {} stored words, found {}",
            WORD_COUNT - CHALLENGE_COUNT,
            stored_words.len()
        )));
    }

    // Reassemble the full mnemonic: challenge words at their recorded
    // positions, stored words filling the gaps in order.
    let mut full_words: Vec<&str> = Vec::with_capacity(WORD_COUNT);
    let mut challenge_iter = blob.challenge_positions.iter().zip(word_refs.iter());
    let mut next_challenge = challenge_iter.next();
    let mut stored_iter = stored_words.iter();
    for position in 0..WORD_COUNT {
        match next_challenge {
            Some((&p, &word)) if usize::from(p) == position => {
                full_words.push(word);
                next_challenge = challenge_iter.next();
            }
            _ => {
                let word = stored_iter.next().ok_or_else(|| {
                    PassCliError::MetadataCorrupted("stored words exhausted".into())
                })?;
                full_words.push(word);
            }
        }
    }

    let joined = Zeroizing::new(full_words.join(" "));
    let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, &joined)
        .map_err(|e| PassCliError::InvalidMnemonic(e.to_string()))?;

    let mut full_seed = mnemonic.to_seed(passphrase);
    let recovery_kek = kdf::derive_key(&full_seed, &blob.salt_recovery, &blob.kdf);
    full_seed.zeroize();
    let mut recovery_kek = recovery_kek?;

    let recovery_nonce: [u8; NONCE_LEN] = blob
        .recovery_key
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| PassCliError::MetadataCorrupted("bad nonce length".into()))?;

    let recovered = encryption::decrypt(
        &recovery_kek,
        &recovery_nonce,
        &blob.recovery_key.ciphertext,
        b"",
    )
    .map_err(|_| PassCliError::DecryptionFailed);
    recovery_kek.zeroize();
    let mut recovered = recovered?;

    let key = MasterKey::from_slice(&recovered)
        .ok_or_else(|| PassCliError::MetadataCorrupted("bad recovery key length".into()));
    recovered.zeroize();
    key
}

/// Stretch a subset of words into a key.
///
/// The subset is not a checksummed mnemonic, so `bip39::Mnemonic`
/// cannot parse it; instead the standard seed stretch (PBKDF2-SHA512,
/// 2048 rounds, salt `"mnemonic" + passphrase`) is applied directly,
/// followed by the vault KDF for attack cost.
fn derive_word_key(
    words: &[&str],
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<[u8; 32]> {
    let joined = Zeroizing::new(words.join(" "));
    let stretch_salt = Zeroizing::new(format!("mnemonic{passphrase}"));

    let mut seed = [0u8; 64];
    pbkdf2::pbkdf2_hmac::<Sha512>(
        joined.as_bytes(),
        stretch_salt.as_bytes(),
        BIP39_SEED_ROUNDS,
        &mut seed,
    );

    let key = kdf::derive_key(&seed, salt, params);
    seed.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::{KdfParams, PBKDF2_LEGACY_ITERATIONS};

    fn test_params() -> KdfParams {
        KdfParams::pbkdf2(PBKDF2_LEGACY_ITERATIONS)
    }

    fn challenge_words(setup: &RecoverySetup) -> Vec<String> {
        let words: Vec<&str> = setup.mnemonic.split(' ').collect();
        setup
            .blob
            .challenge_positions
            .iter()
            .map(|&p| words[usize::from(p)].to_string())
            .collect()
    }

    #[test]
    fn setup_produces_valid_mnemonic() {
        let setup = setup(None, &test_params()).unwrap();
        let words: Vec<&str> = setup.mnemonic.split(' ').collect();
        assert_eq!(words.len(), WORD_COUNT);

        // The checksum must validate.
        bip39::Mnemonic::parse_in_normalized(bip39::Language::English, &setup.mnemonic).unwrap();
        setup.blob.validate().unwrap();
    }

    #[test]
    fn recover_returns_same_recovery_key() {
        let setup = setup(None, &test_params()).unwrap();
        let words = challenge_words(&setup);

        let recovered = recover(&setup.blob, &words, None).unwrap();
        assert_eq!(recovered.as_bytes(), setup.recovery_key.as_bytes());
    }

    #[test]
    fn recover_with_passphrase() {
        let setup = setup(Some("extra words"), &test_params()).unwrap();
        assert!(setup.blob.passphrase_required);
        let words = challenge_words(&setup);

        let recovered = recover(&setup.blob, &words, Some("extra words")).unwrap();
        assert_eq!(recovered.as_bytes(), setup.recovery_key.as_bytes());
    }

    #[test]
    fn wrong_passphrase_fails_decryption() {
        let setup = setup(Some("right"), &test_params()).unwrap();
        let words = challenge_words(&setup);

        assert!(matches!(
            recover(&setup.blob, &words, Some("wrong")),
            Err(PassCliError::DecryptionFailed)
        ));
    }

    #[test]
    fn wrong_words_fail_decryption() {
        let setup = setup(None, &test_params()).unwrap();

        // Valid BIP39 words, but not the challenge words.
        let wrong: Vec<String> = ["abandon", "ability", "able", "about", "above", "absent"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert!(matches!(
            recover(&setup.blob, &wrong, None),
            Err(PassCliError::DecryptionFailed)
        ));
    }

    #[test]
    fn non_wordlist_word_rejected_before_kdf() {
        let setup = setup(None, &test_params()).unwrap();
        let mut words = challenge_words(&setup);
        words[0] = "zzzznotaword".to_string();

        assert!(matches!(
            recover(&setup.blob, &words, None),
            Err(PassCliError::InvalidWord(_))
        ));
    }

    #[test]
    fn disabled_blob_is_rejected() {
        let mut setup = setup(None, &test_params()).unwrap();
        setup.blob.enabled = false;
        let words = challenge_words(&setup);
        assert!(matches!(
            recover(&setup.blob, &words, None),
            Err(PassCliError::RecoveryDisabled)
        ));
    }

    #[test]
    fn corrupted_positions_are_rejected() {
        let mut setup = setup(None, &test_params()).unwrap();
        setup.blob.challenge_positions = vec![0, 1, 2, 3, 4, 99];
        let words = challenge_words(&setup);
        assert!(matches!(
            recover(&setup.blob, &words, None),
            Err(PassCliError::MetadataCorrupted(_))
        ));
    }

    #[test]
    fn validate_word_accepts_wordlist_entries() {
        assert!(validate_word("abandon").is_ok());
        assert!(validate_word("zoo").is_ok());
        assert!(validate_word("notaword").is_err());
        assert!(validate_word("").is_err());
    }

    #[test]
    fn positions_are_sorted_distinct_in_range() {
        for _ in 0..100 {
            let positions = select_challenge_positions();
            assert_eq!(positions.len(), CHALLENGE_COUNT);
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
            assert!(positions.iter().all(|&p| usize::from(p) < WORD_COUNT));
        }
    }

    #[test]
    fn position_selection_is_uniform() {
        // Chi-square over per-position frequencies across 1000 draws.
        // Expected count per position: 1000 * 6 / 24 = 250.
        let mut counts = [0u32; WORD_COUNT];
        for _ in 0..1000 {
            for &p in &select_challenge_positions() {
                counts[usize::from(p)] += 1;
            }
        }

        let expected = 250.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| {
                let diff = f64::from(c) - expected;
                diff * diff / expected
            })
            .sum();

        // df = 23; chi-square above 80 has vanishing probability for a
        // uniform selector.
        assert!(chi_square < 80.0, "chi-square too high: {chi_square}");
    }

    #[test]
    fn prompt_order_is_a_permutation_of_positions() {
        let setup = setup(None, &test_params()).unwrap();
        let mut order = shuffled_prompt_order(&setup.blob);
        order.sort_unstable();
        assert_eq!(order, setup.blob.challenge_positions);
    }

    #[test]
    fn boundary_positions_work() {
        // Force the first six and last six positions and check the
        // reassembly logic handles both edges.
        for positions in [vec![0u8, 1, 2, 3, 4, 5], vec![18u8, 19, 20, 21, 22, 23]] {
            let generated = setup(None, &test_params()).unwrap();
            // Rebuild the blob with forced positions from the same mnemonic.
            let words: Vec<&str> = generated.mnemonic.split(' ').collect();
            let (blob, recovery_key) = rebuild_with_positions(&words, &positions, &test_params());
            let challenge: Vec<String> = positions
                .iter()
                .map(|&p| words[usize::from(p)].to_string())
                .collect();

            let recovered = recover(&blob, &challenge, None).unwrap();
            assert_eq!(recovered.as_bytes(), recovery_key.as_bytes());
        }
    }

    /// Test helper: build a blob for an existing word list with fixed
    /// challenge positions.
    fn rebuild_with_positions(
        words: &[&str],
        positions: &[u8],
        params: &KdfParams,
    ) -> (RecoveryBlob, MasterKey) {
        let challenge: Vec<&str> = positions.iter().map(|&p| words[usize::from(p)]).collect();
        let stored: Vec<&str> = (0..WORD_COUNT)
            .filter(|i| !positions.contains(&(*i as u8)))
            .map(|i| words[i])
            .collect();

        let salt_challenge = kdf::generate_salt().to_vec();
        let salt_recovery = kdf::generate_salt().to_vec();

        let challenge_key = derive_word_key(&challenge, "", &salt_challenge, params).unwrap();
        let stored_json = serde_json::to_vec(&stored).unwrap();
        let stored_nonce = encryption::generate_nonce();
        let stored_ciphertext =
            encryption::encrypt(&challenge_key, &stored_nonce, &stored_json, b"").unwrap();

        let joined = words.join(" ");
        let mnemonic =
            bip39::Mnemonic::parse_in_normalized(bip39::Language::English, &joined).unwrap();
        let seed = mnemonic.to_seed("");
        let recovery_kek = kdf::derive_key(&seed, &salt_recovery, params).unwrap();

        let recovery_key = MasterKey::generate();
        let recovery_nonce = encryption::generate_nonce();
        let recovery_ciphertext =
            encryption::encrypt(&recovery_kek, &recovery_nonce, recovery_key.as_bytes(), b"")
                .unwrap();

        let blob = RecoveryBlob {
            enabled: true,
            version: RECOVERY_VERSION,
            passphrase_required: false,
            challenge_positions: positions.to_vec(),
            kdf: *params,
            salt_challenge,
            salt_recovery,
            stored_words: WrappedBlob {
                nonce: stored_nonce.to_vec(),
                ciphertext: stored_ciphertext,
            },
            recovery_key: WrappedBlob {
                nonce: recovery_nonce.to_vec(),
                ciphertext: recovery_ciphertext,
            },
        };
        (blob, recovery_key)
    }
}
