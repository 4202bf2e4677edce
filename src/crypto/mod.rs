//! Crypto primitives: key derivation, authenticated encryption, and
//! zeroizing key containers.

pub mod encryption;
pub mod kdf;
pub mod keys;

pub use kdf::{KdfAlgorithm, KdfParams};
pub use keys::MasterKey;
