use std::cmp::Ordering;

use crate::cipher::{BlindHash, OreCiphertext};
use crate::error::CipherError;

/// Order-revealing encryption primitive, supplied by the embedding application.
///
/// Two ciphertexts produced under the same key pair reveal their relative
/// order through [`OreCipher::compare`], which needs no keys. The compiler
/// never depends on how the primitive is built, only on this contract.
pub trait OreCipher: Send + Sync {
    /// Encrypt one term under a PRF/PRP key pair.
    ///
    /// # Errors
    ///
    /// Implementations report primitive failures (bad keys, internal errors)
    /// as [`CipherError`].
    fn encrypt(
        &self,
        term: u64,
        prf_key: &[u8; 16],
        prp_key: &[u8; 16],
    ) -> Result<OreCiphertext, CipherError>;

    /// Compare two ciphertexts produced under the same keys.
    /// Returns `None` when the ciphertexts are malformed or incomparable.
    fn compare(&self, a: &OreCiphertext, b: &OreCiphertext) -> Option<Ordering>;
}

/// Keyed pseudorandom hash used for blind indexes.
///
/// Equality-revealing only: equal tokens under equal keys hash equal, and
/// nothing about ordering survives.
pub trait BlindIndexHasher: Send + Sync {
    /// Hash `token` under a 128-bit key given as four 32-bit words.
    fn hash(&self, key: [u32; 4], token: &str) -> BlindHash;
}
