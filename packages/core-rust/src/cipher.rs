//! Term cipher adapter.
//!
//! Sits between the compiler and the injected cryptographic capabilities.
//! Scalar terms (Exact and Range) are validated against the `u64` domain and
//! forwarded to the order-revealing primitive; match tokens go through the
//! keyed blind-index hash instead. Plaintext terms are never logged or kept
//! past the call.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::codec::OrePlaintext;
use crate::error::CompileError;
use crate::hash::{key_words, Blake3BlindIndex};
use crate::traits::{BlindIndexHasher, OreCipher};

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Output of the order-revealing primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OreCiphertext {
    pub left_cipher_text: Vec<u8>,
    pub right_cipher_text: Vec<u8>,
}

/// Raw output of a [`BlindIndexHasher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlindHash {
    pub h: u32,
    pub l: u32,
}

/// Fixed-size opaque digest of a match token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlindIndex(pub [u8; 8]);

impl From<BlindHash> for BlindIndex {
    fn from(hash: BlindHash) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&hash.h.to_be_bytes());
        bytes[4..].copy_from_slice(&hash.l.to_be_bytes());
        Self(bytes)
    }
}

impl BlindIndex {
    /// The digest read as one big-endian `u64`.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

/// Per-index key pair. `Debug` never prints key bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IndexKeys {
    pub prf_key: [u8; 16],
    pub prp_key: [u8; 16],
}

impl fmt::Debug for IndexKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexKeys")
            .field("prf_key", &"<redacted>")
            .field("prp_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TermCipher
// ---------------------------------------------------------------------------

/// Adapter over the injected ORE primitive and blind-index hash.
///
/// Cheap to clone; shares the underlying capabilities.
#[derive(Clone)]
pub struct TermCipher {
    ore: Arc<dyn OreCipher>,
    hasher: Arc<dyn BlindIndexHasher>,
}

impl fmt::Debug for TermCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermCipher").finish_non_exhaustive()
    }
}

impl TermCipher {
    /// Creates an adapter using the default BLAKE3 blind-index hash.
    #[must_use]
    pub fn new(ore: Arc<dyn OreCipher>) -> Self {
        Self::with_hasher(ore, Arc::new(Blake3BlindIndex))
    }

    #[must_use]
    pub fn with_hasher(ore: Arc<dyn OreCipher>, hasher: Arc<dyn BlindIndexHasher>) -> Self {
        Self { ore, hasher }
    }

    /// Encrypts a term that is already in the `u64` domain.
    ///
    /// # Errors
    ///
    /// Propagates primitive failures as [`CompileError::Cipher`].
    pub fn encrypt_term(
        &self,
        term: OrePlaintext,
        keys: &IndexKeys,
    ) -> Result<OreCiphertext, CompileError> {
        Ok(self.ore.encrypt(term.0, &keys.prf_key, &keys.prp_key)?)
    }

    /// Validates an integer term against the `u64` domain, then encrypts it.
    /// Out-of-domain terms never reach the primitive.
    ///
    /// # Errors
    ///
    /// [`CompileError::Domain`] for out-of-range terms, [`CompileError::Cipher`]
    /// for primitive failures.
    pub fn encrypt_wide(&self, term: i128, keys: &IndexKeys) -> Result<OreCiphertext, CompileError> {
        let plaintext = OrePlaintext::from_wide(term)?;
        self.encrypt_term(plaintext, keys)
    }

    /// Encrypts a string for equality lookups: the string is blind-hashed into
    /// the `u64` domain first, so only equality survives.
    ///
    /// # Errors
    ///
    /// Propagates primitive failures as [`CompileError::Cipher`].
    pub fn encrypt_string(&self, term: &str, keys: &IndexKeys) -> Result<OreCiphertext, CompileError> {
        let digest = self.blind_token(term, keys);
        self.encrypt_term(OrePlaintext(digest.as_u64()), keys)
    }

    /// Blind-indexes a match token. Tokens are NFC-normalized so that
    /// canonically equivalent spellings produce the same digest.
    #[must_use]
    pub fn blind_token(&self, token: &str, keys: &IndexKeys) -> BlindIndex {
        let normalized: String = token.nfc().collect();
        self.hasher.hash(key_words(&keys.prf_key), &normalized).into()
    }

    /// Keyless comparison of two ciphertexts, delegated to the primitive.
    #[must_use]
    pub fn compare(&self, a: &OreCiphertext, b: &OreCiphertext) -> Option<Ordering> {
        self.ore.compare(a, b)
    }
}
