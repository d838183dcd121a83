//! Insecure stand-ins for the cryptographic capabilities.
//!
//! [`FakeOreCipher`] is order-preserving on its input domain and
//! deterministic per key pair, but offers no secrecy at all. Never use it
//! outside tests.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::cipher::OreCiphertext;
use crate::error::CipherError;
use crate::traits::OreCipher;

/// Shifts the term by a key-derived offset in 128-bit space, so order is kept
/// and different keys give different ciphertexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeOreCipher;

fn key_offset(prf_key: &[u8; 16], prp_key: &[u8; 16]) -> u64 {
    let mut bytes = [0u8; 8];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = prf_key[i] ^ prp_key[i + 8];
    }
    u64::from_be_bytes(bytes)
}

impl OreCipher for FakeOreCipher {
    fn encrypt(
        &self,
        term: u64,
        prf_key: &[u8; 16],
        prp_key: &[u8; 16],
    ) -> Result<OreCiphertext, CipherError> {
        let shifted = u128::from(term) + u128::from(key_offset(prf_key, prp_key));
        let left = shifted.to_be_bytes().to_vec();
        let mut right = left.clone();
        right.reverse();
        Ok(OreCiphertext {
            left_cipher_text: left,
            right_cipher_text: right,
        })
    }

    fn compare(&self, a: &OreCiphertext, b: &OreCiphertext) -> Option<Ordering> {
        if a.left_cipher_text.len() != 16 || b.left_cipher_text.len() != 16 {
            return None;
        }
        Some(a.left_cipher_text.cmp(&b.left_cipher_text))
    }
}

/// [`FakeOreCipher`] that counts how often `encrypt` is invoked.
#[derive(Debug, Default)]
pub struct CountingOreCipher {
    calls: AtomicUsize,
}

impl CountingOreCipher {
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

impl OreCipher for CountingOreCipher {
    fn encrypt(
        &self,
        term: u64,
        prf_key: &[u8; 16],
        prp_key: &[u8; 16],
    ) -> Result<OreCiphertext, CipherError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        FakeOreCipher.encrypt(term, prf_key, prp_key)
    }

    fn compare(&self, a: &OreCiphertext, b: &OreCiphertext) -> Option<Ordering> {
        FakeOreCipher.compare(a, b)
    }
}

/// Always fails, for exercising error propagation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingOreCipher;

impl OreCipher for FailingOreCipher {
    fn encrypt(
        &self,
        _term: u64,
        _prf_key: &[u8; 16],
        _prp_key: &[u8; 16],
    ) -> Result<OreCiphertext, CipherError> {
        Err(CipherError {
            reason: "primitive unavailable".to_string(),
        })
    }

    fn compare(&self, _a: &OreCiphertext, _b: &OreCiphertext) -> Option<Ordering> {
        None
    }
}
