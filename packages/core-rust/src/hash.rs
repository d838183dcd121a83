//! Default keyed hash for blind indexes.
//!
//! The 128-bit key (four big-endian words) is stretched into a BLAKE3 key with
//! `derive_key`, then the token is hashed in keyed mode. The first eight bytes
//! of the digest become the `(h, l)` pair.

use crate::cipher::BlindHash;
use crate::traits::BlindIndexHasher;

/// BLAKE3 key-derivation context. Changing it orphans every stored token.
const DERIVE_CONTEXT: &str = "termvault 2024-01-01 blind index v1";

/// [`BlindIndexHasher`] backed by keyed BLAKE3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3BlindIndex;

impl BlindIndexHasher for Blake3BlindIndex {
    fn hash(&self, key: [u32; 4], token: &str) -> BlindHash {
        let mut key_bytes = [0u8; 16];
        for (chunk, word) in key_bytes.chunks_exact_mut(4).zip(key) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        let derived = blake3::derive_key(DERIVE_CONTEXT, &key_bytes);
        let digest = blake3::keyed_hash(&derived, token.as_bytes());
        let bytes = digest.as_bytes();
        BlindHash {
            h: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            l: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Splits a 16-byte key into the four big-endian words the hasher takes.
#[must_use]
pub fn key_words(key: &[u8; 16]) -> [u32; 4] {
    let mut words = [0u32; 4];
    for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u32; 4] = [0xdead_beef, 0xcafe_babe, 0x8bad_f00d, 0x1bad_b002];

    #[test]
    fn deterministic_for_same_key_and_token() {
        let a = Blake3BlindIndex.hash(KEY, "hello");
        let b = Blake3BlindIndex.hash(KEY, "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn different_tokens_differ() {
        assert_ne!(
            Blake3BlindIndex.hash(KEY, "hello"),
            Blake3BlindIndex.hash(KEY, "world")
        );
    }

    #[test]
    fn different_keys_differ() {
        let other = [1, 2, 3, 4];
        assert_ne!(
            Blake3BlindIndex.hash(KEY, "hello"),
            Blake3BlindIndex.hash(other, "hello")
        );
    }

    #[test]
    fn case_sensitive() {
        assert_ne!(
            Blake3BlindIndex.hash(KEY, "Hello"),
            Blake3BlindIndex.hash(KEY, "hello")
        );
    }

    #[test]
    fn key_words_are_big_endian() {
        let key = [
            0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe, 0x8b, 0xad, 0xf0, 0x0d, 0x1b, 0xad,
            0xb0, 0x02,
        ];
        assert_eq!(key_words(&key), KEY);
    }

    #[test]
    fn distribution_1000_unique() {
        let mut set = std::collections::HashSet::new();
        for i in 0..1000 {
            set.insert(Blake3BlindIndex.hash(KEY, &format!("item-{i}")));
        }
        assert_eq!(set.len(), 1000);
    }
}
