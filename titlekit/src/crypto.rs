use hex_literal::hex;
use sha1::{Digest, Sha1};

use crate::error::TitleResult;

pub mod aes128_cbc {
    pub use aes::cipher::generic_array::GenericArray;
    pub use aes::cipher::{BlockDecryptMut, KeyIvInit};
    pub type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
}
use aes128_cbc::*;

/// The Wii/Wii U Common Key, shared platform-wide and used to unwrap every
/// title's per-title key.
pub const COMMON_KEY: [u8; 0x10] = hex!("D7B00402659BA2ABD2CB0DB27FA2B656");

const COMMON_KEY_SHA1: [u8; 20] = hex!("e3fbc19d1306f6243afe852ab35ed9e1e4777d3a");

/// Checks the Common Key against its known SHA-1 self-check: a SHA-1 over
/// the uppercase ASCII hex form of the key must match a fixed digest.
///
/// A mismatch only ever indicates the constant above was edited; it is not
/// a trust boundary, so callers treat a `false` return as a warning and
/// proceed regardless.
#[must_use]
pub fn validate_common_key() -> bool {
    let hex_upper = hex::encode_upper(COMMON_KEY);
    let mut hasher = Sha1::new();
    hasher.update(hex_upper.as_bytes());
    let digest: [u8; 20] = hasher.finalize().into();
    if digest != COMMON_KEY_SHA1 {
        log::warn!(
            "common key self-check failed: got {}, expected {}",
            hex::encode(digest),
            hex::encode(COMMON_KEY_SHA1)
        );
        false
    } else {
        true
    }
}

/// A persistent AES-128-CBC decryption stream.
///
/// Keeping one instance alive across successive calls to
/// [`CbcDecryptStream::decrypt_in_place`] is equivalent to decrypting the
/// whole ciphertext in one shot: the final ciphertext block of one call
/// becomes the IV for the next, exactly as CBC chaining requires.
pub struct CbcDecryptStream(Aes128CbcDec);

impl CbcDecryptStream {
    #[must_use]
    pub fn new(key: &[u8; 0x10], iv: &[u8; 0x10]) -> Self {
        let key = GenericArray::from_slice(key);
        let iv = GenericArray::from_slice(iv);
        Self(Aes128CbcDec::new(key, iv))
    }

    /// Decrypts `data` in place. `data.len()` must be a multiple of the
    /// AES block size (16 bytes); the hierarchical-hash and flat-CBC
    /// callers both only ever hand this whole 16-byte-aligned regions.
    pub fn decrypt_in_place(&mut self, data: &mut [u8]) -> TitleResult<()> {
        if data.len() % 16 != 0 {
            return Err(crate::error::TitleError::ShortRead {
                expected: data.len().next_multiple_of(16),
                actual: data.len(),
            });
        }
        for block in data.chunks_exact_mut(16) {
            self.0
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
}

/// Narrow one-shot AES-128-CBC decryption primitive: decrypts `data` in
/// place under `key`/`iv` with no chaining state kept afterwards.
///
/// Used for title-key derivation (one 16-byte block), hash-tree prologue
/// decryption (IV all-zero, 0x400 bytes), and hash-tree payload decryption
/// (IV = `H0`, 0xFC00 bytes) — the three call sites the decryptor design
/// notes ask to share a single primitive.
pub fn aes_cbc_decrypt(key: &[u8; 0x10], iv: &[u8; 0x10], data: &mut [u8]) -> TitleResult<()> {
    CbcDecryptStream::new(key, iv).decrypt_in_place(data)
}

/// Computes the SHA-1 digest of a byte slice.
#[must_use]
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}
