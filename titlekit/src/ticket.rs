use crate::crypto::aes_cbc_decrypt;
use crate::error::{TitleError, TitleResult};
use crate::sig::SignatureType;

/// Offset of `title_key`, relative to the body (see [`SignatureType::body_offset`]).
const TITLE_KEY_REL: usize = 0x3F;
/// Offset of the title ID echo, relative to the body.
const TITLE_ID_ECHO_REL: usize = 0x5C;

/// A parsed ticket blob (`title.tik` / `cetk`).
///
/// Only the two fields the core ever reads are exposed: the encrypted title
/// key and the title ID echo used to build its decryption IV. Everything
/// else in the blob (ECC public key, ticket ID, console ID, limits...) is
/// opaque to this engine.
#[derive(Debug, Clone, Copy)]
pub struct Ticket<'a> {
    bytes: &'a [u8],
    body_offset: usize,
}

impl<'a> Ticket<'a> {
    pub fn parse(bytes: &'a [u8]) -> TitleResult<Self> {
        if bytes.len() < 4 {
            return Err(TitleError::MalformedMetadata(
                "ticket blob too short to contain a signature type tag".into(),
            ));
        }
        let tag = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let sig_ty = SignatureType::from_tag(tag)?;
        let body_offset = sig_ty.body_offset();

        let min_len = body_offset + TITLE_ID_ECHO_REL + 8;
        if bytes.len() < min_len {
            return Err(TitleError::MalformedMetadata(format!(
                "ticket blob too short: {} bytes, need at least {min_len}",
                bytes.len()
            )));
        }

        Ok(Self { bytes, body_offset })
    }

    /// The 16-byte encrypted title key.
    #[must_use]
    pub fn encrypted_title_key(&self) -> [u8; 0x10] {
        let off = self.body_offset + TITLE_KEY_REL;
        self.bytes[off..off + 0x10].try_into().unwrap()
    }

    /// The 8-byte title ID echo, used as the upper half of the title-key
    /// decryption IV.
    #[must_use]
    pub fn title_id_echo(&self) -> [u8; 8] {
        let off = self.body_offset + TITLE_ID_ECHO_REL;
        self.bytes[off..off + 8].try_into().unwrap()
    }

    /// Derives the plaintext title key under `common_key`.
    ///
    /// `IV = title_id_echo ‖ 0x00·8`; one block of AES-128-CBC, no padding
    /// removed (the "plaintext" is exactly the one block of ciphertext
    /// decrypted in place).
    pub fn title_key(&self, common_key: &[u8; 0x10]) -> TitleResult<[u8; 0x10]> {
        let mut iv = [0u8; 0x10];
        iv[..8].copy_from_slice(&self.title_id_echo());

        let mut key = self.encrypted_title_key();
        aes_cbc_decrypt(common_key, &iv, &mut key)?;
        Ok(key)
    }
}
