use crate::error::{TitleError, TitleResult};

/// Signature type tag, the big-endian `u32` every ticket and TMD blob opens
/// with. Determines how many bytes of signature + padding precede the
/// 0x40-byte issuer string, which in turn determines where the real
/// ticket/TMD body starts.
///
/// Generalizes what the teacher's `SignedData<T>` dispatches on, for the
/// Wii/Wii U signature space (SHA-1 and SHA-256 variants of the same three
/// key types) rather than the 3DS-only SHA-256 triple.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignatureType {
    Rsa4096Sha1,
    Rsa2048Sha1,
    EcdsaSha1,
    Rsa4096Sha256,
    Rsa2048Sha256,
    EcdsaSha256,
}

impl SignatureType {
    pub fn from_tag(tag: u32) -> TitleResult<Self> {
        Ok(match tag {
            0x0001_0000 => Self::Rsa4096Sha1,
            0x0001_0001 => Self::Rsa2048Sha1,
            0x0001_0002 => Self::EcdsaSha1,
            0x0001_0003 => Self::Rsa4096Sha256,
            0x0001_0004 => Self::Rsa2048Sha256,
            0x0001_0005 => Self::EcdsaSha256,
            other => {
                return Err(TitleError::MalformedMetadata(format!(
                    "unknown signature type tag 0x{other:08x}"
                )))
            }
        })
    }

    fn sig_len(self) -> usize {
        match self {
            Self::Rsa4096Sha1 | Self::Rsa4096Sha256 => 0x200,
            Self::Rsa2048Sha1 | Self::Rsa2048Sha256 => 0x100,
            Self::EcdsaSha1 | Self::EcdsaSha256 => 0x3c,
        }
    }

    fn pad_len(self) -> usize {
        match self {
            Self::EcdsaSha1 | Self::EcdsaSha256 => 0x40,
            _ => 0x3c,
        }
    }

    /// Offset of the body (the ticket/TMD struct proper) relative to the
    /// start of the blob: 4-byte type tag, signature, padding, then the
    /// fixed 0x40-byte issuer string.
    #[must_use]
    pub fn body_offset(self) -> usize {
        4 + self.sig_len() + self.pad_len() + 0x40
    }
}
