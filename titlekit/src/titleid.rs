use std::fmt;

use static_assertions::assert_eq_size;

use crate::error::{TitleError, TitleResult};

/// An 8-byte Title ID, conventionally rendered as 16 uppercase hex
/// characters. Bytes 4-5 (big-endian) are the category field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TitleId([u8; 8]);
assert_eq_size!(u64, TitleId);

impl TitleId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Parses a 16-hex-character Title ID string (case-insensitive).
    pub fn from_hex(hex_str: &str) -> TitleResult<Self> {
        let decoded =
            hex::decode(hex_str).map_err(|e| TitleError::MalformedMetadata(e.to_string()))?;
        let bytes: [u8; 8] = decoded.try_into().map_err(|v: Vec<u8>| {
            TitleError::MalformedMetadata(format!(
                "title id must be 8 bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// The category field, bytes 4-5 big-endian.
    #[must_use]
    pub fn category(&self) -> Category {
        Category::from_raw(u16::from_be_bytes([self.0[4], self.0[5]]))
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Title category, classified from bytes 4-5 of a [`TitleId`].
///
/// Only affects collaborators upstream of the core (the downloader); the
/// core treats every category identically once it has a ticket and TMD.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Category {
    Application,
    Demo,
    AddOnContent,
    Update,
    System,
}

impl Category {
    #[must_use]
    fn from_raw(raw: u16) -> Self {
        match raw {
            0x0000 => Self::Application,
            0x0002 => Self::Demo,
            0x000C => Self::AddOnContent,
            0x000E => Self::Update,
            _ => Self::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_known_title_ids() {
        assert_eq!(
            TitleId::from_hex("0005000010101C00").unwrap().category(),
            Category::Application
        );
        assert_eq!(
            TitleId::from_hex("0005000210101C00").unwrap().category(),
            Category::Demo
        );
        assert_eq!(
            TitleId::from_hex("0005000C10101C00").unwrap().category(),
            Category::AddOnContent
        );
        assert_eq!(
            TitleId::from_hex("0005000E10101C00").unwrap().category(),
            Category::Update
        );
        assert_eq!(
            TitleId::from_hex("0005001010101C00").unwrap().category(),
            Category::System
        );
    }

    #[test]
    fn hex_round_trip_is_uppercase() {
        let id = TitleId::from_hex("0005000010101c00").unwrap();
        assert_eq!(id.to_hex(), "0005000010101C00");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(TitleId::from_hex("00").is_err());
    }
}
