use crate::error::{TitleError, TitleResult};
use crate::sig::SignatureType;
use crate::titleid::TitleId;

/// Offset of `title_id`, relative to the body.
const TITLE_ID_REL: usize = 0xC;
/// Offset of `content_count`, relative to the body.
const CONTENT_COUNT_REL: usize = 0x5E;
/// Offset of the content table, relative to the body.
const CONTENT_TABLE_REL: usize = 0x984;
/// Size of one content table record.
const CONTENT_RECORD_LEN: usize = 48;

/// A parsed Title Metadata blob (`title.tmd`).
#[derive(Debug, Clone, Copy)]
pub struct Tmd<'a> {
    bytes: &'a [u8],
    body_offset: usize,
}

impl<'a> Tmd<'a> {
    pub fn parse(bytes: &'a [u8]) -> TitleResult<Self> {
        if bytes.len() < 4 {
            return Err(TitleError::MalformedMetadata(
                "tmd blob too short to contain a signature type tag".into(),
            ));
        }
        let tag = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let sig_ty = SignatureType::from_tag(tag)?;
        let body_offset = sig_ty.body_offset();

        let header_end = body_offset + CONTENT_COUNT_REL + 2;
        if bytes.len() < header_end {
            return Err(TitleError::MalformedMetadata(format!(
                "tmd blob too short for header: {} bytes, need at least {header_end}",
                bytes.len()
            )));
        }

        let this = Self { bytes, body_offset };
        let n = this.content_count() as usize;
        let table_start = body_offset + CONTENT_TABLE_REL;
        let needed = table_start + CONTENT_RECORD_LEN * n;
        if bytes.len() < needed {
            return Err(TitleError::MalformedMetadata(format!(
                "tmd blob too short for {n} content records: {} bytes, need at least {needed}",
                bytes.len()
            )));
        }

        Ok(this)
    }

    #[must_use]
    pub fn title_id(&self) -> TitleId {
        let off = self.body_offset + TITLE_ID_REL;
        TitleId::from_bytes(self.bytes[off..off + 8].try_into().unwrap())
    }

    #[must_use]
    pub fn content_count(&self) -> u16 {
        let off = self.body_offset + CONTENT_COUNT_REL;
        u16::from_be_bytes(self.bytes[off..off + 2].try_into().unwrap())
    }

    /// The content table, in TMD order. Length always equals
    /// [`Tmd::content_count`] — validated at [`Tmd::parse`] time.
    #[must_use]
    pub fn content_chunks(&self) -> Vec<ContentChunkRecord> {
        let table_start = self.body_offset + CONTENT_TABLE_REL;
        (0..self.content_count() as usize)
            .map(|i| {
                let off = table_start + i * CONTENT_RECORD_LEN;
                ContentChunkRecord::from_bytes(&self.bytes[off..off + CONTENT_RECORD_LEN])
            })
            .collect()
    }
}

/// One 48-byte content table record.
///
/// `content_id`(0-4) `content_index`(4-6) `content_type`(6-8)
/// `content_size`(8-16) `content_hash`(16-36) account for 36 of the 48
/// bytes, laid out contiguously with no gap before the hash; the trailing
/// 12 bytes (36-48) are reserved and this engine never reads them.
#[derive(Debug, Clone, Copy)]
pub struct ContentChunkRecord {
    content_id: u32,
    content_index: u16,
    content_type: u16,
    content_size: u64,
    content_hash: [u8; 20],
}

impl ContentChunkRecord {
    fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), CONTENT_RECORD_LEN);
        Self {
            content_id: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            content_index: u16::from_be_bytes(bytes[4..6].try_into().unwrap()),
            content_type: u16::from_be_bytes(bytes[6..8].try_into().unwrap()),
            content_size: u64::from_be_bytes(bytes[8..16].try_into().unwrap()),
            content_hash: bytes[16..36].try_into().unwrap(),
        }
    }

    #[must_use]
    pub fn content_id(&self) -> u32 {
        self.content_id
    }

    /// The content ID rendered as 8 lowercase hex characters, used as the
    /// container's base filename.
    #[must_use]
    pub fn content_id_hex(&self) -> String {
        format!("{:08x}", self.content_id)
    }

    #[must_use]
    pub fn content_index(&self) -> u16 {
        self.content_index
    }

    #[must_use]
    pub fn content_type(&self) -> u16 {
        self.content_type
    }

    /// Bit 1 (`& 0x2`) of `content_type`: hash-tree mode vs. flat-CBC mode.
    #[must_use]
    pub fn is_hash_tree(&self) -> bool {
        self.content_type & 0x2 != 0
    }

    #[must_use]
    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    #[must_use]
    pub fn content_hash(&self) -> &[u8; 20] {
        &self.content_hash
    }
}
