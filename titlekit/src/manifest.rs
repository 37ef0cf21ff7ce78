use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::{validate_common_key, COMMON_KEY};
use crate::error::{TitleError, TitleResult};
use crate::report::Warning;
use crate::ticket::Ticket;
use crate::titleid::TitleId;
use crate::tmd::{ContentChunkRecord, Tmd};

/// The ordered list of content records extracted from a TMD. Immutable
/// once built.
#[derive(Debug, Clone)]
pub struct ContentManifest {
    title_id: TitleId,
    entries: Vec<ContentChunkRecord>,
}

impl ContentManifest {
    #[must_use]
    pub fn title_id(&self) -> TitleId {
        self.title_id
    }

    #[must_use]
    pub fn entries(&self) -> &[ContentChunkRecord] {
        &self.entries
    }
}

/// Output of component A: the plaintext title key and the content
/// manifest, read-only after construction.
#[derive(Debug, Clone)]
pub struct DecryptionContext {
    title_key: [u8; 0x10],
    manifest: ContentManifest,
}

impl DecryptionContext {
    /// Loads `title.tmd` and `title.tik`/`cetk` from `game_dir`, derives the
    /// plaintext title key, and builds the content manifest.
    ///
    /// A failed common-key self-check is recorded in `warnings` rather than
    /// aborting the load.
    pub fn load(game_dir: &Path, warnings: &mut Vec<Warning>) -> TitleResult<Self> {
        let tmd_path = game_dir.join("title.tmd");
        let tmd_bytes =
            fs::read(&tmd_path).map_err(|_| TitleError::MissingFile(tmd_path.clone()))?;
        let tmd = Tmd::parse(&tmd_bytes)?;

        let tik_path = find_ticket(game_dir)?;
        let tik_bytes =
            fs::read(&tik_path).map_err(|_| TitleError::MissingFile(tik_path.clone()))?;
        let ticket = Ticket::parse(&tik_bytes)?;

        if !validate_common_key() {
            warnings.push(Warning::CommonKeyMismatch);
        }

        let title_key = ticket.title_key(&COMMON_KEY)?;
        let manifest = ContentManifest {
            title_id: tmd.title_id(),
            entries: tmd.content_chunks(),
        };

        Ok(Self { title_key, manifest })
    }

    #[must_use]
    pub fn title_key(&self) -> &[u8; 0x10] {
        &self.title_key
    }

    #[must_use]
    pub fn manifest(&self) -> &ContentManifest {
        &self.manifest
    }
}

fn find_ticket(game_dir: &Path) -> TitleResult<PathBuf> {
    for name in ["title.tik", "cetk"] {
        let path = game_dir.join(name);
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(TitleError::MissingFile(game_dir.join("title.tik")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::SignatureType;

    fn write_fixture_title(dir: &Path, title_id: [u8; 8]) {
        let body_offset = SignatureType::Rsa2048Sha1.body_offset();

        let mut tik = vec![0u8; body_offset + 0x5C + 8];
        tik[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        tik[body_offset + 0x5C..body_offset + 0x5C + 8].copy_from_slice(&title_id);

        let table_start = body_offset + 0x984;
        let mut tmd = vec![0u8; table_start];
        tmd[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        tmd[body_offset + 0xC..body_offset + 0xC + 8].copy_from_slice(&title_id);
        tmd[body_offset + 0x5E..body_offset + 0x5E + 2].copy_from_slice(&0u16.to_be_bytes());

        fs::write(dir.join("title.tik"), tik).unwrap();
        fs::write(dir.join("title.tmd"), tmd).unwrap();
    }

    #[test]
    fn loads_title_with_zero_contents() {
        let dir = tempfile::tempdir().unwrap();
        let title_id = [0x00, 0x05, 0x00, 0x00, 0x10, 0x10, 0x1C, 0x00];
        write_fixture_title(dir.path(), title_id);

        let mut warnings = Vec::new();
        let ctx = DecryptionContext::load(dir.path(), &mut warnings).unwrap();
        assert_eq!(ctx.manifest().entries().len(), 0);
        assert_eq!(ctx.title_key().len(), 0x10);
    }

    #[test]
    fn missing_tmd_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut warnings = Vec::new();
        assert!(matches!(
            DecryptionContext::load(dir.path(), &mut warnings),
            Err(TitleError::MissingFile(_))
        ));
    }

    #[test]
    fn accepts_cetk_as_ticket_name() {
        let dir = tempfile::tempdir().unwrap();
        let title_id = [0u8; 8];
        write_fixture_title(dir.path(), title_id);
        fs::rename(dir.path().join("title.tik"), dir.path().join("cetk")).unwrap();

        let mut warnings = Vec::new();
        assert!(DecryptionContext::load(dir.path(), &mut warnings).is_ok());
    }
}
