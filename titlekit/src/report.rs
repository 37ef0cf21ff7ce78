use std::fmt;
use std::path::PathBuf;

/// A non-fatal condition recorded during a run instead of aborting it.
///
/// These are the four rows of the error-kind table whose "surfaced?" column
/// reads "warning": `CommonKeyMismatch`, `HashMismatch`, `MissingContainer`,
/// `PathEscape`.
#[derive(Debug, Clone)]
pub enum Warning {
    CommonKeyMismatch,
    HashMismatch { content_id: String, detail: String },
    MissingContainer { content_id: String },
    PathEscape { path: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommonKeyMismatch => write!(f, "common key failed its self-check"),
            Self::HashMismatch { content_id, detail } => {
                write!(f, "content {content_id}: {detail}")
            }
            Self::MissingContainer { content_id } => {
                write!(f, "content {content_id}: container file missing")
            }
            Self::PathEscape { path } => write!(f, "path escapes output root: {}", path.display()),
        }
    }
}

/// Summary of one decrypt run (component B) over a manifest.
///
/// Per spec.md §7, a run is "successful" if at least one content was
/// decrypted; [`DecryptReport::is_success`] is exactly that check.
#[derive(Debug, Clone, Default)]
pub struct DecryptReport {
    pub decrypted: Vec<String>,
    pub failed: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl DecryptReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.decrypted.is_empty()
    }
}

/// Summary of one extract run (component C) over a manifest.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub extracted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
}

impl ExtractReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.extracted.is_empty()
    }
}
