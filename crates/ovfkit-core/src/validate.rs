//! Package validation: are the files a descriptor references on disk?

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ovf::file_references;
use crate::xml;

/// What was found for one referenced file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// The file exists with `size` bytes.
    Present { size: u64 },
    NotFound,
    /// The file could not be inspected (typically permission denied).
    Unreadable { reason: String },
}

/// The check of one `References/File` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub href: String,
    /// Size declared in the descriptor.
    pub expected: Option<u64>,
    pub status: FileStatus,
}

impl FileCheck {
    /// Whether the file exists.
    pub fn is_present(&self) -> bool {
        matches!(self.status, FileStatus::Present { .. })
    }

    /// Whether the file exists and its size agrees with the declared one.
    /// Entries without a declared size agree with any size.
    pub fn size_matches(&self) -> bool {
        match (&self.status, self.expected) {
            (FileStatus::Present { size }, Some(expected)) => *size == expected,
            (FileStatus::Present { .. }, None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FileCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expected = self
            .expected
            .map(|s| s.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let found = match &self.status {
            FileStatus::Present { size } => size.to_string(),
            FileStatus::NotFound => "NOT_FOUND".to_string(),
            FileStatus::Unreadable { .. } => "UNABLE_TO_READ".to_string(),
        };
        write!(
            f,
            "{}: expected size {}, found size {}",
            self.href, expected, found
        )
    }
}

/// Outcome of [`validate_ovf`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub files: Vec<FileCheck>,
}

impl ValidationReport {
    /// Every referenced file is present. Size disagreement does not count
    /// against this; see [`Self::size_mismatches`].
    pub fn is_valid(&self) -> bool {
        self.files.iter().all(FileCheck::is_present)
    }

    /// Every referenced file is present with its declared size.
    pub fn is_strictly_valid(&self) -> bool {
        self.files.iter().all(FileCheck::size_matches)
    }

    /// Present files whose size differs from the declared one.
    pub fn size_mismatches(&self) -> impl Iterator<Item = &FileCheck> {
        self.files
            .iter()
            .filter(|check| check.is_present() && !check.size_matches())
    }
}

/// Check that every file referenced by the descriptor exists next to it.
///
/// Every entry is checked even after a failure. With `verbose`, each
/// expected/found pair is logged at info level instead of debug.
pub fn validate_ovf(ovf_path: &Path, verbose: bool) -> Result<ValidationReport> {
    let document = xml::load(ovf_path)?;
    let parent = ovf_path.parent().unwrap_or_else(|| Path::new(""));

    let mut report = ValidationReport::default();
    for reference in file_references(&document.root)? {
        let path = parent.join(&reference.href);
        let status = match fs::metadata(&path) {
            Ok(metadata) => FileStatus::Present {
                size: metadata.len(),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => FileStatus::NotFound,
            Err(e) => FileStatus::Unreadable {
                reason: e.to_string(),
            },
        };
        let check = FileCheck {
            href: reference.href,
            expected: reference.size,
            status,
        };

        if !check.is_present() {
            warn!(path = %path.display(), "referenced file is not usable");
        }
        if verbose {
            info!("{check}");
        } else {
            debug!("{check}");
        }
        report.files.push(check);
    }

    Ok(report)
}
