//! Manifest (`.mf`) maintenance.
//!
//! A manifest lists one `SHA256(<file>)= <hex>` line per file of the package.
//! Mutating the descriptor invalidates its own line, so every pass that writes
//! the OVF is followed by [`update_manifest`], which rewrites that single line
//! and leaves every other byte of the manifest alone.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Read size used while hashing.
pub const HASH_BLOCK_SIZE: usize = 4096;

/// Result of [`update_manifest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    /// The descriptor's line now carries `hash`.
    Updated { hash: String },
    /// The line already carried `hash`; nothing was written.
    Unchanged { hash: String },
    /// The manifest has no line for the descriptor.
    NoEntry,
    /// There is no manifest file.
    MissingManifest,
    /// There is no descriptor to hash.
    MissingOvf,
}

/// Hex SHA-256 of the file at `path`, read in [`HASH_BLOCK_SIZE`] blocks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(e, path))?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; HASH_BLOCK_SIZE];
    loop {
        let read = file.read(&mut block).map_err(|e| Error::io(e, path))?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// The descriptor path with its extension swapped for `.mf`.
pub fn default_manifest_path(ovf_path: &Path) -> PathBuf {
    ovf_path.with_extension("mf")
}

/// Replace the hash on every `SHA256(<file_name>)= ` line of `manifest`.
///
/// Returns `None` when no line names `file_name`. Line endings and all other
/// lines are preserved.
pub fn rewrite_manifest_entry(manifest: &str, file_name: &str, hash: &str) -> Option<String> {
    let prefix = format!("SHA256({file_name})= ");
    let mut found = false;
    let mut rewritten = String::with_capacity(manifest.len());

    for line in manifest.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        match body.find(&prefix) {
            Some(start) => {
                found = true;
                rewritten.push_str(&body[..start]);
                rewritten.push_str(&prefix);
                rewritten.push_str(hash);
                rewritten.push_str(&line[body.len()..]);
            }
            None => rewritten.push_str(line),
        }
    }

    found.then_some(rewritten)
}

/// Refresh the descriptor's hash in its manifest.
///
/// `manifest_path` defaults to [`default_manifest_path`]. A missing descriptor
/// or manifest is not an error.
pub fn update_manifest(ovf_path: &Path, manifest_path: Option<&Path>) -> Result<ManifestStatus> {
    if !ovf_path.is_file() {
        debug!(ovf = %ovf_path.display(), "no descriptor to hash");
        return Ok(ManifestStatus::MissingOvf);
    }
    let manifest_path = manifest_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_manifest_path(ovf_path));
    if !manifest_path.is_file() {
        debug!(manifest = %manifest_path.display(), "no manifest to update");
        return Ok(ManifestStatus::MissingManifest);
    }

    let hash = sha256_file(ovf_path)?;
    let file_name = ovf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let manifest =
        fs::read_to_string(&manifest_path).map_err(|e| Error::io(e, &manifest_path))?;

    let Some(rewritten) = rewrite_manifest_entry(&manifest, &file_name, &hash) else {
        warn!(manifest = %manifest_path.display(), file = %file_name, "manifest has no entry for descriptor");
        return Ok(ManifestStatus::NoEntry);
    };
    if rewritten == manifest {
        return Ok(ManifestStatus::Unchanged { hash });
    }

    fs::write(&manifest_path, rewritten).map_err(|e| Error::io(e, &manifest_path))?;
    info!(manifest = %manifest_path.display(), %hash, "updated descriptor hash");
    Ok(ManifestStatus::Updated { hash })
}
