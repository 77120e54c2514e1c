//! Remapping disk files between two revisions of a template.
//!
//! When a template is re-exported its disk files get new names. The old files
//! (already staged in the seeds directory) can be reused by renaming each one
//! to the name the new revision gives the same VM/slot. See
//! [`crate::correlate`] for how disks are identified.

use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::correlate::{map_disks, DiskKey};
use crate::error::{Error, Result};

/// One moved disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapRow {
    pub vm: String,
    pub disk: String,
    pub old_name: String,
    pub new_name: String,
}

/// A move that the file system refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapFailure {
    pub row: RemapRow,
    pub error: String,
}

/// Outcome of [`remap_ovf`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    pub moved: Vec<RemapRow>,
    /// Keys of the old revision that the new revision does not have. Their
    /// files are left where they are.
    pub unmatched: Vec<DiskKey>,
    pub failed: Vec<RemapFailure>,
}

impl RemapReport {
    /// Whether every old disk found its new name and was moved.
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty() && self.failed.is_empty()
    }
}

impl std::fmt::Display for RemapReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows = self.moved.iter().chain(self.failed.iter().map(|f| &f.row));
        let vm_width = rows.clone().map(|r| r.vm.len()).chain([2]).max().unwrap_or(2);
        let disk_width = rows.clone().map(|r| r.disk.len()).chain([4]).max().unwrap_or(4);
        let old_width = rows.map(|r| r.old_name.len()).chain([8]).max().unwrap_or(8);

        writeln!(
            f,
            "{:<vm_width$}  {:<disk_width$}  {:<old_width$}  NEW NAME",
            "VM", "DISK", "OLD NAME"
        )?;
        for row in &self.moved {
            writeln!(
                f,
                "{:<vm_width$}  {:<disk_width$}  {:<old_width$}  {}",
                row.vm, row.disk, row.old_name, row.new_name
            )?;
        }
        for failure in &self.failed {
            let row = &failure.row;
            writeln!(
                f,
                "{:<vm_width$}  {:<disk_width$}  {:<old_width$}  {} (FAILED: {})",
                row.vm, row.disk, row.old_name, row.new_name, failure.error
            )?;
        }
        for key in &self.unmatched {
            writeln!(
                f,
                "{:<vm_width$}  {:<disk_width$}  {:<old_width$}  (no match)",
                key.vm, key.slot, ""
            )?;
        }
        Ok(())
    }
}

/// Progress of a running remap.
#[derive(Debug, Clone)]
pub struct RemapProgress {
    /// Disks handled so far, including this one.
    pub completed: usize,
    pub total: usize,
    pub key: DiskKey,
}

/// Type alias for the remap progress callback.
pub type RemapCallback = Box<dyn Fn(RemapProgress) + Send>;

/// Move every disk of `old_ovf` found in `seed_dir` to the name `new_ovf`
/// gives the same VM/slot in `lib_dir`.
///
/// `seed_dir` and `lib_dir` must be on one file system; files are renamed,
/// never copied. Missing keys and failed moves are reported and do not stop
/// the remaining moves.
pub fn remap_ovf(
    old_ovf: &Path,
    new_ovf: &Path,
    lib_dir: &Path,
    seed_dir: &Path,
    progress_callback: Option<RemapCallback>,
) -> Result<RemapReport> {
    for dir in [lib_dir, seed_dir] {
        if !dir.is_dir() {
            return Err(Error::remap(format!(
                "'{}' is not a directory",
                dir.display()
            )));
        }
    }

    let old_map = map_disks(old_ovf)?;
    let new_map = map_disks(new_ovf)?;
    let total = old_map.len();

    let mut report = RemapReport::default();
    for (index, (key, old)) in old_map.iter().enumerate() {
        match new_map.get(key) {
            Some(new) => {
                let row = RemapRow {
                    vm: key.vm.clone(),
                    disk: key.slot.clone(),
                    old_name: old.file_name.clone(),
                    new_name: new.file_name.clone(),
                };
                let from = seed_dir.join(&row.old_name);
                let to = lib_dir.join(&row.new_name);
                match fs::rename(&from, &to) {
                    Ok(()) => {
                        info!(%key, old = %row.old_name, new = %row.new_name, "moved disk");
                        report.moved.push(row);
                    }
                    Err(e) => {
                        error!(
                            %key,
                            old = %from.display(),
                            new = %to.display(),
                            error = %e,
                            "failed to move disk"
                        );
                        report.failed.push(RemapFailure {
                            row,
                            error: e.to_string(),
                        });
                    }
                }
            }
            None => {
                error!(%key, old = %old.file_name, "no matching disk in the new template");
                report.unmatched.push(key.clone());
            }
        }

        if let Some(ref callback) = progress_callback {
            callback(RemapProgress {
                completed: index + 1,
                total,
                key: key.clone(),
            });
        }
    }

    Ok(report)
}
