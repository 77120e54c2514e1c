//! OVFKit Core Library
//!
//! This crate maintains vApp template packages (an OVF descriptor, its `.mf`
//! manifest and its disk files) kept in a lab template library.
//!
//! # Overview
//!
//! Every operation loads the descriptor into a namespace-preserving tree, works
//! on it in place and writes it back with the original prefixes. Operations
//! that mutate a descriptor write a `<name>.ovf.backup` copy first.
//!
//! # Modules
//!
//! - [`error`] - Error types and Result alias
//! - [`xml`] - Namespace-preserving XML tree
//! - [`ovf`] - OVF vocabulary, typed section views and capacity arithmetic
//! - [`validate`] - Checks that referenced files exist
//! - [`manifest`] - Refreshes the descriptor's hash in the manifest
//! - [`scrub`] - Prepares an exported template for re-import
//! - [`bubble`] - Pins VMs to a fixed RTC start time
//! - [`correlate`] - Maps VM disk slots to file names
//! - [`remap`] - Renames disk files between two revisions of a template
//!
//! # Quick Start
//!
//! ```no_run
//! use ovfkit_core::{scrub_ovf, update_manifest};
//! use std::path::Path;
//!
//! let ovf = Path::new("/hol/lib/lab/lab.ovf");
//! let report = scrub_ovf(ovf, None).unwrap();
//! println!("{} changes", report.change_count());
//! update_manifest(ovf, None).unwrap();
//! ```

pub mod bubble;
pub mod correlate;
pub mod error;
pub mod manifest;
pub mod ovf;
pub mod remap;
pub mod scrub;
pub mod validate;
pub mod xml;

pub use error::{Error, Result};

pub use bubble::{
    apply_time_bubble, bubble_ovf, unbubble_ovf, BubbleOutcome, BubbleReport, VmBubble,
};
pub use correlate::{map_disks, DiskKey, DiskMap, DiskRecord, Exclusion};
pub use manifest::{sha256_file, update_manifest, ManifestStatus};
pub use remap::{remap_ovf, RemapCallback, RemapProgress, RemapReport, RemapRow};
pub use scrub::{scrub_ovf, ScrubPass, ScrubReport};
pub use validate::{validate_ovf, FileCheck, FileStatus, ValidationReport};
pub use xml::{load, Document};
