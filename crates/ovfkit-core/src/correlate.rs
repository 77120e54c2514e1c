//! Disk/VM correlation.
//!
//! File names inside an exported template (`vm-disk1.vmdk`, ...) are assigned
//! per export and say nothing about which VM owns the disk. The stable
//! identity of a disk is its owning VM plus its slot label, reached through
//! three joins:
//!
//! ```text
//! References/File      id=file1      href=lab-disk1.vmdk
//! DiskSection/Disk     fileRef=file1 diskId=vmdisk1
//! VirtualSystem/Item   HostResource=ovf:/disk/vmdisk1  ElementName=Hard disk 1
//! ```
//!
//! [`map_disks`] follows them and produces `VM:slot -> file name`. Rows that
//! cannot be joined are reported as [`Exclusion`]s rather than aborting.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tracing::{error, warn};

use crate::error::Result;
use crate::ovf::OvfView;
use crate::xml;

/// Stable identity of a disk: owning VM and VM-local slot label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskKey {
    pub vm: String,
    pub slot: String,
}

impl DiskKey {
    pub fn new(vm: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            vm: vm.into(),
            slot: slot.into(),
        }
    }
}

impl std::fmt::Display for DiskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.vm, self.slot)
    }
}

/// A fully joined disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    pub file_ref: String,
    pub file_name: String,
    pub disk_id: String,
}

/// A disk left out of the map, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// A hard disk item points at a disk id the `DiskSection` does not have.
    UnknownDisk { key: DiskKey, disk_id: String },
    /// The disk's file reference is absent from `References`.
    MissingReference {
        key: DiskKey,
        disk_id: String,
        file_ref: Option<String>,
    },
    /// A second disk claimed a VM/slot pair that is already mapped.
    DuplicateSlot { key: DiskKey, disk_id: String },
    /// No VM's hardware refers to the disk.
    Unattached { disk_id: String },
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exclusion::UnknownDisk { key, disk_id } => {
                write!(f, "{key}: disk '{disk_id}' is not in the DiskSection")
            }
            Exclusion::MissingReference {
                key,
                disk_id,
                file_ref,
            } => write!(
                f,
                "{key}: disk '{disk_id}' references file '{}' which is not in References",
                file_ref.as_deref().unwrap_or("<none>")
            ),
            Exclusion::DuplicateSlot { key, disk_id } => {
                write!(f, "{key}: disk '{disk_id}' duplicates an existing slot")
            }
            Exclusion::Unattached { disk_id } => {
                write!(f, "disk '{disk_id}' is not attached to any VM")
            }
        }
    }
}

/// `VM:slot -> file` mapping for one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskMap {
    records: BTreeMap<DiskKey, DiskRecord>,
    excluded: Vec<Exclusion>,
}

impl DiskMap {
    /// The record for `key`.
    pub fn get(&self, key: &DiskKey) -> Option<&DiskRecord> {
        self.records.get(key)
    }

    /// File name of the disk in `slot` of `vm`.
    pub fn file_name(&self, vm: &str, slot: &str) -> Option<&str> {
        self.records
            .get(&DiskKey::new(vm, slot))
            .map(|r| r.file_name.as_str())
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&DiskKey, &DiskRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Disks that could not be mapped.
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    /// The mapping keyed by `VM:slot` strings.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.records
            .iter()
            .map(|(key, record)| (key.to_string(), record.file_name.clone()))
            .collect()
    }
}

/// Build the disk map of the descriptor at `ovf_path`.
pub fn map_disks(ovf_path: &Path) -> Result<DiskMap> {
    let document = xml::load(ovf_path)?;
    let view = OvfView::from_document(&document)?;
    Ok(correlate(&view))
}

/// Join the three sections of `view`.
pub fn correlate(view: &OvfView) -> DiskMap {
    let files: HashMap<&str, &str> = view
        .references
        .iter()
        .map(|r| (r.id.as_str(), r.href.as_str()))
        .collect();
    let disks: HashMap<&str, _> = view
        .disks
        .iter()
        .map(|d| (d.disk_id.as_str(), d))
        .collect();

    let mut map = DiskMap::default();
    let mut attached = HashSet::new();

    for system in &view.systems {
        for hard_disk in &system.hard_disks {
            let key = DiskKey::new(&system.name, &hard_disk.label);
            let disk_id = hard_disk.disk_id.clone();

            let Some(disk) = disks.get(disk_id.as_str()) else {
                exclude(&mut map, Exclusion::UnknownDisk { key, disk_id });
                continue;
            };
            attached.insert(disk.disk_id.as_str());

            let file_name = disk
                .file_ref
                .as_deref()
                .and_then(|file_ref| files.get(file_ref));
            let (Some(file_ref), Some(file_name)) = (disk.file_ref.clone(), file_name) else {
                exclude(
                    &mut map,
                    Exclusion::MissingReference {
                        key,
                        disk_id,
                        file_ref: disk.file_ref.clone(),
                    },
                );
                continue;
            };

            if map.records.contains_key(&key) {
                exclude(&mut map, Exclusion::DuplicateSlot { key, disk_id });
                continue;
            }
            map.records.insert(
                key,
                DiskRecord {
                    file_ref,
                    file_name: file_name.to_string(),
                    disk_id,
                },
            );
        }
    }

    for disk in &view.disks {
        if !attached.contains(disk.disk_id.as_str()) {
            exclude(
                &mut map,
                Exclusion::Unattached {
                    disk_id: disk.disk_id.clone(),
                },
            );
        }
    }

    map
}

fn exclude(map: &mut DiskMap, exclusion: Exclusion) {
    match exclusion {
        Exclusion::Unattached { .. } => warn!("{exclusion}"),
        _ => error!("malformed OVF: {exclusion}"),
    }
    map.excluded.push(exclusion);
}
