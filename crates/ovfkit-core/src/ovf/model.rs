//! Typed views over the OVF sections that ovfkit reads.
//!
//! Each view is built once per parse and checks its required attributes up
//! front, so a descriptor missing e.g. `ovf:diskId` fails with one error that
//! names the element instead of somewhere deep inside a pass.

use crate::error::{Error, Result};
use crate::xml::{Document, Element, QName};

use super::names;
use super::{is_hard_disk, virtual_systems, vm_name};

/// Prefix of a `rasd:HostResource` that points into the `DiskSection`.
pub const HOST_RESOURCE_PREFIX: &str = "ovf:/disk/";

/// One `File` row of the `References` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// File identifier, e.g. `file1`.
    pub id: String,
    /// File name relative to the descriptor.
    pub href: String,
    /// Declared size in bytes.
    pub size: Option<u64>,
}

impl FileReference {
    pub fn from_element(element: &Element) -> Result<Self> {
        Ok(Self {
            id: required(element, names::OVF_ID)?.to_string(),
            href: required(element, names::OVF_HREF)?.to_string(),
            size: optional_u64(element, names::OVF_SIZE)?,
        })
    }
}

/// One `Disk` row of the `DiskSection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    /// Disk identifier, e.g. `vmdisk1`.
    pub disk_id: String,
    /// Back-reference to a [`FileReference`]; blank disks have none.
    pub file_ref: Option<String>,
    /// Declared capacity in `allocation_units`.
    pub capacity: u64,
    /// Capacity allocation unit string, e.g. `byte * 2^30`.
    pub allocation_units: Option<String>,
    /// Bytes actually populated.
    pub populated_size: Option<u64>,
}

impl DiskDescriptor {
    pub fn from_element(element: &Element) -> Result<Self> {
        let disk_id = required(element, names::OVF_DISK_ID)?.to_string();
        let capacity = required(element, names::OVF_CAPACITY)?;
        let capacity = capacity.trim().parse::<u64>().map_err(|_| {
            Error::ovf(format!(
                "Disk '{}' has a non-numeric capacity '{}'",
                disk_id, capacity
            ))
        })?;
        Ok(Self {
            file_ref: element.attr(names::OVF_FILE_REF).map(str::to_string),
            capacity,
            allocation_units: element
                .attr(names::OVF_CAPACITY_UNITS)
                .map(str::to_string),
            populated_size: optional_u64(element, names::OVF_POPULATED_SIZE)?,
            disk_id,
        })
    }
}

/// A "Hard disk" hardware item of a virtual system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardDisk {
    /// VM-local slot label (`rasd:ElementName`), e.g. `Hard disk 1`.
    pub label: String,
    /// Disk identifier recovered from `rasd:HostResource`.
    pub disk_id: String,
}

/// A virtual system and its hard disks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualSystem {
    pub name: String,
    pub hard_disks: Vec<HardDisk>,
}

/// The sections of a descriptor needed to correlate disks with VMs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OvfView {
    pub references: Vec<FileReference>,
    pub disks: Vec<DiskDescriptor>,
    pub systems: Vec<VirtualSystem>,
}

impl OvfView {
    pub fn from_document(document: &Document) -> Result<Self> {
        let root = &document.root;
        Ok(Self {
            references: file_references(root)?,
            disks: disk_descriptors(root)?,
            systems: virtual_systems(root)
                .into_iter()
                .map(virtual_system)
                .collect::<Result<_>>()?,
        })
    }
}

/// `References/File` entries whose identifier contains `file`.
pub fn file_references(root: &Element) -> Result<Vec<FileReference>> {
    let mut references = Vec::new();
    for section in root.find_all(names::REFERENCES) {
        for file in section.find_all(names::FILE) {
            let reference = FileReference::from_element(file)?;
            if reference.id.contains("file") {
                references.push(reference);
            }
        }
    }
    Ok(references)
}

/// `DiskSection/Disk` entries.
pub fn disk_descriptors(root: &Element) -> Result<Vec<DiskDescriptor>> {
    root.find_all(names::DISK_SECTION)
        .flat_map(|section| section.find_all(names::DISK))
        .map(DiskDescriptor::from_element)
        .collect()
}

/// Recover the bare disk identifier from a `rasd:HostResource` value.
pub fn disk_id_from_host_resource(host_resource: &str) -> &str {
    let host_resource = host_resource.trim();
    match host_resource.strip_prefix(HOST_RESOURCE_PREFIX) {
        Some(disk_id) => disk_id,
        None => host_resource.rsplit('/').next().unwrap_or(host_resource),
    }
}

fn virtual_system(system: &Element) -> Result<VirtualSystem> {
    let name = vm_name(system).to_string();
    let mut hard_disks = Vec::new();
    for hardware in system.find_all(names::VIRTUAL_HARDWARE_SECTION) {
        for item in hardware.find_all(names::ITEM).filter(|i| is_hard_disk(i)) {
            let label = item.find(names::RASD_ELEMENT_NAME).ok_or_else(|| {
                Error::ovf(format!("{name}: hard disk item has no rasd:ElementName"))
            })?;
            let host_resource = item.find(names::RASD_HOST_RESOURCE).ok_or_else(|| {
                Error::ovf(format!(
                    "{name}: hard disk '{}' has no rasd:HostResource",
                    label.text()
                ))
            })?;
            hard_disks.push(HardDisk {
                label: label.text().trim().to_string(),
                disk_id: disk_id_from_host_resource(&host_resource.text()).to_string(),
            });
        }
    }
    Ok(VirtualSystem { name, hard_disks })
}

fn required(element: &Element, name: QName) -> Result<&str> {
    element.attr(name).ok_or_else(|| {
        Error::ovf(format!(
            "{} is missing the {} attribute",
            element.name, name.local
        ))
    })
}

fn optional_u64(element: &Element, name: QName) -> Result<Option<u64>> {
    element
        .attr(name)
        .map(|value| {
            value.trim().parse::<u64>().map_err(|_| {
                Error::ovf(format!(
                    "{} has a non-numeric {} '{}'",
                    element.name, name.local, value
                ))
            })
        })
        .transpose()
}
