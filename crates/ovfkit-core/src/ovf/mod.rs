//! OVF descriptor vocabulary and typed section views.
//!
//! vCloud Director exports a vApp template as an `Envelope` holding the file
//! `References`, a `DiskSection`, the vApp network configuration and a
//! `VirtualSystemCollection` with one `VirtualSystem` per VM. The helpers here
//! find those pieces in an [`Element`] tree; [`model`] turns them into typed
//! records and [`capacity`] holds the disk sizing arithmetic.

pub mod capacity;
pub mod model;
pub mod names;

use std::path::{Path, PathBuf};

use crate::xml::Element;

pub use capacity::{
    grow_to_fit, CapacityUnit, EztCheck, BYTES_PER_GB, BYTES_PER_MB, BYTES_PER_TB,
    EZT_TRIGGER_PERCENT,
};
pub use model::{
    disk_descriptors, disk_id_from_host_resource, file_references, DiskDescriptor,
    FileReference, HardDisk, OvfView, VirtualSystem,
};

/// DMTF OVF envelope namespace.
pub const OVF_NS: &str = "http://schemas.dmtf.org/ovf/envelope/1";
/// CIM resource allocation settings namespace.
pub const RASD_NS: &str =
    "http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_ResourceAllocationSettingData";
/// vCloud Director extension namespace.
pub const VCLOUD_NS: &str = "http://www.vmware.com/vcloud/v1.5";
/// VMware OVF extension namespace.
pub const VMW_NS: &str = "http://www.vmware.com/schema/ovf";

/// Network name vCloud uses for "not connected".
pub const NO_NETWORK: &str = "none";

/// Every `VirtualSystem` of the envelope, whether it sits directly under the
/// root or inside a `VirtualSystemCollection`.
pub fn virtual_systems(root: &Element) -> Vec<&Element> {
    let mut systems = Vec::new();
    for child in root.elements() {
        if child.is(names::VIRTUAL_SYSTEM) {
            systems.push(child);
        } else if child.is(names::VIRTUAL_SYSTEM_COLLECTION) {
            systems.extend(child.find_all(names::VIRTUAL_SYSTEM));
        }
    }
    systems
}

/// Mutable counterpart of [`virtual_systems`].
pub fn virtual_systems_mut(root: &mut Element) -> Vec<&mut Element> {
    let mut systems = Vec::new();
    for child in root.elements_mut() {
        if child.is(names::VIRTUAL_SYSTEM) {
            systems.push(child);
        } else if child.is(names::VIRTUAL_SYSTEM_COLLECTION) {
            systems.extend(child.find_all_mut(names::VIRTUAL_SYSTEM));
        }
    }
    systems
}

/// The `ovf:id` of a virtual system.
pub fn vm_name(system: &Element) -> &str {
    system.attr(names::OVF_ID).unwrap_or("<unnamed>")
}

/// Whether a hardware item describes a hard disk.
pub fn is_hard_disk(item: &Element) -> bool {
    item.find_all(names::RASD_DESCRIPTION)
        .any(|d| d.text().trim().eq_ignore_ascii_case("hard disk"))
}

/// Backup location used when the caller does not supply one:
/// `<name>.ovf.backup` next to the descriptor.
pub fn default_backup_path(ovf_path: &Path) -> PathBuf {
    let mut name = ovf_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".backup");
    ovf_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backup_path() {
        assert_eq!(
            default_backup_path(Path::new("/hol/lib/lab/lab.ovf")),
            PathBuf::from("/hol/lib/lab/lab.ovf.backup")
        );
    }
}
