//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Path to the vCloud-style fixture descriptor.
pub fn fixture_path() -> &'static Path {
    Path::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/lab-vapp.ovf"
    ))
}

/// Copy the fixture into `dir` as `<name>.ovf` and return its path.
pub fn copy_fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(format!("{name}.ovf"));
    fs::copy(fixture_path(), &path).expect("Failed to copy fixture");
    path
}

struct DiskSpec {
    disk_id: String,
    file_ref: String,
    capacity: u64,
    units: String,
    populated_size: Option<u64>,
}

/// Builds small descriptors with just the sections the disk tools read.
#[derive(Default)]
pub struct OvfBuilder {
    files: Vec<(String, String, u64)>,
    disks: Vec<DiskSpec>,
    vms: Vec<(String, Vec<(String, String)>)>,
}

impl OvfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, id: &str, href: &str, size: u64) -> Self {
        self.files.push((id.to_string(), href.to_string(), size));
        self
    }

    /// A 10 GB disk with no populated size.
    pub fn disk(self, disk_id: &str, file_ref: &str) -> Self {
        self.disk_with(disk_id, file_ref, 10, "byte * 2^30", None)
    }

    pub fn disk_with(
        mut self,
        disk_id: &str,
        file_ref: &str,
        capacity: u64,
        units: &str,
        populated_size: Option<u64>,
    ) -> Self {
        self.disks.push(DiskSpec {
            disk_id: disk_id.to_string(),
            file_ref: file_ref.to_string(),
            capacity,
            units: units.to_string(),
            populated_size,
        });
        self
    }

    /// Attach `disk_id` to `vm` in slot `slot`, creating the VM on first use.
    pub fn vm_disk(mut self, vm: &str, slot: &str, disk_id: &str) -> Self {
        let entry = (slot.to_string(), disk_id.to_string());
        match self.vms.iter_mut().find(|(name, _)| name == vm) {
            Some((_, disks)) => disks.push(entry),
            None => self.vms.push((vm.to_string(), vec![entry])),
        }
        self
    }

    pub fn build(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Envelope xmlns=\"http://schemas.dmtf.org/ovf/envelope/1\" \
             xmlns:ovf=\"http://schemas.dmtf.org/ovf/envelope/1\" \
             xmlns:rasd=\"http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/CIM_ResourceAllocationSettingData\">\n",
        );

        xml.push_str("  <References>\n");
        for (id, href, size) in &self.files {
            xml.push_str(&format!(
                "    <File ovf:href=\"{href}\" ovf:id=\"{id}\" ovf:size=\"{size}\"/>\n"
            ));
        }
        xml.push_str("  </References>\n  <DiskSection>\n");
        for disk in &self.disks {
            let populated = disk
                .populated_size
                .map(|size| format!(" ovf:populatedSize=\"{size}\""))
                .unwrap_or_default();
            xml.push_str(&format!(
                "    <Disk ovf:capacity=\"{}\" ovf:capacityAllocationUnits=\"{}\" \
                 ovf:diskId=\"{}\" ovf:fileRef=\"{}\"{populated}/>\n",
                disk.capacity, disk.units, disk.disk_id, disk.file_ref
            ));
        }
        xml.push_str("  </DiskSection>\n  <VirtualSystemCollection ovf:id=\"vapp\">\n");
        for (vm, disks) in &self.vms {
            xml.push_str(&format!(
                "    <VirtualSystem ovf:id=\"{vm}\">\n      <VirtualHardwareSection>\n"
            ));
            for (slot, disk_id) in disks {
                xml.push_str(&format!(
                    "        <Item>\n\
                     \x20         <rasd:Description>Hard disk</rasd:Description>\n\
                     \x20         <rasd:ElementName>{slot}</rasd:ElementName>\n\
                     \x20         <rasd:HostResource>ovf:/disk/{disk_id}</rasd:HostResource>\n\
                     \x20       </Item>\n"
                ));
            }
            xml.push_str("      </VirtualHardwareSection>\n    </VirtualSystem>\n");
        }
        xml.push_str("  </VirtualSystemCollection>\n</Envelope>\n");
        xml
    }

    /// Write the descriptor to `path`.
    pub fn write(&self, path: &Path) {
        fs::write(path, self.build()).expect("Failed to write OVF");
    }
}

/// Create `path` with `len` bytes.
pub fn write_file_of_size(path: &Path, len: u64) {
    let file = fs::File::create(path).expect("Failed to create file");
    file.set_len(len).expect("Failed to size file");
}
