//! Integration tests for disk/VM correlation.

mod common;

use common::{fixture_path, OvfBuilder};
use ovfkit_core::{map_disks, DiskKey, Exclusion};
use tempfile::TempDir;

#[test]
fn test_map_disks_fixture() {
    let map = map_disks(fixture_path()).expect("Failed to map disks");

    let entries: Vec<_> = map.to_string_map().into_iter().collect();
    assert_eq!(
        entries,
        vec![
            ("vm1:Hard disk 1".to_string(), "lab-vapp-disk1.vmdk".to_string()),
            ("vm1:Hard disk 2".to_string(), "lab-vapp-disk2.vmdk".to_string()),
            ("vm2:Hard disk 1".to_string(), "lab-vapp-disk3.vmdk".to_string()),
        ]
    );
    assert!(map.excluded().is_empty());

    let record = map.get(&DiskKey::new("vm1", "Hard disk 2")).unwrap();
    assert_eq!(record.disk_id, "vmdisk2");
    assert_eq!(record.file_ref, "file2");
}

#[test]
fn test_map_disks_is_deterministic() {
    let first = map_disks(fixture_path()).unwrap();
    let second = map_disks(fixture_path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_map_disks_excludes_broken_joins() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("broken.ovf");
    OvfBuilder::new()
        .file("file1", "ok.vmdk", 1024)
        .disk("vmdisk1", "file1")
        .disk("vmdisk2", "file7")
        .disk("vmdisk3", "file1")
        .vm_disk("vm1", "Hard disk 1", "vmdisk1")
        .vm_disk("vm1", "Hard disk 2", "vmdisk2")
        .vm_disk("vm1", "Hard disk 3", "vmdisk9")
        .write(&ovf);

    let map = map_disks(&ovf).unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(map.file_name("vm1", "Hard disk 1"), Some("ok.vmdk"));
    assert_eq!(
        map.excluded(),
        &[
            Exclusion::MissingReference {
                key: DiskKey::new("vm1", "Hard disk 2"),
                disk_id: "vmdisk2".to_string(),
                file_ref: Some("file7".to_string()),
            },
            Exclusion::UnknownDisk {
                key: DiskKey::new("vm1", "Hard disk 3"),
                disk_id: "vmdisk9".to_string(),
            },
            Exclusion::Unattached {
                disk_id: "vmdisk3".to_string(),
            },
        ]
    );
}

#[test]
fn test_map_disks_duplicate_slot() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("dup.ovf");
    OvfBuilder::new()
        .file("file1", "a.vmdk", 1024)
        .file("file2", "b.vmdk", 1024)
        .disk("vmdisk1", "file1")
        .disk("vmdisk2", "file2")
        .vm_disk("vm1", "Hard disk 1", "vmdisk1")
        .vm_disk("vm1", "Hard disk 1", "vmdisk2")
        .write(&ovf);

    let map = map_disks(&ovf).unwrap();

    assert_eq!(map.file_name("vm1", "Hard disk 1"), Some("a.vmdk"));
    assert!(matches!(
        map.excluded(),
        [Exclusion::DuplicateSlot { disk_id, .. }] if disk_id == "vmdisk2"
    ));
}

#[test]
fn test_map_disks_reports_missing_required_attribute() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("bad.ovf");
    std::fs::write(
        &ovf,
        r#"<Envelope xmlns="http://schemas.dmtf.org/ovf/envelope/1"
                     xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1">
             <DiskSection><Disk ovf:capacity="10"/></DiskSection>
           </Envelope>"#,
    )
    .unwrap();

    let err = map_disks(&ovf).unwrap_err();
    assert!(matches!(err, ovfkit_core::Error::Ovf { .. }));
    assert!(err.to_string().contains("diskId"));
}
