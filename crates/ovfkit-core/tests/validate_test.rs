//! Integration tests for package validation.

mod common;

use common::{write_file_of_size, OvfBuilder};
use ovfkit_core::{validate_ovf, FileStatus};
use tempfile::TempDir;

fn package() -> OvfBuilder {
    OvfBuilder::new()
        .file("file1", "lab-disk1.vmdk", 4096)
        .file("file2", "lab-disk2.vmdk", 8192)
        .file("nvram", "lab.nvram", 512)
        .disk("vmdisk1", "file1")
        .disk("vmdisk2", "file2")
        .vm_disk("vm1", "Hard disk 1", "vmdisk1")
        .vm_disk("vm1", "Hard disk 2", "vmdisk2")
}

#[test]
fn test_validate_all_present() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("lab.ovf");
    package().write(&ovf);
    write_file_of_size(&dir.path().join("lab-disk1.vmdk"), 4096);
    write_file_of_size(&dir.path().join("lab-disk2.vmdk"), 8192);

    let report = validate_ovf(&ovf, false).unwrap();

    // Only ids containing "file" are checked.
    assert_eq!(report.files.len(), 2);
    assert!(report.is_valid());
    assert!(report.is_strictly_valid());
    assert_eq!(
        report.files[0].status,
        FileStatus::Present { size: 4096 }
    );
}

#[test]
fn test_validate_missing_file_checks_the_rest() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("lab.ovf");
    package().write(&ovf);
    write_file_of_size(&dir.path().join("lab-disk2.vmdk"), 8192);

    let report = validate_ovf(&ovf, true).unwrap();

    assert!(!report.is_valid());
    assert_eq!(report.files[0].status, FileStatus::NotFound);
    assert!(report.files[1].is_present());
    assert_eq!(
        report.files[0].to_string(),
        "lab-disk1.vmdk: expected size 4096, found size NOT_FOUND"
    );
}

#[test]
fn test_validate_size_mismatch_is_lenient() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("lab.ovf");
    package().write(&ovf);
    write_file_of_size(&dir.path().join("lab-disk1.vmdk"), 4000);
    write_file_of_size(&dir.path().join("lab-disk2.vmdk"), 8192);

    let report = validate_ovf(&ovf, false).unwrap();

    assert!(report.is_valid());
    assert!(!report.is_strictly_valid());
    let mismatches: Vec<_> = report.size_mismatches().collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(
        mismatches[0].to_string(),
        "lab-disk1.vmdk: expected size 4096, found size 4000"
    );
}

#[cfg(unix)]
#[test]
fn test_validate_unreadable_file_checks_the_rest() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("lab.ovf");
    OvfBuilder::new()
        .file("file1", "locked/lab-disk1.vmdk", 4096)
        .file("file2", "lab-disk2.vmdk", 8192)
        .write(&ovf);
    let locked = dir.path().join("locked");
    std::fs::create_dir(&locked).unwrap();
    write_file_of_size(&locked.join("lab-disk1.vmdk"), 4096);
    write_file_of_size(&dir.path().join("lab-disk2.vmdk"), 8192);
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can still stat through the directory.
    let bypassed = std::fs::metadata(locked.join("lab-disk1.vmdk")).is_ok();
    let report = validate_ovf(&ovf, true);
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    if bypassed {
        return;
    }

    let report = report.unwrap();
    assert!(matches!(report.files[0].status, FileStatus::Unreadable { .. }));
    assert!(!report.is_valid());
    assert_eq!(report.files[1].status, FileStatus::Present { size: 8192 });
    assert_eq!(
        report.files[0].to_string(),
        "locked/lab-disk1.vmdk: expected size 4096, found size UNABLE_TO_READ"
    );
}

#[test]
fn test_validate_missing_descriptor_is_error() {
    let dir = TempDir::new().unwrap();
    assert!(validate_ovf(&dir.path().join("lab.ovf"), false).is_err());
}
