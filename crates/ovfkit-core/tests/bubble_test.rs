//! Integration tests for time bubbles.

mod common;

use std::fs;

use common::{copy_fixture, OvfBuilder};
use ovfkit_core::bubble::{RTC_START_TIME_KEY, STARTUP_SYNC_KEY, TOOLS_SYNC_TIME_KEY};
use ovfkit_core::ovf::names;
use ovfkit_core::xml::{self, Document};
use ovfkit_core::{
    apply_time_bubble, bubble_ovf, sha256_file, unbubble_ovf, BubbleOutcome, ManifestStatus,
};
use tempfile::TempDir;

const START: u64 = 1702666800;

/// `(key, value)` of every ExtraConfig entry of `vm`.
fn extra_config(document: &Document, vm: &str) -> Vec<(String, String)> {
    let system = document
        .root
        .descendants(names::VIRTUAL_SYSTEM)
        .into_iter()
        .find(|s| s.attr(names::OVF_ID) == Some(vm))
        .expect("VM not found");
    system
        .descendants(names::VMW_EXTRA_CONFIG)
        .into_iter()
        .map(|e| {
            (
                e.attr(names::VMW_KEY).unwrap_or_default().to_string(),
                e.attr(names::VMW_VALUE).unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[test]
fn test_bubble_adds_three_entries_per_vm() {
    let dir = TempDir::new().unwrap();
    let ovf = copy_fixture(dir.path(), "lab");

    let report = bubble_ovf(START, &ovf, None).unwrap();
    assert!(report.changed());
    assert_eq!(report.vms.len(), 2);
    assert!(report.vms.iter().all(|vm| vm.outcome == BubbleOutcome::Applied));

    let document = xml::load(&ovf).unwrap();
    let vm1 = extra_config(&document, "vm1");
    assert_eq!(
        vm1,
        vec![
            ("nvram".to_string(), "vm1.nvram".to_string()),
            (TOOLS_SYNC_TIME_KEY.to_string(), "FALSE".to_string()),
            (STARTUP_SYNC_KEY.to_string(), "FALSE".to_string()),
            (RTC_START_TIME_KEY.to_string(), START.to_string()),
        ]
    );
    let vm2 = extra_config(&document, "vm2");
    assert_eq!(vm2.len(), 3);

    let serialized = fs::read_to_string(&ovf).unwrap();
    assert!(serialized.contains(
        "<vmw:ExtraConfig ovf:required=\"true\" vmw:key=\"rtc.startTime\" vmw:value=\"1702666800\"/>"
    ));
}

#[test]
fn test_bubble_does_not_overwrite_existing_start_time() {
    let dir = TempDir::new().unwrap();
    let ovf = copy_fixture(dir.path(), "lab");
    bubble_ovf(START, &ovf, None).unwrap();

    let report = bubble_ovf(START + 3600, &ovf, None).unwrap();

    assert!(!report.changed());
    assert_eq!(
        report.vms[0].outcome,
        BubbleOutcome::AlreadyBubbled {
            start_time: START.to_string()
        }
    );
    let document = xml::load(&ovf).unwrap();
    assert_eq!(extra_config(&document, "vm1").len(), 4);
}

#[test]
fn test_bubble_reuses_stray_sync_entry() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("lab.ovf");
    let source = fs::read_to_string(common::fixture_path()).unwrap().replace(
        "vmw:key=\"nvram\" vmw:value=\"vm1.nvram\"/>",
        "vmw:key=\"nvram\" vmw:value=\"vm1.nvram\"/>\n\
         <vmw:ExtraConfig ovf:required=\"false\" vmw:key=\"tools.syncTime\" vmw:value=\"TRUE\"/>",
    );
    fs::write(&ovf, source).unwrap();

    let report = bubble_ovf(START, &ovf, None).unwrap();
    assert_eq!(report.vms[0].outcome, BubbleOutcome::Applied);

    let document = xml::load(&ovf).unwrap();
    let vm1 = extra_config(&document, "vm1");
    let sync: Vec<_> = vm1
        .iter()
        .filter(|(key, _)| key == TOOLS_SYNC_TIME_KEY)
        .collect();
    assert_eq!(sync, vec![&(TOOLS_SYNC_TIME_KEY.to_string(), "FALSE".to_string())]);
    assert_eq!(vm1.len(), 4);

    let unbubbled = unbubble_ovf(&ovf, None).unwrap();
    assert!(matches!(
        unbubbled.vms[0].outcome,
        BubbleOutcome::Removed { entries: 3, .. }
    ));
}

#[test]
fn test_unbubble_removes_bubble_entries_only() {
    let dir = TempDir::new().unwrap();
    let ovf = copy_fixture(dir.path(), "lab");
    bubble_ovf(START, &ovf, None).unwrap();

    let report = unbubble_ovf(&ovf, None).unwrap();

    assert_eq!(
        report.vms[0].outcome,
        BubbleOutcome::Removed {
            start_time: Some(START.to_string()),
            entries: 3,
        }
    );
    let document = xml::load(&ovf).unwrap();
    assert_eq!(
        extra_config(&document, "vm1"),
        vec![("nvram".to_string(), "vm1.nvram".to_string())]
    );
    assert!(extra_config(&document, "vm2").is_empty());
}

#[test]
fn test_unbubble_without_bubble() {
    let dir = TempDir::new().unwrap();
    let ovf = copy_fixture(dir.path(), "lab");

    let report = unbubble_ovf(&ovf, None).unwrap();

    assert!(!report.changed());
    assert!(report
        .vms
        .iter()
        .all(|vm| vm.outcome == BubbleOutcome::NotBubbled));
}

#[test]
fn test_bubble_writes_backup_first() {
    let dir = TempDir::new().unwrap();
    let ovf = copy_fixture(dir.path(), "lab");
    let backup = dir.path().join("lab.before");

    let report = bubble_ovf(START, &ovf, Some(&backup)).unwrap();

    assert_eq!(report.backup_path.as_deref(), Some(backup.as_path()));
    let saved = xml::load(&backup).unwrap();
    assert_eq!(extra_config(&saved, "vm1").len(), 1);
}

#[test]
fn test_bubble_declares_vmw_namespace_when_missing() {
    let dir = TempDir::new().unwrap();
    let ovf = dir.path().join("plain.ovf");
    OvfBuilder::new()
        .file("file1", "a.vmdk", 1024)
        .disk("vmdisk1", "file1")
        .vm_disk("vm1", "Hard disk 1", "vmdisk1")
        .write(&ovf);

    bubble_ovf(START, &ovf, None).unwrap();

    let document = xml::load(&ovf).unwrap();
    assert_eq!(
        document.namespaces.get("vmw"),
        Some(ovfkit_core::ovf::VMW_NS)
    );
    assert_eq!(extra_config(&document, "vm1").len(), 3);
}

#[test]
fn test_apply_time_bubble_refreshes_manifest() {
    let dir = TempDir::new().unwrap();
    let ovf = copy_fixture(dir.path(), "lab");
    let manifest = dir.path().join("lab.mf");
    fs::write(
        &manifest,
        "SHA256(lab.ovf)= 00\nSHA256(lab-vapp-disk1.vmdk)= 11\n",
    )
    .unwrap();

    let (report, status) = apply_time_bubble(&ovf, START).unwrap();
    assert!(report.changed());
    assert!(dir.path().join("lab.ovf.backup").is_file());

    let hash = sha256_file(&ovf).unwrap();
    assert_eq!(status, ManifestStatus::Updated { hash: hash.clone() });
    assert_eq!(
        fs::read_to_string(&manifest).unwrap(),
        format!("SHA256(lab.ovf)= {hash}\nSHA256(lab-vapp-disk1.vmdk)= 11\n")
    );

    let (report, _) = apply_time_bubble(&ovf, 0).unwrap();
    assert!(matches!(
        report.vms[0].outcome,
        BubbleOutcome::Removed { entries: 3, .. }
    ));
}
