//! Time bubbles.
//!
//! A lab pinned to a fixed date boots every VM with its real-time clock set to
//! a given epoch and with VMware Tools time synchronisation disabled. That is
//! three `vmw:ExtraConfig` entries per VM: [`bubble_ovf`] adds them and
//! [`unbubble_ovf`] takes them out again.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::manifest::{update_manifest, ManifestStatus};
use crate::ovf::names;
use crate::ovf::{default_backup_path, virtual_systems_mut, vm_name, OVF_NS, VMW_NS};
use crate::xml::{self, Document, Element, Namespaces};

/// Boot time of the virtual RTC, in epoch seconds.
pub const RTC_START_TIME_KEY: &str = "rtc.startTime";
/// Periodic guest time sync through VMware Tools.
pub const TOOLS_SYNC_TIME_KEY: &str = "tools.syncTime";
/// Guest time sync when VMware Tools starts.
pub const STARTUP_SYNC_KEY: &str = "time.synchronize.tools.startup";

const BUBBLE_KEYS: [&str; 3] = [TOOLS_SYNC_TIME_KEY, STARTUP_SYNC_KEY, RTC_START_TIME_KEY];

/// What happened to one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BubbleOutcome {
    /// The three entries were added.
    Applied,
    /// An RTC start time was already set and was left alone.
    AlreadyBubbled { start_time: String },
    /// Bubble entries were removed; `start_time` is the RTC value they held.
    Removed {
        start_time: Option<String>,
        entries: usize,
    },
    /// There was nothing to remove.
    NotBubbled,
    /// The VM has no virtual hardware section to hold the entries.
    NoHardwareSection,
}

/// Per-VM outcome of a bubble or unbubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmBubble {
    pub vm: String,
    pub outcome: BubbleOutcome,
}

/// Outcome of [`bubble_ovf`] or [`unbubble_ovf`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BubbleReport {
    pub vms: Vec<VmBubble>,
    pub backup_path: Option<PathBuf>,
}

impl BubbleReport {
    /// Whether any VM was changed.
    pub fn changed(&self) -> bool {
        self.vms.iter().any(|vm| {
            matches!(
                vm.outcome,
                BubbleOutcome::Applied | BubbleOutcome::Removed { .. }
            )
        })
    }
}

/// Pin every VM of the descriptor at `ovf_path` to `start_time`.
pub fn bubble_ovf(start_time: u64, ovf_path: &Path, backup_path: Option<&Path>) -> Result<BubbleReport> {
    mutate_with_backup(ovf_path, backup_path, |document| {
        bubble_document(document, start_time)
    })
}

/// Remove the time bubble from every VM of the descriptor at `ovf_path`.
pub fn unbubble_ovf(ovf_path: &Path, backup_path: Option<&Path>) -> Result<BubbleReport> {
    mutate_with_backup(ovf_path, backup_path, |document| Ok(unbubble_document(document)))
}

/// Bubble when `start_time > 0`, otherwise unbubble, then refresh the
/// manifest so the package stays verifiable.
pub fn apply_time_bubble(ovf_path: &Path, start_time: u64) -> Result<(BubbleReport, ManifestStatus)> {
    let backup_path = default_backup_path(ovf_path);
    let report = if start_time > 0 {
        bubble_ovf(start_time, ovf_path, Some(&backup_path))?
    } else {
        unbubble_ovf(ovf_path, Some(&backup_path))?
    };
    let manifest = update_manifest(ovf_path, None)?;
    Ok((report, manifest))
}

/// Add the bubble entries to every VM that has no RTC start time yet.
pub fn bubble_document(document: &mut Document, start_time: u64) -> Result<BubbleReport> {
    document.ensure_namespace("ovf", OVF_NS);
    document.ensure_namespace("vmw", VMW_NS);
    let namespaces = &document.namespaces;

    let start_time = start_time.to_string();
    let mut report = BubbleReport::default();
    for system in virtual_systems_mut(&mut document.root) {
        let vm = vm_name(system).to_string();
        let Some(hardware) = system.find_all_mut(names::VIRTUAL_HARDWARE_SECTION).next() else {
            warn!(vm = %vm, "no VirtualHardwareSection, cannot bubble");
            report.vms.push(VmBubble {
                vm,
                outcome: BubbleOutcome::NoHardwareSection,
            });
            continue;
        };

        let outcome = match extra_config_value(hardware, RTC_START_TIME_KEY) {
            Some(existing) => {
                info!(vm = %vm, start_time = %existing, "already bubbled, leaving as is");
                BubbleOutcome::AlreadyBubbled {
                    start_time: existing,
                }
            }
            None => {
                set_extra_config(hardware, namespaces, TOOLS_SYNC_TIME_KEY, "FALSE")?;
                set_extra_config(hardware, namespaces, STARTUP_SYNC_KEY, "FALSE")?;
                set_extra_config(hardware, namespaces, RTC_START_TIME_KEY, &start_time)?;
                info!(vm = %vm, start_time = %start_time, "bubbled");
                BubbleOutcome::Applied
            }
        };
        report.vms.push(VmBubble { vm, outcome });
    }
    Ok(report)
}

/// Remove every bubble entry from every VM.
pub fn unbubble_document(document: &mut Document) -> BubbleReport {
    let mut report = BubbleReport::default();
    for system in virtual_systems_mut(&mut document.root) {
        let vm = vm_name(system).to_string();
        let mut start_time = None;
        let mut entries = 0;
        for hardware in system.find_all_mut(names::VIRTUAL_HARDWARE_SECTION) {
            if start_time.is_none() {
                start_time = extra_config_value(hardware, RTC_START_TIME_KEY);
            }
            let before = hardware.children.len();
            hardware.children.retain(|node| {
                !matches!(node, xml::Node::Element(e) if is_bubble_entry(e))
            });
            entries += before - hardware.children.len();
        }

        let outcome = if entries == 0 {
            BubbleOutcome::NotBubbled
        } else {
            info!(
                vm = %vm,
                previous_start_time = start_time.as_deref().unwrap_or("<unset>"),
                entries,
                "removed time bubble"
            );
            BubbleOutcome::Removed {
                start_time,
                entries,
            }
        };
        report.vms.push(VmBubble { vm, outcome });
    }
    report
}

fn mutate_with_backup(
    ovf_path: &Path,
    backup_path: Option<&Path>,
    mutate: impl FnOnce(&mut Document) -> Result<BubbleReport>,
) -> Result<BubbleReport> {
    let mut document = xml::load(ovf_path)?;
    let backup_path = backup_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_backup_path(ovf_path));
    document.save(&backup_path)?;

    let mut report = mutate(&mut document)?;
    document.save(ovf_path)?;
    report.backup_path = Some(backup_path);
    Ok(report)
}

fn is_bubble_entry(element: &Element) -> bool {
    element.is(names::VMW_EXTRA_CONFIG)
        && element
            .attr(names::VMW_KEY)
            .is_some_and(|key| BUBBLE_KEYS.contains(&key))
}

fn extra_config_value(hardware: &Element, key: &str) -> Option<String> {
    hardware
        .find_all(names::VMW_EXTRA_CONFIG)
        .find(|e| e.attr(names::VMW_KEY) == Some(key))
        .map(|e| e.attr(names::VMW_VALUE).unwrap_or_default().to_string())
}

/// Set `key` to `value`, reusing an entry already present under that key.
fn set_extra_config(
    hardware: &mut Element,
    namespaces: &Namespaces,
    key: &str,
    value: &str,
) -> Result<()> {
    let existing = hardware
        .find_all_mut(names::VMW_EXTRA_CONFIG)
        .find(|e| e.attr(names::VMW_KEY) == Some(key));
    if let Some(entry) = existing {
        entry.set_attr(namespaces, names::OVF_REQUIRED, "true")?;
        entry.set_attr(namespaces, names::VMW_VALUE, value)?;
        return Ok(());
    }

    let mut entry = namespaces.element(names::VMW_EXTRA_CONFIG)?;
    entry.set_attr(namespaces, names::OVF_REQUIRED, "true")?;
    entry.set_attr(namespaces, names::VMW_KEY, key)?;
    entry.set_attr(namespaces, names::VMW_VALUE, value)?;
    hardware.push(entry);
    Ok(())
}
