//! OVF scrubbing.
//!
//! A vApp template exported from one cloud carries settings that break or leak
//! when it is imported elsewhere: guest customization, real passwords, routed
//! networks wired to the source org, write-through disks and capacities that
//! trip the thin-to-EZT conversion. [`scrub_ovf`] fixes all of them in place
//! after writing a backup of the untouched descriptor.
//!
//! Each pass is independent and idempotent, and returns a [`PassReport`] of
//! what it changed; running the scrubber on its own output changes nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::ovf::names;
use crate::ovf::{
    default_backup_path, grow_to_fit, is_hard_disk, virtual_systems_mut, vm_name, CapacityUnit,
    DiskDescriptor, EztCheck, FileReference, NO_NETWORK,
};
use crate::xml::{self, Document, Element, Namespaces};

/// Value given to every password property.
pub const PLACEHOLDER_PASSWORD: &str = "VMware1!VMware1!";
/// OVF environment transport delivering properties through guestinfo.
pub const GUEST_INFO_TRANSPORT: &str = "com.vmware.guestInfo";
/// Fence mode that detaches a vApp network from any parent network.
pub const ISOLATED_FENCE_MODE: &str = "isolated";
/// Extra-config key controlling disk write-through.
pub const WRITE_THROUGH_KEY: &str = "backing.writeThrough";

/// The individual scrub passes, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubPass {
    Customization,
    Passwords,
    GuestInfo,
    NetworkIsolation,
    NetworkConnections,
    ConnectionSections,
    DiskWriteThrough,
    DiskCapacity,
}

impl std::fmt::Display for ScrubPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrubPass::Customization => write!(f, "CustomizeOnInstantiate"),
            ScrubPass::Passwords => write!(f, "Passwords"),
            ScrubPass::GuestInfo => write!(f, "GuestInfo"),
            ScrubPass::NetworkIsolation => write!(f, "Network isolation and vApp network name"),
            ScrubPass::NetworkConnections => write!(f, "Network connections"),
            ScrubPass::ConnectionSections => write!(f, "NetworkConnectionSection"),
            ScrubPass::DiskWriteThrough => write!(f, "Hard disks"),
            ScrubPass::DiskCapacity => write!(f, "Disk capacity"),
        }
    }
}

/// What one pass changed, and what it had to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass: ScrubPass,
    pub changes: Vec<String>,
    pub problems: Vec<String>,
}

impl PassReport {
    fn new(pass: ScrubPass) -> Self {
        Self {
            pass,
            changes: Vec::new(),
            problems: Vec::new(),
        }
    }

    fn changed(&mut self, message: String) {
        info!(pass = %self.pass, "{message}");
        self.changes.push(message);
    }

    fn skipped(&mut self, message: String) {
        warn!(pass = %self.pass, "{message}");
        self.problems.push(message);
    }

    fn failed(&mut self, message: String) {
        error!(pass = %self.pass, "{message}");
        self.problems.push(message);
    }
}

/// Outcome of a scrub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrubReport {
    pub passes: Vec<PassReport>,
    /// vApp networks whose names were de-duplicated, old name to new name.
    pub renamed_networks: BTreeMap<String, String>,
    /// Where the untouched descriptor was saved.
    pub backup_path: Option<PathBuf>,
}

impl ScrubReport {
    /// Report of one pass.
    pub fn pass(&self, pass: ScrubPass) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.pass == pass)
    }

    /// Total number of changes across all passes.
    pub fn change_count(&self) -> usize {
        self.passes.iter().map(|p| p.changes.len()).sum()
    }

    /// Whether no pass changed anything.
    pub fn is_clean(&self) -> bool {
        self.change_count() == 0
    }
}

/// Scrub the descriptor at `ovf_path` in place.
///
/// The unmodified document is first written to `backup_path` (default
/// [`default_backup_path`]); if that fails nothing is changed.
pub fn scrub_ovf(ovf_path: &Path, backup_path: Option<&Path>) -> Result<ScrubReport> {
    let mut document = xml::load(ovf_path)?;

    let backup_path = backup_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_backup_path(ovf_path));
    document.save(&backup_path)?;
    info!(backup = %backup_path.display(), "saved backup");

    let mut report = scrub_document(&mut document);
    document.save(ovf_path)?;
    info!(
        ovf = %ovf_path.display(),
        changes = report.change_count(),
        "scrub complete"
    );

    report.backup_path = Some(backup_path);
    Ok(report)
}

/// Run every pass over a parsed document.
pub fn scrub_document(document: &mut Document) -> ScrubReport {
    let namespaces = &document.namespaces;
    let root = &mut document.root;

    let mut passes = vec![
        disable_customization(root),
        reset_passwords(root),
        force_guest_info_transport(root, namespaces),
    ];
    let (isolation, renamed_networks) = isolate_networks(root);
    passes.push(isolation);
    passes.push(update_network_connections(root, &renamed_networks));
    if !renamed_networks.is_empty() {
        passes.push(rename_connection_networks(root, &renamed_networks));
    }
    passes.push(disable_write_through(root, namespaces));
    passes.push(correct_disk_capacity(root));

    ScrubReport {
        passes,
        renamed_networks,
        backup_path: None,
    }
}

/// Collapse a network name that vCloud wrote out more than once:
/// `vAppNet-X-vAppNet-X` becomes `vAppNet-X`.
///
/// The hyphen-separated tokens are de-duplicated keeping first occurrences,
/// and the result is used only if the name is that result repeated. Names
/// that merely share a token, like `vAppNet-A-vAppNet-B`, are left alone.
pub fn dedupe_network_name(name: &str) -> String {
    let tokens: Vec<&str> = name.split('-').collect();
    let mut seen = HashSet::new();
    let unique: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|token| seen.insert(*token))
        .collect();

    let repeated = tokens.len() % unique.len() == 0
        && tokens
            .chunks(unique.len())
            .all(|chunk| chunk == unique.as_slice());
    if repeated {
        unique.join("-")
    } else {
        name.to_string()
    }
}

fn disable_customization(root: &mut Element) -> PassReport {
    let mut report = PassReport::new(ScrubPass::Customization);
    root.visit_mut(names::CUSTOMIZE_ON_INSTANTIATE, &mut |flag| {
        let current = flag.text();
        if current.trim() != "false" {
            flag.set_text("false");
            report.changed(format!("CustomizeOnInstantiate {} -> false", current.trim()));
        }
    });
    report
}

fn reset_passwords(root: &mut Element) -> PassReport {
    let mut report = PassReport::new(ScrubPass::Passwords);
    for system in virtual_systems_mut(root) {
        let vm = vm_name(system).to_string();
        for section in system.find_all_mut(names::PRODUCT_SECTION) {
            for property in section.find_all_mut(names::PROPERTY) {
                if property.attr(names::OVF_PASSWORD) != Some("true") {
                    continue;
                }
                let needs_reset = matches!(
                    property.attr(names::OVF_VALUE),
                    Some(value) if !value.is_empty() && value != PLACEHOLDER_PASSWORD
                );
                if needs_reset {
                    property.replace_attr(names::OVF_VALUE, PLACEHOLDER_PASSWORD);
                    let key = property.attr(names::OVF_KEY).unwrap_or("<no key>");
                    report.changed(format!("{vm}: reset password property {key}"));
                }
            }
        }
    }
    report
}

fn force_guest_info_transport(root: &mut Element, namespaces: &Namespaces) -> PassReport {
    let mut report = PassReport::new(ScrubPass::GuestInfo);
    for system in virtual_systems_mut(root) {
        let vm = vm_name(system).to_string();
        for hardware in system.find_all_mut(names::VIRTUAL_HARDWARE_SECTION) {
            if hardware.attr(names::OVF_TRANSPORT) == Some(GUEST_INFO_TRANSPORT) {
                continue;
            }
            match hardware.set_attr(namespaces, names::OVF_TRANSPORT, GUEST_INFO_TRANSPORT) {
                Ok(previous) => report.changed(format!(
                    "{vm}: OVF transport {} -> {GUEST_INFO_TRANSPORT}",
                    previous.as_deref().unwrap_or("<unset>")
                )),
                Err(e) => report.failed(format!("{vm}: cannot set OVF transport: {e}")),
            }
        }
    }
    report
}

fn isolate_networks(root: &mut Element) -> (PassReport, BTreeMap<String, String>) {
    let mut report = PassReport::new(ScrubPass::NetworkIsolation);
    let mut renamed = BTreeMap::new();

    root.visit_mut(names::NETWORK_CONFIG_SECTION, &mut |section| {
        for config in section.find_all_mut(names::NETWORK_CONFIG) {
            let Some(name) = config.attr(names::NETWORK_NAME).map(str::to_string) else {
                continue;
            };
            if name == NO_NETWORK {
                continue;
            }

            for configuration in config.find_all_mut(names::CONFIGURATION) {
                for fence_mode in configuration.find_all_mut(names::FENCE_MODE) {
                    let current = fence_mode.text();
                    if current.trim() != ISOLATED_FENCE_MODE {
                        fence_mode.set_text(ISOLATED_FENCE_MODE);
                        report.changed(format!(
                            "{name}: fence mode {} -> {ISOLATED_FENCE_MODE}",
                            current.trim()
                        ));
                    }
                }
                if configuration.remove_all(names::PARENT_NETWORK) > 0 {
                    report.changed(format!("{name}: removed parent network attachment"));
                }
                let mut nat_removed = 0;
                for features in configuration.find_all_mut(names::FEATURES) {
                    nat_removed += features.remove_all(names::NAT_SERVICE);
                }
                if nat_removed > 0 {
                    report.changed(format!("{name}: removed configured NAT rules"));
                }
            }

            let deduped = dedupe_network_name(&name);
            if deduped != name {
                config.replace_attr(names::NETWORK_NAME, &deduped);
                report.changed(format!("network name {name} -> {deduped}"));
                renamed.insert(name, deduped);
            }
        }
    });

    if !renamed.is_empty() {
        root.visit_mut(names::NETWORK_SECTION, &mut |section| {
            for network in section.find_all_mut(names::NETWORK) {
                let Some(new_name) = network
                    .attr(names::OVF_NAME)
                    .and_then(|old| renamed.get(old))
                    .cloned()
                else {
                    continue;
                };
                if let Some(old_name) = network.replace_attr(names::OVF_NAME, &new_name) {
                    report.changed(format!("NetworkSection: {old_name} -> {new_name}"));
                }
            }
        });
    }

    (report, renamed)
}

fn update_network_connections(
    root: &mut Element,
    renamed: &BTreeMap<String, String>,
) -> PassReport {
    let mut report = PassReport::new(ScrubPass::NetworkConnections);
    for system in virtual_systems_mut(root) {
        let vm = vm_name(system).to_string();
        for hardware in system.find_all_mut(names::VIRTUAL_HARDWARE_SECTION) {
            for item in hardware.find_all_mut(names::ITEM) {
                let mut attached_to = None;
                for connection in item.find_all_mut(names::RASD_CONNECTION) {
                    if connection.attr(names::IP_ADDRESSING_MODE) == Some("POOL") {
                        connection.replace_attr(names::IP_ADDRESSING_MODE, "DHCP");
                        report.changed(format!("{vm}: IP addressing mode POOL -> DHCP"));
                    }
                    let network = connection.text();
                    if let Some(new_name) = renamed.get(network.trim()) {
                        connection.set_text(new_name.clone());
                        report.changed(format!("{vm}: connection {} -> {new_name}", network.trim()));
                    }
                    attached_to = Some(network.trim().to_string());
                }

                let Some(network) = attached_to else {
                    continue;
                };
                for description in item.find_all_mut(names::RASD_DESCRIPTION) {
                    let current = description.text();
                    let mut updated = current.clone();
                    if network != NO_NETWORK {
                        if let Some(new_name) = renamed.get(&network) {
                            updated = updated.replace(&network, new_name);
                        }
                    }
                    updated = updated.replace('"', "");
                    if updated != current {
                        description.set_text(updated.clone());
                        report.changed(format!("{vm}: adapter description -> {updated}"));
                    }
                }
            }
        }
    }
    report
}

fn rename_connection_networks(
    root: &mut Element,
    renamed: &BTreeMap<String, String>,
) -> PassReport {
    let mut report = PassReport::new(ScrubPass::ConnectionSections);
    for system in virtual_systems_mut(root) {
        let vm = vm_name(system).to_string();
        for section in system.find_all_mut(names::NETWORK_CONNECTION_SECTION) {
            for connection in section.find_all_mut(names::NETWORK_CONNECTION) {
                let Some(new_name) = connection
                    .attr(names::NETWORK_ATTR)
                    .filter(|n| *n != NO_NETWORK)
                    .and_then(|n| renamed.get(n))
                    .cloned()
                else {
                    continue;
                };
                connection.replace_attr(names::NETWORK_ATTR, &new_name);
                report.changed(format!("{vm}: network connection -> {new_name}"));
            }
        }
    }
    report
}

fn disable_write_through(root: &mut Element, namespaces: &Namespaces) -> PassReport {
    let mut report = PassReport::new(ScrubPass::DiskWriteThrough);
    for system in virtual_systems_mut(root) {
        let vm = vm_name(system).to_string();
        for hardware in system.find_all_mut(names::VIRTUAL_HARDWARE_SECTION) {
            for item in hardware.find_all_mut(names::ITEM) {
                if !is_hard_disk(item) {
                    continue;
                }
                let label = item
                    .find(names::RASD_ELEMENT_NAME)
                    .map(|e| e.text())
                    .unwrap_or_else(|| "hard disk".to_string());

                if let Some(config) = item
                    .find_all_mut(names::VMW_CONFIG)
                    .find(|c| c.attr(names::VMW_KEY) == Some(WRITE_THROUGH_KEY))
                {
                    if config.attr(names::VMW_VALUE) != Some("false") {
                        match config.set_attr(namespaces, names::VMW_VALUE, "false") {
                            Ok(_) => report.changed(format!("{vm}: {label} writeThrough -> false")),
                            Err(e) => report.failed(format!("{vm}: {label}: {e}")),
                        }
                    }
                    continue;
                }

                match write_through_config(namespaces) {
                    Ok(config) => {
                        item.push(config);
                        report.changed(format!("{vm}: {label} writeThrough set to false"));
                    }
                    Err(e) => report.failed(format!("{vm}: {label}: {e}")),
                }
            }
        }
    }
    report
}

fn write_through_config(namespaces: &Namespaces) -> Result<Element> {
    let mut config = namespaces.element(names::VMW_CONFIG)?;
    config.set_attr(namespaces, names::OVF_REQUIRED, "false")?;
    config.set_attr(namespaces, names::VMW_KEY, WRITE_THROUGH_KEY)?;
    config.set_attr(namespaces, names::VMW_VALUE, "false")?;
    Ok(config)
}

fn correct_disk_capacity(root: &mut Element) -> PassReport {
    let mut report = PassReport::new(ScrubPass::DiskCapacity);

    let mut file_sizes = HashMap::new();
    for section in root.find_all(names::REFERENCES) {
        for file in section.find_all(names::FILE) {
            match FileReference::from_element(file) {
                Ok(FileReference {
                    id,
                    size: Some(size),
                    ..
                }) if id.contains("file") => {
                    file_sizes.insert(id, size);
                }
                Ok(_) => {}
                Err(e) => report.failed(e.to_string()),
            }
        }
    }

    for section in root.find_all_mut(names::DISK_SECTION) {
        for disk in section.find_all_mut(names::DISK) {
            let descriptor = match DiskDescriptor::from_element(disk) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    report.failed(e.to_string());
                    continue;
                }
            };
            let id = descriptor.disk_id.as_str();

            let Some(populated) = descriptor.populated_size else {
                report.skipped(format!("{id}: no populatedSize, capacity not checked"));
                continue;
            };
            let Some(unit) = descriptor
                .allocation_units
                .as_deref()
                .and_then(CapacityUnit::parse)
            else {
                report.failed(format!(
                    "{id}: unable to get disk size from units {:?}",
                    descriptor.allocation_units
                ));
                continue;
            };

            let new_capacity = match unit {
                CapacityUnit::Mebibytes => {
                    let file_size = descriptor
                        .file_ref
                        .as_ref()
                        .and_then(|file_ref| file_sizes.get(file_ref));
                    let Some(&file_size) = file_size else {
                        report.skipped(format!("{id}: no file size to compare against"));
                        continue;
                    };
                    grow_to_fit(descriptor.capacity, file_size)
                }
                CapacityUnit::Gibibytes => {
                    let check = EztCheck::new(descriptor.capacity, populated);
                    debug!(
                        disk = id,
                        populated,
                        "populated data is {:.2}% of {} GB",
                        check.percent_full(),
                        descriptor.capacity
                    );
                    if check.minimally_used() {
                        warn!(disk = id, "minimally used disk");
                    }
                    check.new_capacity()
                }
                CapacityUnit::Tebibytes => {
                    // TODO: decide whether TB disks need the EZT workaround too.
                    debug!(
                        disk = id,
                        bytes = descriptor.capacity.saturating_mul(unit.bytes()),
                        "no capacity correction for TB disks"
                    );
                    None
                }
            };

            if let Some(new_capacity) = new_capacity {
                disk.replace_attr(names::OVF_CAPACITY, &new_capacity.to_string());
                report.changed(format!(
                    "{id}: capacity {} -> {new_capacity} {unit}",
                    descriptor.capacity
                ));
            }
        }
    }

    report
}
