//! Qualified names of the OVF, CIM and VMware vocabulary touched by ovfkit.

use crate::xml::QName;

use super::{OVF_NS, RASD_NS, VCLOUD_NS, VMW_NS};

// Envelope sections
pub const REFERENCES: QName = QName::new(OVF_NS, "References");
pub const FILE: QName = QName::new(OVF_NS, "File");
pub const DISK_SECTION: QName = QName::new(OVF_NS, "DiskSection");
pub const DISK: QName = QName::new(OVF_NS, "Disk");
pub const NETWORK_SECTION: QName = QName::new(OVF_NS, "NetworkSection");
pub const NETWORK: QName = QName::new(OVF_NS, "Network");
pub const VIRTUAL_SYSTEM_COLLECTION: QName = QName::new(OVF_NS, "VirtualSystemCollection");
pub const VIRTUAL_SYSTEM: QName = QName::new(OVF_NS, "VirtualSystem");
pub const VIRTUAL_HARDWARE_SECTION: QName = QName::new(OVF_NS, "VirtualHardwareSection");
pub const ITEM: QName = QName::new(OVF_NS, "Item");
pub const PRODUCT_SECTION: QName = QName::new(OVF_NS, "ProductSection");
pub const PROPERTY: QName = QName::new(OVF_NS, "Property");

// Envelope attributes
pub const OVF_ID: QName = QName::new(OVF_NS, "id");
pub const OVF_HREF: QName = QName::new(OVF_NS, "href");
pub const OVF_SIZE: QName = QName::new(OVF_NS, "size");
pub const OVF_DISK_ID: QName = QName::new(OVF_NS, "diskId");
pub const OVF_FILE_REF: QName = QName::new(OVF_NS, "fileRef");
pub const OVF_CAPACITY: QName = QName::new(OVF_NS, "capacity");
pub const OVF_CAPACITY_UNITS: QName = QName::new(OVF_NS, "capacityAllocationUnits");
pub const OVF_POPULATED_SIZE: QName = QName::new(OVF_NS, "populatedSize");
pub const OVF_PASSWORD: QName = QName::new(OVF_NS, "password");
pub const OVF_KEY: QName = QName::new(OVF_NS, "key");
pub const OVF_VALUE: QName = QName::new(OVF_NS, "value");
pub const OVF_NAME: QName = QName::new(OVF_NS, "name");
pub const OVF_TRANSPORT: QName = QName::new(OVF_NS, "transport");
pub const OVF_REQUIRED: QName = QName::new(OVF_NS, "required");

// Resource allocation settings
pub const RASD_CONNECTION: QName = QName::new(RASD_NS, "Connection");
pub const RASD_DESCRIPTION: QName = QName::new(RASD_NS, "Description");
pub const RASD_ELEMENT_NAME: QName = QName::new(RASD_NS, "ElementName");
pub const RASD_HOST_RESOURCE: QName = QName::new(RASD_NS, "HostResource");

// vCloud Director extensions
pub const CUSTOMIZE_ON_INSTANTIATE: QName = QName::new(VCLOUD_NS, "CustomizeOnInstantiate");
pub const NETWORK_CONFIG_SECTION: QName = QName::new(VCLOUD_NS, "NetworkConfigSection");
pub const NETWORK_CONFIG: QName = QName::new(VCLOUD_NS, "NetworkConfig");
pub const CONFIGURATION: QName = QName::new(VCLOUD_NS, "Configuration");
pub const FENCE_MODE: QName = QName::new(VCLOUD_NS, "FenceMode");
pub const PARENT_NETWORK: QName = QName::new(VCLOUD_NS, "ParentNetwork");
pub const FEATURES: QName = QName::new(VCLOUD_NS, "Features");
pub const NAT_SERVICE: QName = QName::new(VCLOUD_NS, "NatService");
pub const NETWORK_CONNECTION_SECTION: QName = QName::new(VCLOUD_NS, "NetworkConnectionSection");
pub const NETWORK_CONNECTION: QName = QName::new(VCLOUD_NS, "NetworkConnection");
pub const IP_ADDRESSING_MODE: QName = QName::new(VCLOUD_NS, "ipAddressingMode");
pub const NETWORK_NAME: QName = QName::unqualified("networkName");
pub const NETWORK_ATTR: QName = QName::unqualified("network");

// VMware hardware extensions
pub const VMW_CONFIG: QName = QName::new(VMW_NS, "Config");
pub const VMW_EXTRA_CONFIG: QName = QName::new(VMW_NS, "ExtraConfig");
pub const VMW_KEY: QName = QName::new(VMW_NS, "key");
pub const VMW_VALUE: QName = QName::new(VMW_NS, "value");
