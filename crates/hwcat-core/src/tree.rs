//! The device tree. Nodes live in an arena indexed by `NodeId`; the
//! hierarchical format links nodes through explicit parent references,
//! the flat format derives the hierarchy from device path prefixes.
//!
//! The tree also answers the ancestry-dependent classification
//! questions: which host bus a node really connects to, whether a node
//! is a physical device or an artifact of the kernel's driver
//! layering, and whether its identity is trustworthy enough for the
//! catalog.

use std::collections::HashMap;

use crate::consistency::ROOT_UDI;
use crate::device::{
    Device, HalDevice, HwBus, UdevDevice, PCI_CLASS_BRIDGE,
    PCI_CLASS_SERIALBUS_CONTROLLER, PCI_CLASS_STORAGE, PCI_SUBCLASS_BRIDGE_CARDBUS,
    PCI_SUBCLASS_SERIALBUS_USB, UDEV_ROOT_PATH,
};
use crate::diagnostics::Diagnostics;
use crate::error::SubmissionError;
use crate::parser::{HalData, Hardware, SysfsAttributes, UdevDeviceData};

pub type NodeId = usize;

/// Bus values naming an aspect of another device rather than a device
/// of its own. A node with one of these (or with no bus at all) is
/// skipped and its real children are promoted.
const AUX_BUSES: &[&str] = &[
    "ac97", "bttv-sub", "disk", "drm", "drm_minor", "dvb", "enclosure", "gameport",
    "graphics", "hid", "host", "hwmon", "ieee80211", "link", "lirc", "mISDN",
    "memstick", "memstick_host", "net", "partition", "pci_express", "pcmcia_socket",
    "pvrusb2", "sas_device", "sas_end_device", "sas_host", "sas_phy", "sas_port",
    "scsi_disk", "scsi_generic", "scsi_host", "scsi_tape", "scsi_target", "sound",
    "spi_host", "spi_transport", "ssb", "tifm", "tifm_adapter", "tty", "usb",
    "usb-serial", "usb_endpoint", "usb_host", "usb_interface", "usbmon",
    "video4linux", "wlan",
];

/// Bus values for which no reliable (bus, vendor id, product id)
/// identity can be derived. Real devices on these buses stay out of
/// the catalog.
const UNRELIABLE_BUSES: &[&str] = &[
    "asus_oled", "atm", "backlight", "bdi", "bluetooth", "cardman_4040", "dahdi",
    "dmi", "heci", "hidraw", "hwmon", "i2c-adapter", "ieee1394", "ieee1394_protocol",
    "input", "leds", "mem", "misc", "mmc", "mmc_host", "msr", "pci_bus", "pcmcia",
    "pktcdvd", "platform", "pnp", "power_supply", "ppdev", "ppp", "printer",
    "rfkill", "thermal", "ttm", "vc", "video_output", "vtconsole",
];

struct Node {
    device: Device,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

pub struct DeviceTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DeviceTree {
    /// Build the tree from whichever hardware representation the
    /// submission carries. The hierarchical one wins if both exist.
    pub fn build(hardware: &Hardware) -> Result<Self, SubmissionError> {
        if let Some(hal) = &hardware.hal {
            Self::from_hal(hal)
        } else if let Some(udev) = &hardware.udev {
            Self::from_udev(udev, &hardware.sysfs, hardware.dmi.as_ref())
        } else {
            Err(SubmissionError::Internal(
                "hardware data without a device representation".into(),
            ))
        }
    }

    fn from_hal(hal: &HalData) -> Result<Self, SubmissionError> {
        let mut nodes: Vec<Node> = hal
            .devices
            .iter()
            .map(|data| Node {
                device: Device::Hal(HalDevice::new(data.clone())),
                parent: None,
                children: Vec::new(),
            })
            .collect();

        let mut by_udi = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            if let Device::Hal(device) = &node.device {
                by_udi.insert(device.udi.clone(), index);
            }
        }

        for index in 0..nodes.len() {
            let parent_udi = match &nodes[index].device {
                Device::Hal(device) => device.parent_udi().map(str::to_string),
                Device::Udev(_) => None,
            };
            if let Some(parent_udi) = parent_udi {
                // Consistency checking has already rejected dangling
                // parent references.
                let parent = *by_udi.get(parent_udi.as_str()).ok_or_else(|| {
                    SubmissionError::Internal(format!("unknown parent {parent_udi}"))
                })?;
                nodes[index].parent = Some(parent);
                nodes[parent].children.push(index);
            }
        }

        let root = *by_udi.get(ROOT_UDI).ok_or_else(|| {
            SubmissionError::Inconsistent("no root device defined".into())
        })?;
        Ok(Self { nodes, root })
    }

    /// Path-prefix linking: device A is an ancestor of device B iff
    /// B's path starts with A's path, and the parent is the ancestor
    /// with the longest path. The root's path does not prefix the PCI
    /// paths, so it is keyed as "/devices" during linking.
    fn from_udev(
        udev: &[UdevDeviceData],
        sysfs: &SysfsAttributes,
        dmi: Option<&HashMap<String, String>>,
    ) -> Result<Self, SubmissionError> {
        let mut nodes = Vec::with_capacity(udev.len());
        let mut root = None;
        for data in udev {
            let is_root = data.path == UDEV_ROOT_PATH;
            if is_root {
                root = Some(nodes.len());
            }
            nodes.push(Node {
                device: Device::Udev(UdevDevice {
                    sysfs: sysfs.for_path(&data.path).cloned(),
                    dmi: if is_root { dmi.cloned() } else { None },
                    data: data.clone(),
                }),
                parent: None,
                children: Vec::new(),
            });
        }
        let root = root.ok_or_else(|| {
            SubmissionError::Inconsistent("no root device defined".into())
        })?;

        let mut keys: Vec<(&str, NodeId)> = udev
            .iter()
            .enumerate()
            .map(|(index, data)| {
                if index == root {
                    ("/devices", index)
                } else {
                    (data.path.as_str(), index)
                }
            })
            .collect();
        keys.sort_by_key(|(path, _)| std::cmp::Reverse(path.len()));

        for (position, (path, index)) in keys.iter().enumerate() {
            if position == keys.len() - 1 {
                break;
            }
            if !path.starts_with("/devices") {
                return Err(SubmissionError::Inconsistent(format!(
                    "invalid device path name: {path:?}"
                )));
            }
            for (ancestor_path, ancestor) in &keys[position + 1..] {
                if path.starts_with(ancestor_path) {
                    nodes[*index].parent = Some(*ancestor);
                    nodes[*ancestor].children.push(*index);
                    break;
                }
            }
        }

        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn device(&self, node: NodeId) -> &Device {
        &self.nodes[node].device
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    /// The SCSI host controller of a (we hope real) SCSI device: the
    /// grandparent in the hierarchical format, the great-grandparent
    /// in the flat one, where an extra target node sits in between.
    fn scsi_controller(&self, node: NodeId, diag: &mut Diagnostics) -> Option<NodeId> {
        let device = self.device(node);
        match device {
            Device::Hal(_) => {
                if device.raw_bus() != Some("scsi") {
                    return None;
                }
                let parent = match self.parent(node) {
                    Some(parent) => parent,
                    None => {
                        diag.warn(&format!(
                            "found SCSI device without a parent: {}",
                            device.device_id()
                        ));
                        return None;
                    }
                };
                match self.parent(parent) {
                    Some(grandparent) => Some(grandparent),
                    None => {
                        diag.warn(&format!(
                            "found SCSI device without a grandparent: {}",
                            device.device_id()
                        ));
                        None
                    }
                }
            }
            Device::Udev(_) => {
                if device.raw_bus() != Some("scsi_device") {
                    return None;
                }
                let controller = self
                    .parent(node)
                    .and_then(|p| self.parent(p))
                    .and_then(|p| self.parent(p));
                if controller.is_none() {
                    diag.warn(&format!(
                        "found a SCSI device without a sufficient number of \
                         ancestors: {}",
                        device.device_id()
                    ));
                }
                controller
            }
        }
    }

    /// The kernel routes IDE, SATA, USB and real SCSI storage through
    /// its SCSI layer; the controller's PCI storage subclass reveals
    /// the actual bus. USB storage stays a black box.
    fn translate_scsi_bus(&self, node: NodeId, diag: &mut Diagnostics) -> Option<HwBus> {
        let controller = self.scsi_controller(node, diag)?;
        let controller_device = self.device(controller);
        match controller_device.raw_bus() {
            Some("pci") => {
                if controller_device.pci_class() != Some(PCI_CLASS_STORAGE) {
                    diag.warn(&format!(
                        "a (possibly fake) SCSI device {} is connected to PCI \
                         device {} that has the PCI device class {:?}; \
                         expected class 1 (storage)",
                        self.device(node).device_id(),
                        controller_device.device_id(),
                        controller_device.pci_class(),
                    ));
                    return None;
                }
                pci_storage_bus(controller_device.pci_subclass()?)
            }
            Some("usb") | Some("usb_interface") => None,
            _ => Some(HwBus::Scsi),
        }
    }

    /// A PC Card looks like a PCI device; it is recognized by its
    /// parent being a Cardbus bridge.
    fn translate_pci_bus(&self, node: NodeId) -> HwBus {
        let parent = self.parent(node).map(|parent| self.device(parent));
        let is_cardbus_bridge = parent
            .map(|device| {
                device.pci_class() == Some(PCI_CLASS_BRIDGE)
                    && device.pci_subclass() == Some(PCI_SUBCLASS_BRIDGE_CARDBUS)
            })
            .unwrap_or(false);
        if is_cardbus_bridge {
            HwBus::Pccard
        } else {
            HwBus::Pci
        }
    }

    /// The host-side bus of the node, or None when it cannot be
    /// determined.
    pub fn real_bus(&self, node: NodeId, diag: &mut Diagnostics) -> Option<HwBus> {
        let device = self.device(node);
        let raw_bus = device.raw_bus();
        if let Some(bus) = raw_bus.and_then(subsystem_bus) {
            return Some(bus);
        }
        match raw_bus {
            Some("scsi") | Some("scsi_device") => self.translate_scsi_bus(node, diag),
            Some("pci") => Some(self.translate_pci_bus(node)),
            _ => {
                if device.is_root_device() {
                    Some(HwBus::System)
                } else {
                    diag.warn(&format!(
                        "unknown bus {raw_bus:?} for device {}",
                        device.device_id()
                    ));
                    None
                }
            }
        }
    }

    /// Whether this node corresponds to a physical device rather than
    /// one aspect of a device represented by another node.
    pub fn is_real_device(&self, node: NodeId, diag: &mut Diagnostics) -> bool {
        let device = self.device(node);
        if device.is_root_device() {
            return true;
        }
        let bus = match device.raw_bus() {
            Some(bus) => bus,
            None => return false,
        };
        if AUX_BUSES.contains(&bus) {
            return false;
        }
        match bus {
            "usb_device" => {
                if device.usb_vendor_id() == Some(0) && device.usb_product_id() == Some(0)
                {
                    // A vendor/product id pair 0:0 marks the output
                    // aspect of a USB host controller; anything else
                    // with that pair is bogus.
                    let parent_is_usb_controller = self
                        .parent(node)
                        .map(|parent| {
                            let parent = self.device(parent);
                            parent.raw_bus() == Some("pci")
                                && parent.pci_class()
                                    == Some(PCI_CLASS_SERIALBUS_CONTROLLER)
                                && parent.pci_subclass()
                                    == Some(PCI_SUBCLASS_SERIALBUS_USB)
                        })
                        .unwrap_or(false);
                    if !parent_is_usb_controller {
                        diag.warn(&format!(
                            "USB device found with vendor ID==0, product ID==0, \
                             where the parent device does not look like a USB \
                             host controller: {}",
                            device.device_id()
                        ));
                    }
                    return false;
                }
                true
            }
            "scsi" | "scsi_device" => self.real_bus(node, diag).is_some(),
            _ => true,
        }
    }

    /// The real devices below a node: real direct children, plus the
    /// promoted real descendants of non-real children. IEEE1394 nodes
    /// carry no usable product identity and are dropped outright.
    pub fn real_children(&self, node: NodeId, diag: &mut Diagnostics) -> Vec<NodeId> {
        let mut result = Vec::new();
        for &child in self.children(node) {
            if self.is_real_device(child, diag) {
                if self.device(child).raw_bus() != Some("ieee1394") {
                    result.push(child);
                }
            } else {
                result.extend(self.real_children(child, diag));
            }
        }
        result
    }

    /// Whether the node's identity (bus, vendor id, product id,
    /// product name) is complete enough for a catalog record.
    pub fn has_reliable_data(&self, node: NodeId, diag: &mut Diagnostics) -> bool {
        let device = self.device(node);
        let bus = device.raw_bus();
        if let Some(bus) = bus {
            if (bus == "unknown" || bus == "acpi") && !device.is_root_device() {
                return false;
            }
            if UNRELIABLE_BUSES.contains(&bus) {
                return false;
            }
        }
        let real_bus = self.real_bus(node, diag);
        if real_bus.is_none()
            || device.vendor_id().is_none()
            || device.product_id().is_none()
            || device.product().is_none()
        {
            // IDE devices routinely omit vendor and product data;
            // warning about each of them would drown the log.
            if real_bus != Some(HwBus::Ide) {
                diag.warn(&format!(
                    "a device that is supposed to be real does not provide \
                     bus, vendor ID, product ID or product name: {:?} {:?} \
                     {:?} {:?} {}",
                    real_bus,
                    device.vendor_id(),
                    device.product_id(),
                    device.product(),
                    device.device_id(),
                ));
            }
            return false;
        }
        true
    }
}

fn subsystem_bus(raw_bus: &str) -> Option<HwBus> {
    match raw_bus {
        "pcmcia" => Some(HwBus::Pcmcia),
        "usb_device" => Some(HwBus::Usb),
        "ide" => Some(HwBus::Ide),
        "serio" => Some(HwBus::Serial),
        _ => None,
    }
}

/// PCI storage subclass to host bus. Subclass 4 (RAID) is absent: a
/// RAID controller does not reveal the bus of its disks.
fn pci_storage_bus(subclass: i64) -> Option<HwBus> {
    match subclass {
        0 => Some(HwBus::Scsi),
        1 => Some(HwBus::Ide),
        2 => Some(HwBus::Floppy),
        3 => Some(HwBus::Ipi),
        5 => Some(HwBus::Ata),
        6 => Some(HwBus::Sata),
        7 => Some(HwBus::Sas),
        _ => None,
    }
}
