//! Per-device classification data. A device node wraps either a
//! hierarchical-format entry or a flat-export entry and answers the
//! questions that do not need ancestry; bus translation that walks the
//! tree lives in [`crate::tree`].

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::consistency::ROOT_UDI;
use crate::parser::{HalDeviceData, UdevDeviceData};
use crate::value::PropertyValue;

pub const UDEV_ROOT_PATH: &str = "/devices/LNXSYSTM:00";

pub const PCI_CLASS_STORAGE: i64 = 1;
pub const PCI_CLASS_BRIDGE: i64 = 6;
pub const PCI_SUBCLASS_BRIDGE_CARDBUS: i64 = 7;
pub const PCI_CLASS_SERIALBUS_CONTROLLER: i64 = 12;
pub const PCI_SUBCLASS_SERIALBUS_USB: i64 = 3;

const DMI_SYS_VENDOR: &str = "/sys/class/dmi/id/sys_vendor";
const DMI_PRODUCT_NAME: &str = "/sys/class/dmi/id/product_name";

/// The host-side bus a device connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HwBus {
    System,
    Pci,
    Usb,
    Ide,
    Serial,
    Scsi,
    Floppy,
    Ipi,
    Ata,
    Sata,
    Sas,
    Pccard,
    Pcmcia,
}

/// A vendor or product identifier. Buses with numeric id spaces carry
/// integers, SCSI inquiry strings and system names stay text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IdValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Int(value) => write!(f, "{value}"),
            IdValue::Text(value) => write!(f, "{value}"),
        }
    }
}

/// One device node of a submission, in either source format.
#[derive(Debug, Clone, Serialize)]
pub enum Device {
    Hal(HalDevice),
    Udev(UdevDevice),
}

#[derive(Debug, Clone, Serialize)]
pub struct HalDevice {
    pub id: i64,
    pub udi: String,
    pub properties: HashMap<String, PropertyValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UdevDevice {
    pub data: UdevDeviceData,
    /// The sysfs attributes recorded for this device path, if any.
    pub sysfs: Option<HashMap<String, String>>,
    /// DMI table, attached to the root node only.
    pub dmi: Option<HashMap<String, String>>,
}

impl HalDevice {
    pub fn new(data: HalDeviceData) -> Self {
        Self {
            id: data.id,
            udi: data.udi,
            properties: data.properties,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    fn property_text(&self, name: &str) -> Option<String> {
        self.property(name).and_then(scalar_text)
    }

    fn property_int(&self, name: &str) -> Option<i64> {
        self.property(name).and_then(PropertyValue::as_int)
    }

    pub fn parent_udi(&self) -> Option<&str> {
        self.property("info.parent").and_then(PropertyValue::as_str)
    }

    /// Older producers stored the bus in `info.bus`, newer ones in
    /// `info.subsystem`. `info.bus` is still the more specific value
    /// for USB root nodes, so it is tried first.
    pub fn raw_bus(&self) -> Option<&str> {
        self.property("info.bus")
            .or_else(|| self.property("info.subsystem"))
            .and_then(PropertyValue::as_str)
    }

    fn vendor_or_product(&self, kind: &str) -> Option<String> {
        if self.udi == ROOT_UDI {
            // The root node carries its name in a dedicated property
            // pair and a useless bus value.
            return self.property_text(&format!("system.hardware.{kind}"));
        }
        match self.raw_bus() {
            Some("scsi") => Some(
                scsi_vendor_and_model(
                    self.property_text("scsi.vendor")?,
                    self.property_text("scsi.model")?,
                )
                .pick(kind),
            ),
            bus => self.property_text(&format!("info.{kind}")).or_else(|| {
                bus.and_then(|bus| self.property_text(&format!("{bus}.{kind}")))
            }),
        }
    }

    fn vendor_or_product_id(&self, kind: &str) -> Option<IdValue> {
        if self.udi == ROOT_UDI {
            // No id space exists for whole systems; the name doubles
            // as the id.
            return self.vendor_or_product(kind).map(IdValue::Text);
        }
        match self.raw_bus() {
            None => None,
            // SCSI inquiry strings are both name and id.
            Some("scsi") => self.vendor_or_product(kind).map(IdValue::Text),
            Some(bus) => match self.property(&format!("{bus}.{kind}_id")) {
                Some(PropertyValue::Int(value)) => Some(IdValue::Int(*value)),
                Some(PropertyValue::Str(value)) => Some(IdValue::Text(value.clone())),
                _ => None,
            },
        }
    }
}

impl UdevDevice {
    pub fn path(&self) -> &str {
        &self.data.path
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.data.properties.get(name).map(String::as_str)
    }

    pub fn is_pci(&self) -> bool {
        self.property("SUBSYSTEM") == Some("pci")
    }

    /// (class, subclass, version) parsed from the 24 bit PCI_CLASS
    /// value; consistency checking guarantees the format.
    pub fn pci_class_info(&self) -> Option<(i64, i64, i64)> {
        if !self.is_pci() {
            return None;
        }
        let class_info = i64::from_str_radix(self.property("PCI_CLASS")?, 16).ok()?;
        Some((class_info >> 16, (class_info >> 8) & 0xff, class_info & 0xff))
    }

    fn pci_ids(&self) -> Option<(i64, i64)> {
        if !self.is_pci() {
            return None;
        }
        let (vendor, product) = self.property("PCI_ID")?.split_once(':')?;
        Some((
            i64::from_str_radix(vendor, 16).ok()?,
            i64::from_str_radix(product, 16).ok()?,
        ))
    }

    fn usb_ids(&self) -> Option<(i64, i64)> {
        if self.property("SUBSYSTEM") != Some("usb") {
            return None;
        }
        let mut parts = self.property("PRODUCT")?.split('/');
        let vendor = i64::from_str_radix(parts.next()?, 16).ok()?;
        let product = i64::from_str_radix(parts.next()?, 16).ok()?;
        Some((vendor, product))
    }

    /// SCSI nodes are only trusted when their sysfs record survived;
    /// submissions from producers that never exported sysfs data treat
    /// every SCSI node as an artifact.
    pub fn is_scsi_device(&self) -> bool {
        self.sysfs.is_some()
            && self.property("SUBSYSTEM") == Some("scsi")
            && self.property("DEVTYPE") == Some("scsi_device")
    }

    fn scsi_vendor(&self) -> Option<&str> {
        if self.is_scsi_device() {
            self.sysfs.as_ref()?.get("vendor").map(String::as_str)
        } else {
            None
        }
    }

    fn scsi_model(&self) -> Option<&str> {
        if self.is_scsi_device() {
            self.sysfs.as_ref()?.get("model").map(String::as_str)
        } else {
            None
        }
    }

    pub fn is_root_device(&self) -> bool {
        self.data.path == UDEV_ROOT_PATH
    }

    /// DEVTYPE is more specific than SUBSYSTEM and wins when present.
    /// The root reports the meaningless value "acpi" and maps to None.
    /// Sub-nodes with SUBSYSTEM "scsi_device" would be confused with
    /// the main node of a SCSI device (SUBSYSTEM "scsi", DEVTYPE
    /// "scsi_device"), so they map to None too.
    pub fn raw_bus(&self) -> Option<&str> {
        if self.is_root_device() {
            return None;
        }
        if let Some(devtype) = self.property("DEVTYPE") {
            return Some(devtype);
        }
        match self.property("SUBSYSTEM") {
            Some("scsi_device") => None,
            subsystem => subsystem,
        }
    }

    fn dmi_value(&self, key: &str) -> Option<String> {
        self.dmi.as_ref()?.get(key).cloned()
    }

    fn vendor_or_product(&self, kind: &str) -> Option<String> {
        if self.is_root_device() {
            return self.dmi_value(match kind {
                "vendor" => DMI_SYS_VENDOR,
                _ => DMI_PRODUCT_NAME,
            });
        }
        match self.raw_bus() {
            Some("scsi_device") => Some(
                scsi_vendor_and_model(
                    self.scsi_vendor()?.to_string(),
                    self.scsi_model()?.to_string(),
                )
                .pick(kind),
            ),
            // The flat export has no human-readable names for PCI and
            // USB devices.
            Some("pci") | Some("usb_device") => Some("Unknown".to_string()),
            _ => None,
        }
    }

    fn vendor_or_product_id(&self, kind: &str) -> Option<IdValue> {
        if self.is_root_device() {
            return self.vendor_or_product(kind).map(IdValue::Text);
        }
        match self.raw_bus() {
            Some("scsi_device") => self.vendor_or_product(kind).map(IdValue::Text),
            Some("pci") => {
                let (vendor, product) = self.pci_ids()?;
                Some(IdValue::Int(if kind == "vendor" { vendor } else { product }))
            }
            Some("usb_device") => {
                let (vendor, product) = self.usb_ids()?;
                Some(IdValue::Int(if kind == "vendor" { vendor } else { product }))
            }
            _ => None,
        }
    }
}

impl Device {
    /// The submission-local integer id referenced by question targets.
    pub fn local_id(&self) -> i64 {
        match self {
            Device::Hal(device) => device.id,
            Device::Udev(device) => device.data.id,
        }
    }

    /// The key identifying this device in log messages.
    pub fn device_id(&self) -> &str {
        match self {
            Device::Hal(device) => &device.udi,
            Device::Udev(device) => device.path(),
        }
    }

    pub fn is_root_device(&self) -> bool {
        match self {
            Device::Hal(device) => device.udi == ROOT_UDI,
            Device::Udev(device) => device.is_root_device(),
        }
    }

    pub fn raw_bus(&self) -> Option<&str> {
        match self {
            Device::Hal(device) => device.raw_bus(),
            Device::Udev(device) => device.raw_bus(),
        }
    }

    pub fn pci_class(&self) -> Option<i64> {
        match self {
            Device::Hal(device) => device.property_int("pci.device_class"),
            Device::Udev(device) => device.pci_class_info().map(|info| info.0),
        }
    }

    pub fn pci_subclass(&self) -> Option<i64> {
        match self {
            Device::Hal(device) => device.property_int("pci.device_subclass"),
            Device::Udev(device) => device.pci_class_info().map(|info| info.1),
        }
    }

    pub fn usb_vendor_id(&self) -> Option<i64> {
        match self {
            Device::Hal(device) => device.property_int("usb_device.vendor_id"),
            Device::Udev(device) => device.usb_ids().map(|ids| ids.0),
        }
    }

    pub fn usb_product_id(&self) -> Option<i64> {
        match self {
            Device::Hal(device) => device.property_int("usb_device.product_id"),
            Device::Udev(device) => device.usb_ids().map(|ids| ids.1),
        }
    }

    pub fn driver_name(&self) -> Option<&str> {
        match self {
            Device::Hal(device) => device
                .property("info.linux.driver")
                .and_then(PropertyValue::as_str),
            Device::Udev(device) => device.property("DRIVER"),
        }
    }

    pub fn vendor(&self) -> Option<String> {
        match self {
            Device::Hal(device) => device.vendor_or_product("vendor"),
            Device::Udev(device) => device.vendor_or_product("vendor"),
        }
    }

    pub fn product(&self) -> Option<String> {
        match self {
            Device::Hal(device) => device.vendor_or_product("product"),
            Device::Udev(device) => device.vendor_or_product("product"),
        }
    }

    pub fn vendor_id(&self) -> Option<IdValue> {
        match self {
            Device::Hal(device) => device.vendor_or_product_id("vendor"),
            Device::Udev(device) => device.vendor_or_product_id("vendor"),
        }
    }

    pub fn product_id(&self) -> Option<IdValue> {
        match self {
            Device::Hal(device) => device.vendor_or_product_id("product"),
            Device::Udev(device) => device.vendor_or_product_id("product"),
        }
    }

    /// The vendor id in catalog representation: PCI and USB ids in
    /// hexadecimal, SCSI inquiry strings right-padded to 8 bytes.
    pub fn vendor_id_for_db(&self) -> Option<String> {
        self.vendor_id().map(|id| format_id_for_db(self.raw_bus(), &id, 8))
    }

    /// Like [`Device::vendor_id_for_db`], with the SCSI model name
    /// padded to 16 bytes.
    pub fn product_id_for_db(&self) -> Option<String> {
        self.product_id().map(|id| format_id_for_db(self.raw_bus(), &id, 16))
    }
}

fn format_id_for_db(raw_bus: Option<&str>, id: &IdValue, scsi_width: usize) -> String {
    match (raw_bus, id) {
        (Some("pci") | Some("usb_device"), IdValue::Int(value)) => {
            format!("0x{value:04x}")
        }
        (Some("scsi") | Some("scsi_device"), value) => {
            format!("{:<width$}", value.to_string(), width = scsi_width)
        }
        (_, value) => value.to_string(),
    }
}

struct ScsiName {
    vendor: String,
    model: String,
}

impl ScsiName {
    fn pick(self, kind: &str) -> String {
        if kind == "vendor" {
            self.vendor
        } else {
            self.model
        }
    }
}

/// The kernel reports ATA disks behind the SCSI layer with the vendor
/// name "ATA" and the real vendor folded into the model string. Split
/// it back apart on the first space when possible.
fn scsi_vendor_and_model(vendor: String, model: String) -> ScsiName {
    if vendor == "ATA" {
        if let Some((real_vendor, real_model)) = model.split_once(' ') {
            return ScsiName {
                vendor: real_vendor.to_string(),
                model: real_model.to_string(),
            };
        }
    }
    ScsiName { vendor, model }
}

fn scalar_text(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::Str(text) => Some(text.clone()),
        PropertyValue::Int(number) => Some(number.to_string()),
        PropertyValue::Float(number) => Some(number.to_string()),
        PropertyValue::Bool(flag) => Some(if *flag { "True" } else { "False" }.into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hal(udi: &str, properties: &[(&str, PropertyValue)]) -> HalDevice {
        HalDevice {
            id: 1,
            udi: udi.to_string(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn str_prop(value: &str) -> PropertyValue {
        PropertyValue::Str(value.to_string())
    }

    #[test]
    fn hal_raw_bus_prefers_info_bus() {
        let device = hal(
            "/org/freedesktop/Hal/devices/usb_x",
            &[
                ("info.bus", str_prop("usb_device")),
                ("info.subsystem", str_prop("usb")),
            ],
        );
        assert_eq!(device.raw_bus(), Some("usb_device"));
    }

    #[test]
    fn hal_root_vendor_comes_from_system_properties() {
        let device = Device::Hal(hal(
            ROOT_UDI,
            &[
                ("system.hardware.vendor", str_prop("FooCorp")),
                ("system.hardware.product", str_prop("Baz 9000")),
            ],
        ));
        assert_eq!(device.vendor().as_deref(), Some("FooCorp"));
        assert_eq!(device.vendor_id(), Some(IdValue::Text("FooCorp".into())));
        assert_eq!(device.product().as_deref(), Some("Baz 9000"));
    }

    #[test]
    fn hal_pci_ids_are_formatted_in_hex() {
        let device = Device::Hal(hal(
            "/org/freedesktop/Hal/devices/pci_8086_27c5",
            &[
                ("info.bus", str_prop("pci")),
                ("pci.vendor_id", PropertyValue::Int(0x8086)),
                ("pci.product_id", PropertyValue::Int(0x27c5)),
            ],
        ));
        assert_eq!(device.vendor_id_for_db().as_deref(), Some("0x8086"));
        assert_eq!(device.product_id_for_db().as_deref(), Some("0x27c5"));
    }

    #[test]
    fn ata_vendor_is_split_from_the_model_string() {
        let device = Device::Hal(hal(
            "/org/freedesktop/Hal/devices/scsi_disk",
            &[
                ("info.bus", str_prop("scsi")),
                ("scsi.vendor", str_prop("ATA")),
                ("scsi.model", str_prop("Hitachi HTS541616J9SA00")),
            ],
        ));
        assert_eq!(device.vendor().as_deref(), Some("Hitachi"));
        assert_eq!(device.product().as_deref(), Some("HTS541616J9SA00"));
    }

    #[test]
    fn scsi_ids_are_padded_for_the_catalog() {
        let device = Device::Hal(hal(
            "/org/freedesktop/Hal/devices/scsi_disk",
            &[
                ("info.bus", str_prop("scsi")),
                ("scsi.vendor", str_prop("SEAGATE")),
                ("scsi.model", str_prop("ST1096N")),
            ],
        ));
        assert_eq!(device.vendor_id_for_db().as_deref(), Some("SEAGATE "));
        assert_eq!(
            device.product_id_for_db().as_deref(),
            Some("ST1096N         ")
        );
    }

    fn udev(
        path: &str,
        properties: &[(&str, &str)],
        sysfs: Option<&[(&str, &str)]>,
        dmi: Option<&[(&str, &str)]>,
    ) -> UdevDevice {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        UdevDevice {
            data: UdevDeviceData {
                id: 1,
                path: path.to_string(),
                properties: to_map(properties),
                symlinks: Vec::new(),
                extra: HashMap::new(),
            },
            sysfs: sysfs.map(to_map),
            dmi: dmi.map(to_map),
        }
    }

    #[test]
    fn udev_root_device_uses_dmi_names() {
        let device = Device::Udev(udev(
            UDEV_ROOT_PATH,
            &[("SUBSYSTEM", "acpi")],
            None,
            Some(&[
                (DMI_SYS_VENDOR, "FooCorp"),
                (DMI_PRODUCT_NAME, "Baz 9000"),
            ]),
        ));
        assert!(device.is_root_device());
        assert_eq!(device.raw_bus(), None);
        assert_eq!(device.vendor().as_deref(), Some("FooCorp"));
        assert_eq!(device.product_id(), Some(IdValue::Text("Baz 9000".into())));
    }

    #[test]
    fn udev_pci_class_info_splits_the_24_bit_value() {
        let device = Device::Udev(udev(
            "/devices/pci0000:00/0000:00:1f.2",
            &[
                ("SUBSYSTEM", "pci"),
                ("PCI_CLASS", "10602"),
                ("PCI_ID", "8086:27C5"),
            ],
            None,
            None,
        ));
        assert_eq!(device.pci_class(), Some(1));
        assert_eq!(device.pci_subclass(), Some(6));
        assert_eq!(device.vendor_id(), Some(IdValue::Int(0x8086)));
        assert_eq!(device.vendor().as_deref(), Some("Unknown"));
    }

    #[test]
    fn udev_devtype_wins_over_subsystem() {
        let device = udev(
            "/devices/usb1",
            &[("SUBSYSTEM", "usb"), ("DEVTYPE", "usb_device")],
            None,
            None,
        );
        assert_eq!(device.raw_bus(), Some("usb_device"));
    }

    #[test]
    fn udev_scsi_device_subsystem_subnode_has_no_bus() {
        let device = udev("/devices/x", &[("SUBSYSTEM", "scsi_device")], None, None);
        assert_eq!(device.raw_bus(), None);
    }

    #[test]
    fn udev_scsi_node_without_sysfs_is_not_a_scsi_device() {
        let device = udev(
            "/devices/scsi/0:0:0:0",
            &[("SUBSYSTEM", "scsi"), ("DEVTYPE", "scsi_device")],
            None,
            None,
        );
        assert!(!device.is_scsi_device());
        let device = udev(
            "/devices/scsi/0:0:0:0",
            &[("SUBSYSTEM", "scsi"), ("DEVTYPE", "scsi_device")],
            Some(&[("vendor", "ATA"), ("model", "X Y"), ("type", "0")]),
            None,
        );
        assert!(device.is_scsi_device());
        let wrapped = Device::Udev(device);
        assert_eq!(wrapped.vendor().as_deref(), Some("X"));
    }
}
