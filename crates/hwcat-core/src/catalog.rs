//! Catalog ports. Record emission talks to the hardware catalog
//! through these traits; [`MemoryCatalog`] is the in-process store
//! used in tests and for dry runs.

use serde::Serialize;
use std::collections::HashMap;

use crate::device::HwBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DriverHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LinkHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubmissionDeviceHandle(pub usize);

/// Devices, identified by (bus, vendor id, product id).
pub trait DeviceCatalog {
    fn get_or_create_device(
        &mut self,
        bus: HwBus,
        vendor_id: &str,
        product_id: &str,
        product_name: &str,
    ) -> DeviceHandle;
}

/// Kernel drivers, identified by (package name, driver name).
pub trait DriverCatalog {
    fn get_or_create_driver(
        &mut self,
        package_name: Option<&str>,
        driver_name: &str,
    ) -> DriverHandle;
}

/// Device/driver links. A link with no driver relates data to the
/// device in general rather than to one driver of it.
pub trait LinkCatalog {
    fn get_or_create_link(
        &mut self,
        device: DeviceHandle,
        driver: Option<DriverHandle>,
    ) -> LinkHandle;
}

/// Vendor names and their per-bus vendor id associations.
pub trait VendorCatalog {
    /// Ensure a (bus, vendor id) -> vendor name association exists,
    /// creating the name record first when needed.
    fn ensure_vendor(&mut self, bus: HwBus, vendor_id: &str, vendor_name: &str);
}

/// Per-submission device occurrences, chained to their parent
/// occurrence.
pub trait SubmissionDeviceCatalog {
    fn create_submission_device(
        &mut self,
        link: LinkHandle,
        parent: Option<SubmissionDeviceHandle>,
        local_id: i64,
    ) -> SubmissionDeviceHandle;
}

/// The full catalog surface needed to store one submission.
pub trait Catalog:
    DeviceCatalog + DriverCatalog + LinkCatalog + VendorCatalog + SubmissionDeviceCatalog
{
}

impl<T> Catalog for T where
    T: DeviceCatalog
        + DriverCatalog
        + LinkCatalog
        + VendorCatalog
        + SubmissionDeviceCatalog
{
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub bus: HwBus,
    pub vendor_id: String,
    pub product_id: String,
    pub product_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRecord {
    pub package_name: Option<String>,
    pub driver_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub device: DeviceHandle,
    pub driver: Option<DriverHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionDeviceRecord {
    pub link: LinkHandle,
    pub parent: Option<SubmissionDeviceHandle>,
    pub local_id: i64,
}

/// In-memory catalog. Handles index into the record vectors.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    pub devices: Vec<DeviceRecord>,
    pub drivers: Vec<DriverRecord>,
    pub links: Vec<LinkRecord>,
    pub submission_devices: Vec<SubmissionDeviceRecord>,
    pub vendors: HashMap<(HwBus, String), String>,
    device_index: HashMap<(HwBus, String, String), DeviceHandle>,
    driver_index: HashMap<(Option<String>, String), DriverHandle>,
    link_index: HashMap<(DeviceHandle, Option<DriverHandle>), LinkHandle>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, handle: DeviceHandle) -> &DeviceRecord {
        &self.devices[handle.0]
    }

    pub fn driver(&self, handle: DriverHandle) -> &DriverRecord {
        &self.drivers[handle.0]
    }

    pub fn link(&self, handle: LinkHandle) -> &LinkRecord {
        &self.links[handle.0]
    }

    /// Serialize the collected records for dry-run inspection.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Export<'a> {
            devices: &'a [DeviceRecord],
            drivers: &'a [DriverRecord],
            links: &'a [LinkRecord],
            submission_devices: &'a [SubmissionDeviceRecord],
        }
        serde_json::to_string_pretty(&Export {
            devices: &self.devices,
            drivers: &self.drivers,
            links: &self.links,
            submission_devices: &self.submission_devices,
        })
    }
}

impl DeviceCatalog for MemoryCatalog {
    fn get_or_create_device(
        &mut self,
        bus: HwBus,
        vendor_id: &str,
        product_id: &str,
        product_name: &str,
    ) -> DeviceHandle {
        let key = (bus, vendor_id.to_string(), product_id.to_string());
        if let Some(handle) = self.device_index.get(&key) {
            return *handle;
        }
        let handle = DeviceHandle(self.devices.len());
        self.devices.push(DeviceRecord {
            bus,
            vendor_id: vendor_id.to_string(),
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
        });
        self.device_index.insert(key, handle);
        handle
    }
}

impl DriverCatalog for MemoryCatalog {
    fn get_or_create_driver(
        &mut self,
        package_name: Option<&str>,
        driver_name: &str,
    ) -> DriverHandle {
        let key = (package_name.map(str::to_string), driver_name.to_string());
        if let Some(handle) = self.driver_index.get(&key) {
            return *handle;
        }
        let handle = DriverHandle(self.drivers.len());
        self.drivers.push(DriverRecord {
            package_name: key.0.clone(),
            driver_name: key.1.clone(),
        });
        self.driver_index.insert(key, handle);
        handle
    }
}

impl LinkCatalog for MemoryCatalog {
    fn get_or_create_link(
        &mut self,
        device: DeviceHandle,
        driver: Option<DriverHandle>,
    ) -> LinkHandle {
        let key = (device, driver);
        if let Some(handle) = self.link_index.get(&key) {
            return *handle;
        }
        let handle = LinkHandle(self.links.len());
        self.links.push(LinkRecord { device, driver });
        self.link_index.insert(key, handle);
        handle
    }
}

impl VendorCatalog for MemoryCatalog {
    fn ensure_vendor(&mut self, bus: HwBus, vendor_id: &str, vendor_name: &str) {
        self.vendors
            .entry((bus, vendor_id.to_string()))
            .or_insert_with(|| vendor_name.to_string());
    }
}

impl SubmissionDeviceCatalog for MemoryCatalog {
    fn create_submission_device(
        &mut self,
        link: LinkHandle,
        parent: Option<SubmissionDeviceHandle>,
        local_id: i64,
    ) -> SubmissionDeviceHandle {
        let handle = SubmissionDeviceHandle(self.submission_devices.len());
        self.submission_devices.push(SubmissionDeviceRecord {
            link,
            parent,
            local_id,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_records_are_deduplicated_by_identity() {
        let mut catalog = MemoryCatalog::new();
        let a = catalog.get_or_create_device(HwBus::Pci, "0x8086", "0x27c5", "AHCI");
        let b = catalog.get_or_create_device(HwBus::Pci, "0x8086", "0x27c5", "AHCI");
        let c = catalog.get_or_create_device(HwBus::Usb, "0x8086", "0x27c5", "AHCI");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(catalog.devices.len(), 2);
    }

    #[test]
    fn links_distinguish_bare_devices_from_driver_pairs() {
        let mut catalog = MemoryCatalog::new();
        let device = catalog.get_or_create_device(HwBus::Pci, "0x8086", "0x27c5", "AHCI");
        let driver = catalog.get_or_create_driver(Some("linux-image-2.6.28"), "ahci");
        let bare = catalog.get_or_create_link(device, None);
        let with_driver = catalog.get_or_create_link(device, Some(driver));
        assert_ne!(bare, with_driver);
        assert_eq!(catalog.get_or_create_link(device, None), bare);
    }

    #[test]
    fn first_vendor_name_wins() {
        let mut catalog = MemoryCatalog::new();
        catalog.ensure_vendor(HwBus::Scsi, "SEAGATE ", "SEAGATE");
        catalog.ensure_vendor(HwBus::Scsi, "SEAGATE ", "Seagate Inc.");
        assert_eq!(
            catalog.vendors[&(HwBus::Scsi, "SEAGATE ".to_string())],
            "SEAGATE"
        );
    }

    #[test]
    fn export_round_trips_through_json() {
        let mut catalog = MemoryCatalog::new();
        let device = catalog.get_or_create_device(HwBus::Pci, "0x8086", "0x27c5", "AHCI");
        let driver = catalog.get_or_create_driver(Some("linux-image-2.6.28"), "ahci");
        catalog.get_or_create_link(device, Some(driver));
        let exported: serde_json::Value =
            serde_json::from_str(&catalog.export_json().unwrap()).unwrap();
        assert_eq!(exported["devices"][0]["vendor_id"], "0x8086");
        assert_eq!(exported["links"][0]["driver"], 0);
    }

    #[test]
    fn submission_devices_are_never_deduplicated() {
        let mut catalog = MemoryCatalog::new();
        let device = catalog.get_or_create_device(HwBus::Pci, "0x8086", "0x27c5", "AHCI");
        let link = catalog.get_or_create_link(device, None);
        let first = catalog.create_submission_device(link, None, 1);
        let second = catalog.create_submission_device(link, Some(first), 2);
        assert_ne!(first, second);
        assert_eq!(catalog.submission_devices[second.0].parent, Some(first));
    }
}
