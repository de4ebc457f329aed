//! Record emission: walk the device tree depth-first and write catalog
//! records for every real, reliably identified device and its drivers.

use crate::catalog::{Catalog, DeviceHandle, SubmissionDeviceHandle};
use crate::device::{Device, HwBus};
use crate::diagnostics::{Diagnostics, WarnCategory};
use crate::parser::{Package, Summary};
use crate::tree::{DeviceTree, NodeId};
use std::collections::HashMap;

/// The kernel package the submission ran under, derived from the root
/// device's kernel version property (hierarchical format) or from the
/// summary (flat format). A version that the package list does not
/// know about is treated as absent: drivers are then recorded without
/// a package.
pub fn kernel_package_name(
    tree: &DeviceTree,
    summary: &Summary,
    packages: &HashMap<String, Package>,
    diag: &mut Diagnostics,
) -> Option<String> {
    let kernel_version = match tree.device(tree.root()) {
        Device::Hal(root) => root
            .property("system.kernel.version")
            .and_then(|value| value.as_str())
            .map(str::to_string),
        Device::Udev(_) => summary.kernel_release.clone(),
    };
    let kernel_version = match kernel_version {
        Some(version) => version,
        None => {
            diag.warn_once(
                WarnCategory::MissingKernelVersion,
                "submission provides neither a root device kernel version \
                 property nor a summary <kernel-release> node",
            );
            return None;
        }
    };
    let package_name = format!("linux-image-{kernel_version}");
    // Package data is optional, but when present it must agree.
    if !packages.is_empty() && !packages.contains_key(&package_name) {
        diag.warn_once(
            WarnCategory::KernelPackageMismatch,
            &format!(
                "inconsistent kernel version data: according to the hardware \
                 data the kernel is {kernel_version}, but the submission does \
                 not know about a kernel package {package_name}"
            ),
        );
        return None;
    }
    Some(package_name)
}

/// Writes catalog records for one submission's device tree.
pub struct RecordEmitter<'a, C: Catalog> {
    tree: &'a DeviceTree,
    catalog: &'a mut C,
    kernel_package: Option<String>,
}

impl<'a, C: Catalog> RecordEmitter<'a, C> {
    pub fn new(
        tree: &'a DeviceTree,
        catalog: &'a mut C,
        kernel_package: Option<String>,
    ) -> Self {
        Self {
            tree,
            catalog,
            kernel_package,
        }
    }

    pub fn emit(&mut self, diag: &mut Diagnostics) {
        self.create_device_records(self.tree.root(), None, diag);
    }

    /// Record a real device: the device itself, a driverless link for
    /// it, and its occurrence in this submission; then its drivers and
    /// children. A device without reliable identity ends the walk for
    /// its whole subtree.
    fn create_device_records(
        &mut self,
        node: NodeId,
        parent: Option<SubmissionDeviceHandle>,
        diag: &mut Diagnostics,
    ) {
        if !self.tree.has_reliable_data(node, diag) {
            return;
        }
        let device = self.tree.device(node);
        // has_reliable_data guarantees all four identity parts.
        let bus = match self.tree.real_bus(node, diag) {
            Some(bus) => bus,
            None => return,
        };
        let (vendor_id, product_id, product) = match (
            device.vendor_id_for_db(),
            device.product_id_for_db(),
            device.product(),
        ) {
            (Some(vendor_id), Some(product_id), Some(product)) => {
                (vendor_id, product_id, product)
            }
            _ => return,
        };

        self.ensure_vendor(node, bus, &vendor_id);

        let db_device = self
            .catalog
            .get_or_create_device(bus, &vendor_id, &product_id, &product);
        // A driverless link lets data be related to the device in
        // general as well as to a device/driver combination.
        let link = self.catalog.get_or_create_link(db_device, None);
        let submission_device =
            self.catalog
                .create_submission_device(link, parent, device.local_id());
        self.create_driver_records(node, db_device, submission_device, diag);
    }

    /// Record the driver of a node against `db_device`, then recurse:
    /// real children start their own device records, aspect nodes
    /// contribute their drivers to the owning real device.
    fn create_driver_records(
        &mut self,
        node: NodeId,
        db_device: DeviceHandle,
        submission_device: SubmissionDeviceHandle,
        diag: &mut Diagnostics,
    ) {
        let device = self.tree.device(node);
        let mut submission_device = submission_device;
        if let Some(driver_name) = device.driver_name() {
            let driver = self
                .catalog
                .get_or_create_driver(self.kernel_package.as_deref(), driver_name);
            let link = self.catalog.get_or_create_link(db_device, Some(driver));
            submission_device = self.catalog.create_submission_device(
                link,
                Some(submission_device),
                device.local_id(),
            );
        }
        for &child in self.tree.children(node) {
            if self.tree.is_real_device(child, diag) {
                self.create_device_records(child, Some(submission_device), diag);
            } else {
                self.create_driver_records(child, db_device, submission_device, diag);
            }
        }
    }

    /// For buses whose ids come from independent registries (PCI,
    /// PC Card, USB) the submitted vendor name is ignored; everything
    /// else seeds the vendor tables from the submission.
    fn ensure_vendor(&mut self, node: NodeId, bus: HwBus, vendor_id: &str) {
        if matches!(bus, HwBus::Pci | HwBus::Pccard | HwBus::Usb) {
            return;
        }
        if let Some(vendor) = self.tree.device(node).vendor() {
            self.catalog.ensure_vendor(bus, vendor_id, &vendor);
        }
    }
}
