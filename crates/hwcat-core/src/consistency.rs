//! Cross-section consistency checks, run after parsing and before any
//! device tree is built. The checks run in a fixed order and the first
//! failure aborts processing of the submission.
//!
//! One check mutates the data: a duplicate device identifier that is
//! on the known producer-bug allow list is dropped instead of being
//! treated as an error.

use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::diagnostics::Diagnostics;
use crate::error::SubmissionError;
use crate::parser::hardware::SysfsAttributes;
use crate::parser::{HalDeviceData, ParsedSubmission, UdevDeviceData};

pub const ROOT_UDI: &str = "/org/freedesktop/Hal/devices/computer";

/// Identifiers that appear twice in otherwise sane submissions, caused
/// by a known bug in an old producer release.
const KNOWN_DUPLICATE_UDIS: &[&str] = &[
    "/org/freedesktop/Hal/devices/ssb__null_",
    "/org/freedesktop/Hal/devices/uinput",
    "/org/freedesktop/Hal/devices/ignored-device",
];

const PCI_PROPERTIES: &[&str] = &["PCI_CLASS", "PCI_ID", "PCI_SUBSYS_ID", "PCI_SLOT_NAME"];
const USB_PROPERTIES: &[&str] = &["DEVTYPE", "PRODUCT", "TYPE"];
const SCSI_SYSFS_ATTRIBUTES: &[&str] = &["vendor", "model", "type"];

fn inconsistent(message: String) -> SubmissionError {
    SubmissionError::Inconsistent(message)
}

/// Compiled value patterns for the flat-export property checks.
struct UdevPatterns {
    pci_class: Regex,
    pci_id: Regex,
    usb_product: Regex,
    usb_type: Regex,
}

impl UdevPatterns {
    fn new() -> Self {
        // Fixed literals; compilation cannot fail.
        Self {
            pci_class: Regex::new(r"(?i)^[0-9a-f]{1,6}$").unwrap(),
            pci_id: Regex::new(r"(?i)^[0-9a-f]{4}:[0-9a-f]{4}$").unwrap(),
            usb_product: Regex::new(r"(?i)^[0-9a-f]{1,4}/[0-9a-f]{1,4}/[0-9a-f]{1,4}$")
                .unwrap(),
            usb_type: Regex::new(r"^[0-9]{1,3}/[0-9]{1,3}/[0-9]{1,3}$").unwrap(),
        }
    }
}

/// Run all consistency checks. Allow-listed duplicate device entries
/// are removed from `parsed` as a side effect.
pub fn check_consistency(
    parsed: &mut ParsedSubmission,
    diag: &mut Diagnostics,
) -> Result<(), SubmissionError> {
    if let Some(hal) = parsed.hardware.hal.as_mut() {
        drop_known_duplicate_devices(&mut hal.devices)?;
    }

    find_duplicate_ids(parsed)?;
    find_invalid_id_references(parsed)?;

    if let Some(hal) = &parsed.hardware.hal {
        let udi_children = collect_udi_children(&hal.devices)?;
        let circular = find_circular_references(&udi_children);
        if !circular.is_empty() {
            return Err(inconsistent(format!(
                "devices with circular parent/child relationship: {circular:?}"
            )));
        }
    }

    if let Some(udev) = &parsed.hardware.udev {
        check_udev_device_data(
            udev,
            &parsed.hardware.sysfs,
            parsed.hardware.dmi.as_ref(),
            diag,
        )?;
    }

    Ok(())
}

/// All local ids must be unique across device, processor and package
/// entries. The flat format keys devices by path instead, so its paths
/// form their own namespace.
fn find_duplicate_ids(parsed: &ParsedSubmission) -> Result<(), SubmissionError> {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    let mut check = |id: i64| {
        if !seen.insert(id) {
            duplicates.insert(id);
        }
    };

    if let Some(hal) = &parsed.hardware.hal {
        for device in &hal.devices {
            check(device.id);
        }
    }
    for processor in &parsed.hardware.processors {
        check(processor.id);
    }
    for package in parsed.software.packages.values() {
        check(package.id);
    }

    let mut seen_paths = HashSet::new();
    let mut duplicate_paths = BTreeSet::new();
    if let Some(udev) = &parsed.hardware.udev {
        for device in udev {
            if !seen_paths.insert(device.path.as_str()) {
                duplicate_paths.insert(device.path.clone());
            }
        }
    }

    if !duplicates.is_empty() || !duplicate_paths.is_empty() {
        return Err(inconsistent(format!(
            "duplicate ids found: {duplicates:?} {duplicate_paths:?}"
        )));
    }
    Ok(())
}

/// Question targets reference devices, processors or packages by their
/// local id. A target pointing nowhere fails the submission.
fn find_invalid_id_references(parsed: &ParsedSubmission) -> Result<(), SubmissionError> {
    let mut known_ids = HashSet::new();
    if let Some(hal) = &parsed.hardware.hal {
        known_ids.extend(hal.devices.iter().map(|d| d.id));
    }
    known_ids.extend(parsed.hardware.processors.iter().map(|p| p.id));
    known_ids.extend(parsed.software.packages.values().map(|p| p.id));

    let mut invalid = BTreeSet::new();
    for question in &parsed.questions {
        for target in &question.targets {
            if !known_ids.contains(&target.id) {
                invalid.insert(target.id);
            }
        }
    }
    if !invalid.is_empty() {
        return Err(inconsistent(format!(
            "invalid id references found: {invalid:?}"
        )));
    }
    Ok(())
}

fn parent_udi(device: &HalDeviceData) -> Option<&str> {
    device
        .properties
        .get("info.parent")
        .and_then(|value| value.as_str())
}

/// Remove repeated device entries whose identifier (or whose parent's
/// identifier) is on the allow list; any other repeat is an error.
fn drop_known_duplicate_devices(
    devices: &mut Vec<HalDeviceData>,
) -> Result<(), SubmissionError> {
    let mut seen = HashSet::new();
    let mut result = Ok(());
    devices.retain(|device| {
        if result.is_err() {
            return true;
        }
        if seen.insert(device.udi.clone()) {
            return true;
        }
        let allowed = KNOWN_DUPLICATE_UDIS.contains(&device.udi.as_str())
            || parent_udi(device)
                .map(|parent| KNOWN_DUPLICATE_UDIS.contains(&parent))
                .unwrap_or(false);
        if !allowed {
            result = Err(inconsistent(format!("duplicate device: {}", device.udi)));
        }
        false
    });
    result
}

/// Map each device identifier to the identifiers of its children; in
/// passing, verify that the tree has exactly the expected root and no
/// dangling parent references.
fn collect_udi_children(
    devices: &[HalDeviceData],
) -> Result<HashMap<String, Vec<String>>, SubmissionError> {
    let known_udis: HashSet<&str> = devices.iter().map(|d| d.udi.as_str()).collect();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    for device in devices {
        match parent_udi(device) {
            Some(parent) => {
                if !known_udis.contains(parent) {
                    return Err(inconsistent(format!(
                        "unknown parent {parent} in device {}",
                        device.id
                    )));
                }
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(device.udi.clone());
            }
            None => {
                if device.udi != ROOT_UDI {
                    return Err(inconsistent(format!(
                        "root device found with unexpected identifier: {}",
                        device.udi
                    )));
                }
            }
        }
    }
    if !children.contains_key(ROOT_UDI) {
        return Err(inconsistent("no root device found".into()));
    }
    Ok(children)
}

fn sweep(children: &mut HashMap<String, Vec<String>>, udi: &str) {
    if let Some(removed) = children.remove(udi) {
        for child in removed {
            sweep(children, &child);
        }
    }
}

/// A destructive sweep from the root removes every reachable subtree;
/// whatever survives is part of a parent/child cycle.
fn find_circular_references(udi_children: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut test = udi_children.clone();
    sweep(&mut test, ROOT_UDI);
    let mut remaining: Vec<String> = test.into_keys().collect();
    remaining.sort();
    remaining
}

fn check_udev_device_data(
    udev: &[UdevDeviceData],
    sysfs: &SysfsAttributes,
    dmi: Option<&HashMap<String, String>>,
    diag: &mut Diagnostics,
) -> Result<(), SubmissionError> {
    let patterns = UdevPatterns::new();
    check_udev_paths(udev)?;
    check_udev_pci_properties(udev, &patterns)?;
    check_udev_usb_properties(udev, &patterns)?;
    check_udev_scsi_properties(udev, sysfs, diag)?;
    if let Some(dmi) = dmi {
        check_dmi_keys(dmi)?;
    }
    Ok(())
}

fn check_udev_paths(udev: &[UdevDeviceData]) -> Result<(), SubmissionError> {
    for device in udev {
        if device.path.is_empty() {
            return Err(inconsistent("device block without a path found".into()));
        }
    }
    Ok(())
}

/// PCI devices must carry exactly the well-known PCI properties with
/// well-formed values; other devices must carry none of them.
fn check_udev_pci_properties(
    udev: &[UdevDeviceData],
    patterns: &UdevPatterns,
) -> Result<(), SubmissionError> {
    for device in udev {
        let subsystem = device.properties.get("SUBSYSTEM").ok_or_else(|| {
            inconsistent(format!("device without SUBSYSTEM property: {}", device.path))
        })?;
        let present: Vec<&&str> = PCI_PROPERTIES
            .iter()
            .filter(|name| device.properties.contains_key(**name))
            .collect();
        if subsystem == "pci" {
            if present.len() != PCI_PROPERTIES.len() {
                return Err(inconsistent(format!(
                    "PCI device without required PCI properties: {}",
                    device.path
                )));
            }
            let class = &device.properties["PCI_CLASS"];
            if !patterns.pci_class.is_match(class) {
                return Err(inconsistent(format!(
                    "invalid PCI class {class:?}: {}",
                    device.path
                )));
            }
            for name in ["PCI_ID", "PCI_SUBSYS_ID"] {
                let id = &device.properties[name];
                if !patterns.pci_id.is_match(id) {
                    return Err(inconsistent(format!(
                        "invalid PCI device id {id:?}: {}",
                        device.path
                    )));
                }
            }
        } else if !present.is_empty() {
            return Err(inconsistent(format!(
                "non-PCI device with PCI properties: {}",
                device.path
            )));
        }
    }
    Ok(())
}

/// USB devices carry either all of DEVTYPE, PRODUCT and TYPE or none
/// of them; interface nodes additionally need INTERFACE.
fn check_udev_usb_properties(
    udev: &[UdevDeviceData],
    patterns: &UdevPatterns,
) -> Result<(), SubmissionError> {
    for device in udev {
        if device.properties.get("SUBSYSTEM").map(String::as_str) != Some("usb") {
            continue;
        }
        let present = USB_PROPERTIES
            .iter()
            .filter(|name| device.properties.contains_key(**name))
            .count();
        if present == 0 {
            continue;
        }
        if present != USB_PROPERTIES.len() {
            return Err(inconsistent(format!(
                "USB device without required properties: {}",
                device.path
            )));
        }
        let product = &device.properties["PRODUCT"];
        if !patterns.usb_product.is_match(product) {
            return Err(inconsistent(format!(
                "USB device with invalid product id {product:?}: {}",
                device.path
            )));
        }
        let type_data = &device.properties["TYPE"];
        if !patterns.usb_type.is_match(type_data) {
            return Err(inconsistent(format!(
                "USB device with invalid type data {type_data:?}: {}",
                device.path
            )));
        }
        match device.properties["DEVTYPE"].as_str() {
            "usb_device" => {}
            "usb_interface" => {
                let interface = device.properties.get("INTERFACE").ok_or_else(|| {
                    inconsistent(format!(
                        "USB interface without INTERFACE property: {}",
                        device.path
                    ))
                })?;
                if !patterns.usb_type.is_match(interface) {
                    return Err(inconsistent(format!(
                        "USB interface with invalid INTERFACE property \
                         {interface:?}: {}",
                        device.path
                    )));
                }
            }
            other => {
                return Err(inconsistent(format!(
                    "USB device with invalid device type {other:?}: {}",
                    device.path
                )))
            }
        }
    }
    Ok(())
}

/// SCSI device nodes need a matching sysfs record with the inquiry
/// attributes. Submissions from producers that never exported sysfs
/// data pass silently; their SCSI nodes are ignored later.
fn check_udev_scsi_properties(
    udev: &[UdevDeviceData],
    sysfs: &SysfsAttributes,
    diag: &mut Diagnostics,
) -> Result<(), SubmissionError> {
    if sysfs.is_unavailable() {
        diag.warn("sysfs attributes unavailable, skipping SCSI checks");
        return Ok(());
    }
    for device in udev {
        if device.properties.get("SUBSYSTEM").map(String::as_str) != Some("scsi") {
            continue;
        }
        let devtype = device.properties.get("DEVTYPE").ok_or_else(|| {
            inconsistent(format!(
                "SCSI device without DEVTYPE property: {}",
                device.path
            ))
        })?;
        if devtype != "scsi_device" {
            continue;
        }
        let attributes = sysfs.for_path(&device.path).ok_or_else(|| {
            inconsistent(format!(
                "SCSI device without related sysfs record: {}",
                device.path
            ))
        })?;
        for name in SCSI_SYSFS_ATTRIBUTES {
            if !attributes.contains_key(*name) {
                return Err(inconsistent(format!(
                    "SCSI device without required sysfs attribute {name}: {}",
                    device.path
                )));
            }
        }
    }
    Ok(())
}

fn check_dmi_keys(dmi: &HashMap<String, String>) -> Result<(), SubmissionError> {
    for key in dmi.keys() {
        if !key.starts_with("/sys/class/dmi/id/") {
            return Err(inconsistent(format!("invalid DMI key: {key:?}")));
        }
    }
    Ok(())
}
