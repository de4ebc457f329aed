//! The `<hardware>` section and its six sub-parsers: hierarchical
//! device tree, processor list, alias list, flat udev export, DMI
//! table and sysfs-attribute table.
//!
//! The hierarchical (`<hal>`) and flat (`<udev>`) representations are
//! mutually exclusive in practice; downstream checking and tree
//! building branch on whichever is present.

use serde::Serialize;
use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::error::SubmissionError;
use crate::parser::parse_properties;
use crate::value::PropertyValue;
use crate::xml::Element;

/// One node of the hierarchical device tree.
#[derive(Debug, Clone, Serialize)]
pub struct HalDeviceData {
    pub id: i64,
    /// Unique device identifier; the tree key of this format.
    pub udi: String,
    /// Id of the parent device, absent for the root.
    pub parent: Option<i64>,
    pub properties: HashMap<String, PropertyValue>,
}

/// One block of the flat path-keyed export.
#[derive(Debug, Clone, Serialize, Default)]
pub struct UdevDeviceData {
    /// Per-submission local id, numbered in encounter order from 1.
    pub id: i64,
    /// The device path; the tree key of this format.
    pub path: String,
    /// `E:` environment-style key/value properties.
    pub properties: HashMap<String, String>,
    /// `S:` symlink names in declaration order.
    pub symlinks: Vec<String>,
    /// Remaining single-letter record keys, stored verbatim.
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Processor {
    pub id: i64,
    pub name: String,
    pub properties: HashMap<String, PropertyValue>,
}

/// Alternative vendor/model naming for a device node.
#[derive(Debug, Clone, Serialize)]
pub struct Alias {
    pub target: i64,
    pub vendor: String,
    pub model: String,
}

/// The sysfs-attribute table. Older producers did not emit it at all;
/// that state is distinct from an empty table and downstream SCSI
/// checks treat it as a silent pass.
#[derive(Debug, Clone, Serialize)]
pub enum SysfsAttributes {
    Unavailable,
    Present(HashMap<String, HashMap<String, String>>),
}

impl SysfsAttributes {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SysfsAttributes::Unavailable)
    }

    /// Attributes recorded for a device path, if the table is present.
    pub fn for_path(&self, path: &str) -> Option<&HashMap<String, String>> {
        match self {
            SysfsAttributes::Unavailable => None,
            SysfsAttributes::Present(map) => map.get(path),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HalData {
    pub version: String,
    pub devices: Vec<HalDeviceData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hardware {
    pub hal: Option<HalData>,
    pub udev: Option<Vec<UdevDeviceData>>,
    pub dmi: Option<HashMap<String, String>>,
    pub sysfs: SysfsAttributes,
    pub processors: Vec<Processor>,
    pub aliases: Vec<Alias>,
}

pub fn parse_hardware(
    hardware: &Element,
    diag: &mut Diagnostics,
) -> Result<Hardware, SubmissionError> {
    let mut hal = None;
    let mut udev = None;
    let mut dmi = None;
    let mut sysfs = SysfsAttributes::Unavailable;
    let mut processors = Vec::new();
    let mut aliases = Vec::new();

    for node in &hardware.children {
        match node.name.as_str() {
            "hal" => hal = Some(parse_hal(node)?),
            "udev" => udev = Some(parse_udev(node, diag)?),
            "dmi" => dmi = Some(parse_dmi(node)?),
            "sysfs-attributes" => sysfs = SysfsAttributes::Present(parse_sysfs(node)?),
            "processors" => processors = parse_processors(node)?,
            "aliases" => aliases = parse_aliases(node)?,
            other => {
                return Err(SubmissionError::Internal(format!(
                    "unexpected hardware node <{other}>"
                )))
            }
        }
    }

    Ok(Hardware {
        hal,
        udev,
        dmi,
        sysfs,
        processors,
        aliases,
    })
}

fn int_attr(node: &Element, name: &str) -> Result<i64, SubmissionError> {
    node.attr(name)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            SubmissionError::Internal(format!(
                "<{}> without integer {name} attribute",
                node.name
            ))
        })
}

fn parse_hal(hal: &Element) -> Result<HalData, SubmissionError> {
    let version = hal
        .attr("version")
        .ok_or_else(|| SubmissionError::Internal("<hal> without version".into()))?
        .to_string();
    let mut devices = Vec::with_capacity(hal.children.len());
    for device in &hal.children {
        if device.name != "device" {
            return Err(SubmissionError::Internal(format!(
                "unexpected <{}> in <hal>",
                device.name
            )));
        }
        let parent = match device.attr("parent") {
            Some(_) => Some(int_attr(device, "parent")?),
            None => None,
        };
        devices.push(HalDeviceData {
            id: int_attr(device, "id")?,
            udi: device
                .attr("udi")
                .ok_or_else(|| SubmissionError::Internal("<device> without udi".into()))?
                .to_string(),
            parent,
            properties: parse_properties(device)?,
        });
    }
    Ok(HalData { version, devices })
}

fn parse_processors(processors: &Element) -> Result<Vec<Processor>, SubmissionError> {
    let mut result = Vec::with_capacity(processors.children.len());
    for processor in &processors.children {
        if processor.name != "processor" {
            return Err(SubmissionError::Internal(format!(
                "unexpected <{}> in <processors>",
                processor.name
            )));
        }
        result.push(Processor {
            id: int_attr(processor, "id")?,
            name: processor
                .attr("name")
                .ok_or_else(|| {
                    SubmissionError::Internal("<processor> without name".into())
                })?
                .to_string(),
            properties: parse_properties(processor)?,
        });
    }
    Ok(result)
}

fn parse_aliases(aliases: &Element) -> Result<Vec<Alias>, SubmissionError> {
    let mut result = Vec::with_capacity(aliases.children.len());
    for alias in &aliases.children {
        if alias.name != "alias" {
            return Err(SubmissionError::Internal(format!(
                "unexpected <{}> in <aliases>",
                alias.name
            )));
        }
        let vendor = alias.child("vendor").map(|n| n.trimmed_text().to_string());
        let model = alias.child("model").map(|n| n.trimmed_text().to_string());
        match (vendor, model) {
            (Some(vendor), Some(model)) => result.push(Alias {
                target: int_attr(alias, "target")?,
                vendor,
                model,
            }),
            _ => {
                return Err(SubmissionError::Malformed(
                    "<alias> without <vendor> and <model>".into(),
                ))
            }
        }
    }
    Ok(result)
}

/// Parse the flat udev export transcript.
///
/// The transcript is line-oriented `key:value` data. Blank lines
/// separate per-device blocks; each block must open with its `P:`
/// path line. `E:` lines hold `name=value` properties, `S:` lines
/// collect into an ordered list, other single-letter keys are kept
/// verbatim (a repeat is warned about, last value wins).
fn parse_udev(
    node: &Element,
    diag: &mut Diagnostics,
) -> Result<Vec<UdevDeviceData>, SubmissionError> {
    let mut devices: Vec<UdevDeviceData> = Vec::new();
    let mut current: Option<UdevDeviceData> = None;
    let mut next_id = 0i64;

    for (line_number, line) in node.text.split('\n').enumerate() {
        if line.is_empty() {
            if let Some(device) = current.take() {
                devices.push(device);
            }
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| {
            SubmissionError::Malformed(format!(
                "line {line_number} in <udev>: no valid key:value data: {line:?}"
            ))
        })?;
        // Some producers emit a space after the colon, some don't.
        let value = value.trim_start();

        let device = match current.as_mut() {
            Some(device) => device,
            None => {
                if key != "P" {
                    return Err(SubmissionError::Malformed(format!(
                        "line {line_number} in <udev>: data line before the \
                         block's path line: {line:?}"
                    )));
                }
                next_id += 1;
                current = Some(UdevDeviceData {
                    id: next_id,
                    path: value.to_string(),
                    ..UdevDeviceData::default()
                });
                continue;
            }
        };

        match key {
            "P" => {
                diag.warn(&format!(
                    "line {line_number} in <udev>: duplicate path line: {line:?}"
                ));
                // Last occurrence wins, like any repeated key.
                device.path = value.to_string();
            }
            "E" => {
                let (prop_key, prop_value) = value.split_once('=').ok_or_else(|| {
                    SubmissionError::Malformed(format!(
                        "line {line_number} in <udev>: property without valid \
                         key=value data: {line:?}"
                    ))
                })?;
                device
                    .properties
                    .insert(prop_key.to_string(), prop_value.to_string());
            }
            "S" => device.symlinks.push(value.to_string()),
            other => {
                if device
                    .extra
                    .insert(other.to_string(), value.to_string())
                    .is_some()
                {
                    diag.warn(&format!(
                        "line {line_number} in <udev>: duplicate attribute key: {line:?}"
                    ));
                }
            }
        }
    }
    if let Some(device) = current.take() {
        devices.push(device);
    }
    Ok(devices)
}

/// Parse the DMI transcript into a key/value table.
fn parse_dmi(node: &Element) -> Result<HashMap<String, String>, SubmissionError> {
    let mut dmi = HashMap::new();
    for (line_number, line) in node.trimmed_text().split('\n').enumerate() {
        let (key, value) = line.split_once(':').ok_or_else(|| {
            SubmissionError::Malformed(format!(
                "line {line_number} in <dmi>: no valid key:value data: {line:?}"
            ))
        })?;
        dmi.insert(key.to_string(), value.to_string());
    }
    Ok(dmi)
}

/// Parse the sysfs-attribute transcript: `P: <path>` opens a block,
/// `A: key=value` lines attach attributes to it.
fn parse_sysfs(
    node: &Element,
) -> Result<HashMap<String, HashMap<String, String>>, SubmissionError> {
    let mut sysfs: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current_path: Option<String> = None;

    for (line_number, line) in node.text.split('\n').enumerate() {
        if line.is_empty() {
            current_path = None;
            continue;
        }
        let (key, value) = line.split_once(": ").ok_or_else(|| {
            SubmissionError::Malformed(format!(
                "line {line_number} in <sysfs-attributes>: no valid key:value \
                 data: {line:?}"
            ))
        })?;
        match key {
            "P" => {
                if current_path.is_some() {
                    return Err(SubmissionError::Malformed(format!(
                        "line {line_number} in <sysfs-attributes>: duplicate \
                         'P' line found: {line:?}"
                    )));
                }
                sysfs.insert(value.to_string(), HashMap::new());
                current_path = Some(value.to_string());
            }
            "A" => {
                let path = current_path.as_ref().ok_or_else(|| {
                    SubmissionError::Malformed(format!(
                        "line {line_number} in <sysfs-attributes>: block does \
                         not start with 'P:': {line:?}"
                    ))
                })?;
                let (attr_key, attr_value) = value.split_once('=').ok_or_else(|| {
                    SubmissionError::Malformed(format!(
                        "line {line_number} in <sysfs-attributes>: attribute \
                         line does not contain key=value data: {line:?}"
                    ))
                })?;
                if let Some(attributes) = sysfs.get_mut(path) {
                    attributes.insert(attr_key.to_string(), attr_value.to_string());
                }
            }
            other => {
                return Err(SubmissionError::Malformed(format!(
                    "line {line_number} in <sysfs-attributes>: unexpected key \
                     {other:?}: {line:?}"
                )))
            }
        }
    }
    Ok(sysfs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn diag() -> Diagnostics {
        Diagnostics::new("test", true)
    }

    #[test]
    fn parses_hal_devices_with_properties() {
        let node = parse_document(
            r#"<hal version="0.5.11">
                 <device id="1" udi="/org/freedesktop/Hal/devices/computer">
                   <property name="system.kernel.version" type="str">2.6.28</property>
                 </device>
                 <device id="2" udi="/org/freedesktop/Hal/devices/pci_8086_27c5" parent="1">
                   <property name="info.bus" type="str">pci</property>
                 </device>
               </hal>"#,
        )
        .unwrap();
        let hal = parse_hal(&node).unwrap();
        assert_eq!(hal.version, "0.5.11");
        assert_eq!(hal.devices.len(), 2);
        assert_eq!(hal.devices[0].parent, None);
        assert_eq!(hal.devices[1].parent, Some(1));
        assert_eq!(
            hal.devices[1].properties["info.bus"],
            crate::value::PropertyValue::Str("pci".into())
        );
    }

    #[test]
    fn duplicate_property_name_is_rejected() {
        let node = parse_document(
            r#"<device id="1" udi="/x">
                 <property name="a" type="int">1</property>
                 <property name="a" type="int">2</property>
               </device>"#,
        )
        .unwrap();
        assert!(parse_properties(&node).is_err());
    }

    #[test]
    fn parses_udev_blocks() {
        let node = parse_document(
            "<udev>\nP: /devices/LNXSYSTM:00\nE: SUBSYSTEM=acpi\n\n\
             P: /devices/pci0000:00/0000:00:1f.2\nE: SUBSYSTEM=pci\n\
             E: DRIVER=ahci\nS: disk/by-id/ata-1\nN: sda\n</udev>",
        )
        .unwrap();
        let devices = parse_udev(&node, &mut diag()).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, 1);
        assert_eq!(devices[0].path, "/devices/LNXSYSTM:00");
        assert_eq!(devices[1].properties["DRIVER"], "ahci");
        assert_eq!(devices[1].symlinks, vec!["disk/by-id/ata-1"]);
        assert_eq!(devices[1].extra["N"], "sda");
    }

    #[test]
    fn udev_duplicate_path_line_warns_and_the_last_one_wins() {
        let node = parse_document(
            "<udev>\nP: /devices/first\nP: /devices/second\nE: SUBSYSTEM=acpi\n</udev>",
        )
        .unwrap();
        let mut diag = diag();
        let devices = parse_udev(&node, &mut diag).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].path, "/devices/second");
        assert_eq!(diag.warning_count(), 1);
    }

    #[test]
    fn udev_data_before_path_line_is_an_error() {
        let node =
            parse_document("<udev>\nE: SUBSYSTEM=acpi\nP: /devices/LNXSYSTM:00\n</udev>")
                .unwrap();
        assert!(parse_udev(&node, &mut diag()).is_err());
    }

    #[test]
    fn udev_property_without_equals_is_an_error() {
        let node = parse_document("<udev>\nP: /devices/x\nE: JUNK\n</udev>").unwrap();
        assert!(parse_udev(&node, &mut diag()).is_err());
    }

    #[test]
    fn parses_dmi_table() {
        let node = parse_document(
            "<dmi>\n/sys/class/dmi/id/sys_vendor:FooCorp\n\
             /sys/class/dmi/id/product_name:Baz 9000\n</dmi>",
        )
        .unwrap();
        let dmi = parse_dmi(&node).unwrap();
        assert_eq!(dmi["/sys/class/dmi/id/sys_vendor"], "FooCorp");
        assert_eq!(dmi["/sys/class/dmi/id/product_name"], "Baz 9000");
    }

    #[test]
    fn parses_sysfs_blocks() {
        let node = parse_document(
            "<sysfs-attributes>\nP: /devices/scsi/0:0:0:0\nA: vendor=ATA\n\
             A: model=Hitachi HTS54161\nA: type=0\n</sysfs-attributes>",
        )
        .unwrap();
        let sysfs = parse_sysfs(&node).unwrap();
        let attrs = &sysfs["/devices/scsi/0:0:0:0"];
        assert_eq!(attrs["vendor"], "ATA");
        assert_eq!(attrs["type"], "0");
    }

    #[test]
    fn sysfs_attribute_before_path_is_an_error() {
        let node =
            parse_document("<sysfs-attributes>\nA: vendor=ATA\n</sysfs-attributes>").unwrap();
        assert!(parse_sysfs(&node).is_err());
    }

    #[test]
    fn parses_processors_and_aliases() {
        let node = parse_document(
            r#"<processors>
                 <processor id="100" name="0">
                   <property name="wp" type="bool">True</property>
                 </processor>
               </processors>"#,
        )
        .unwrap();
        let processors = parse_processors(&node).unwrap();
        assert_eq!(processors.len(), 1);
        assert_eq!(processors[0].id, 100);

        let node = parse_document(
            r#"<aliases>
                 <alias target="2"><vendor>FooCorp</vendor><model>Baz</model></alias>
               </aliases>"#,
        )
        .unwrap();
        let aliases = parse_aliases(&node).unwrap();
        assert_eq!(aliases[0].target, 2);
        assert_eq!(aliases[0].vendor, "FooCorp");
    }
}
