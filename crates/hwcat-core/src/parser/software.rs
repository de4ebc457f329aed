//! The `<software>` section: distribution release data, the installed
//! package set and the X server configuration.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::SubmissionError;
use crate::parser::parse_properties;
use crate::value::PropertyValue;
use crate::xml::Element;

#[derive(Debug, Clone, Serialize)]
pub struct XorgDriver {
    pub name: String,
    pub version: Option<String>,
    pub class: Option<String>,
    /// Local id of the device node this driver serves.
    pub device: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Xorg {
    pub version: Option<String>,
    pub drivers: HashMap<String, XorgDriver>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Package {
    /// Local id; question targets may reference it.
    pub id: i64,
    pub properties: HashMap<String, PropertyValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Software {
    pub lsbrelease: HashMap<String, PropertyValue>,
    pub packages: HashMap<String, Package>,
    pub xorg: Option<Xorg>,
}

pub fn parse_software(software: &Element) -> Result<Software, SubmissionError> {
    let mut lsbrelease = HashMap::new();
    let mut packages = HashMap::new();
    let mut xorg = None;

    for node in &software.children {
        match node.name.as_str() {
            "lsbrelease" => lsbrelease = parse_properties(node)?,
            "packages" => packages = parse_packages(node)?,
            "xorg" => xorg = Some(parse_xorg(node)?),
            other => {
                return Err(SubmissionError::Internal(format!(
                    "unexpected software node <{other}>"
                )))
            }
        }
    }

    Ok(Software {
        lsbrelease,
        packages,
        xorg,
    })
}

fn parse_packages(
    packages: &Element,
) -> Result<HashMap<String, Package>, SubmissionError> {
    let mut result = HashMap::new();
    for package in &packages.children {
        if package.name != "package" {
            return Err(SubmissionError::Internal(format!(
                "unexpected <{}> in <packages>",
                package.name
            )));
        }
        let name = package
            .attr("name")
            .ok_or_else(|| SubmissionError::Internal("<package> without name".into()))?;
        let id = package
            .attr("id")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                SubmissionError::Internal("<package> without integer id".into())
            })?;
        let entry = Package {
            id,
            properties: parse_properties(package)?,
        };
        if result.insert(name.to_string(), entry).is_some() {
            return Err(SubmissionError::Malformed(format!(
                "duplicate package name: {name}"
            )));
        }
    }
    Ok(result)
}

fn parse_xorg(xorg: &Element) -> Result<Xorg, SubmissionError> {
    let mut drivers = HashMap::new();
    for driver in &xorg.children {
        if driver.name != "driver" {
            return Err(SubmissionError::Internal(format!(
                "unexpected <{}> in <xorg>",
                driver.name
            )));
        }
        let name = driver
            .attr("name")
            .ok_or_else(|| SubmissionError::Internal("<driver> without name".into()))?
            .to_string();
        let device = match driver.attr("device") {
            Some(value) => Some(value.trim().parse().map_err(|_| {
                SubmissionError::Internal(format!(
                    "<driver> with non-integer device attribute: {value:?}"
                ))
            })?),
            None => None,
        };
        let entry = XorgDriver {
            name: name.clone(),
            version: driver.attr("version").map(str::to_string),
            class: driver.attr("class").map(str::to_string),
            device,
        };
        if drivers.insert(name.clone(), entry).is_some() {
            return Err(SubmissionError::Malformed(format!(
                "duplicate X driver name: {name}"
            )));
        }
    }
    Ok(Xorg {
        version: xorg.attr("version").map(str::to_string),
        drivers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn parses_software_section() {
        let node = parse_document(
            r#"<software>
                 <lsbrelease>
                   <property name="distributor-id" type="str">Ubuntu</property>
                   <property name="release" type="str">9.04</property>
                 </lsbrelease>
                 <packages>
                   <package name="linux-image-2.6.28-11-generic" id="200">
                     <property name="installed_size" type="int">96530432</property>
                   </package>
                 </packages>
                 <xorg version="1.6.0">
                   <driver name="intel" version="2.6.3" class="X.Org Video Driver" device="12"/>
                 </xorg>
               </software>"#,
        )
        .unwrap();
        let software = parse_software(&node).unwrap();
        assert_eq!(
            software.lsbrelease["release"],
            PropertyValue::Str("9.04".into())
        );
        assert_eq!(software.packages["linux-image-2.6.28-11-generic"].id, 200);
        let xorg = software.xorg.unwrap();
        assert_eq!(xorg.version.as_deref(), Some("1.6.0"));
        assert_eq!(xorg.drivers["intel"].device, Some(12));
    }

    #[test]
    fn duplicate_package_name_is_rejected() {
        let node = parse_document(
            r#"<packages>
                 <package name="bash" id="1"/>
                 <package name="bash" id="2"/>
               </packages>"#,
        )
        .unwrap();
        assert!(parse_packages(&node).is_err());
    }

    #[test]
    fn duplicate_driver_name_is_rejected() {
        let node = parse_document(
            r#"<xorg><driver name="intel"/><driver name="intel"/></xorg>"#,
        )
        .unwrap();
        assert!(parse_xorg(&node).is_err());
    }
}
