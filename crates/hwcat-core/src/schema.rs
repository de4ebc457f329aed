//! Versioned structural validation of submission documents.
//!
//! A submission declares its format version on the root element; each
//! supported version maps to a compiled [`Schema`]. Unknown versions
//! are a hard failure before any parsing. Two idempotent repairs for
//! known producer-tool defects are applied to the raw text first:
//! comment nodes are blanked (some producers leak control characters
//! into them), and udev/DMI transcripts that a broken producer stored
//! under a generic `<context>` capture node are moved back into their
//! expected position under `<hardware>`.

use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::error::SubmissionError;
use crate::value::is_known_type_tag;
use crate::xml::Element;

const SUMMARY_BOOL_TAGS: &[&str] = &["live_cd", "private", "contactable"];
const SUMMARY_VALUE_TAGS: &[&str] = &[
    "live_cd", "system_id", "distribution", "distroseries", "architecture",
    "private", "contactable", "date_created", "kernel-release",
];
const SUMMARY_REQUIRED_TAGS: &[&str] = &[
    "live_cd", "system_id", "distribution", "distroseries", "architecture",
    "private", "contactable", "date_created", "client",
];
const HARDWARE_TAGS: &[&str] =
    &["hal", "udev", "dmi", "sysfs-attributes", "processors", "aliases"];
const SOFTWARE_TAGS: &[&str] = &["lsbrelease", "packages", "xorg"];
const QUESTION_CHILD_TAGS: &[&str] =
    &["answer", "answer_choices", "target", "command", "comment"];
const ANSWER_TYPES: &[&str] = &["multiple_choice", "measurement"];

/// Text repairs for frequent producer defects. Both substitutions are
/// idempotent: applying them twice equals applying them once.
struct Repairs {
    comment: Regex,
    udev_exists: Regex,
    udev_capture: Regex,
    dmi_exists: Regex,
    dmi_capture: Regex,
}

impl Repairs {
    fn new() -> Self {
        // The patterns are fixed literals; compilation cannot fail.
        Self {
            comment: Regex::new(r"(?s)<comment>.*?</comment>").unwrap(),
            udev_exists: Regex::new(r"(?s)<hardware>.*?<udev>.*?</hardware>").unwrap(),
            udev_capture: Regex::new(
                r#"(?s)<info command="udevadm info --export-db">(.*?)</info>"#,
            )
            .unwrap(),
            dmi_exists: Regex::new(r"(?s)<hardware>.*?<dmi>.*?</hardware>").unwrap(),
            dmi_capture: Regex::new(
                r#"(?s)<info command="grep -r \. /sys/class/dmi/id/ 2&gt;/dev/null">(.*?)</info>"#,
            )
            .unwrap(),
        }
    }

    fn apply(&self, submission: &str) -> String {
        let mut text = self.comment.replace_all(submission, "<comment/>").into_owned();

        if !self.udev_exists.is_match(&text) {
            if let Some(caps) = self.udev_capture.captures(&text) {
                let moved = format!("<udev>{}</udev>\n</hardware>", &caps[1]);
                text = text.replacen("</hardware>", &moved, 1);
            }
        }
        if !self.dmi_exists.is_match(&text) {
            if let Some(caps) = self.dmi_capture.captures(&text) {
                let moved = format!("<dmi>{}</dmi>\n</hardware>", &caps[1]);
                text = text.replacen("</hardware>", &moved, 1);
            }
        }
        text
    }
}

/// Compiled structural schema for one submission format version.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    version: &'static str,
}

/// Validates raw submission text against the schema selected by the
/// root element's declared version.
pub struct SchemaValidator {
    schemas: HashMap<&'static str, Schema>,
    repairs: Repairs,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert("1.0", Schema { version: "1.0" });
        Self {
            schemas,
            repairs: Repairs::new(),
        }
    }

    /// Apply the known compatibility repairs to raw submission text.
    pub fn repair(&self, submission: &str) -> String {
        self.repairs.apply(submission)
    }

    /// Validate a parsed document; returns the schema that accepted it.
    pub fn validate(&self, root: &Element) -> Result<Schema, SubmissionError> {
        if root.name != "system" {
            return Err(SubmissionError::Malformed(
                "root node is not <system>".into(),
            ));
        }
        let version = root.attr("version").ok_or_else(|| {
            SubmissionError::Malformed("missing submission format version".into())
        })?;
        let schema = self.schemas.get(version).ok_or_else(|| {
            SubmissionError::Malformed(format!(
                "invalid submission format version: {version:?}"
            ))
        })?;
        schema.check(root)?;
        Ok(*schema)
    }
}

impl Schema {
    pub fn version(&self) -> &'static str {
        self.version
    }

    fn check(&self, root: &Element) -> Result<(), SubmissionError> {
        let mut seen = HashSet::new();
        for section in &root.children {
            match section.name.as_str() {
                "summary" => check_summary(section)?,
                "hardware" => check_hardware(section)?,
                "software" => check_software(section)?,
                "questions" => check_questions(section)?,
                "context" => {}
                other => return Err(malformed(format!("unexpected section <{other}>"))),
            }
            if section.name != "context" && !seen.insert(section.name.clone()) {
                return Err(malformed(format!(
                    "section <{}> appears more than once",
                    section.name
                )));
            }
        }
        for required in ["summary", "hardware", "software", "questions"] {
            if !seen.contains(required) {
                return Err(malformed(format!("missing section <{required}>")));
            }
        }
        Ok(())
    }
}

fn malformed(message: String) -> SubmissionError {
    SubmissionError::Malformed(message)
}

fn require_attr<'a>(node: &'a Element, name: &str) -> Result<&'a str, SubmissionError> {
    node.attr(name).ok_or_else(|| {
        malformed(format!("<{}> without {name} attribute", node.name))
    })
}

fn require_int_attr(node: &Element, name: &str) -> Result<(), SubmissionError> {
    let value = require_attr(node, name)?;
    value.trim().parse::<i64>().map(|_| ()).map_err(|_| {
        malformed(format!(
            "<{}> attribute {name} is not an integer: {value:?}",
            node.name
        ))
    })
}

/// Validate a typed `<property>`/`<value>` node recursively, so that
/// the later decoding step can treat bad type tags as internal defects.
fn check_typed_node(node: &Element, needs_name: bool) -> Result<(), SubmissionError> {
    if needs_name {
        require_attr(node, "name")?;
    }
    let type_tag = require_attr(node, "type")?;
    if !is_known_type_tag(type_tag) {
        return Err(malformed(format!(
            "<{}> with unknown type {type_tag:?}",
            node.name
        )));
    }
    match type_tag {
        "dbus.Boolean" | "bool" => {
            let text = node.trimmed_text();
            if text != "True" && text != "False" {
                return Err(malformed(format!("invalid boolean text {text:?}")));
            }
        }
        "dbus.Array" | "list" => {
            for child in &node.children {
                check_typed_node(child, false)?;
            }
        }
        "dbus.Dictionary" | "dict" => {
            for child in &node.children {
                check_typed_node(child, true)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_property_children(node: &Element) -> Result<(), SubmissionError> {
    for child in &node.children {
        if child.name != "property" {
            return Err(malformed(format!(
                "<{}> node found in <{}>, expected <property>",
                child.name, node.name
            )));
        }
        check_typed_node(child, true)?;
    }
    Ok(())
}

fn check_summary(summary: &Element) -> Result<(), SubmissionError> {
    let mut seen = HashSet::new();
    for node in &summary.children {
        let tag = node.name.as_str();
        if tag == "client" {
            require_attr(node, "name")?;
            require_attr(node, "version")?;
            for plugin in &node.children {
                if plugin.name != "plugin" {
                    return Err(malformed(format!(
                        "<{}> node found in <client>",
                        plugin.name
                    )));
                }
                require_attr(plugin, "name")?;
                require_attr(plugin, "version")?;
            }
        } else if SUMMARY_VALUE_TAGS.contains(&tag) {
            let value = require_attr(node, "value")?;
            if SUMMARY_BOOL_TAGS.contains(&tag) && value != "True" && value != "False" {
                return Err(malformed(format!(
                    "<{tag}> with non-boolean value {value:?}"
                )));
            }
        } else {
            return Err(malformed(format!("unexpected summary node <{tag}>")));
        }
        if !seen.insert(tag.to_string()) {
            return Err(malformed(format!(
                "summary node <{tag}> appears more than once"
            )));
        }
    }
    for required in SUMMARY_REQUIRED_TAGS {
        if !seen.contains(*required) {
            return Err(malformed(format!("missing summary node <{required}>")));
        }
    }
    Ok(())
}

fn check_hardware(hardware: &Element) -> Result<(), SubmissionError> {
    let mut seen = HashSet::new();
    for node in &hardware.children {
        let tag = node.name.as_str();
        if !HARDWARE_TAGS.contains(&tag) {
            return Err(malformed(format!("unexpected hardware node <{tag}>")));
        }
        if !seen.insert(tag.to_string()) {
            return Err(malformed(format!(
                "hardware node <{tag}> appears more than once"
            )));
        }
        match tag {
            "hal" => {
                require_attr(node, "version")?;
                for device in &node.children {
                    if device.name != "device" {
                        return Err(malformed(format!(
                            "<{}> node found in <hal>",
                            device.name
                        )));
                    }
                    require_int_attr(device, "id")?;
                    require_attr(device, "udi")?;
                    if device.attr("parent").is_some() {
                        require_int_attr(device, "parent")?;
                    }
                    check_property_children(device)?;
                }
            }
            "processors" => {
                for processor in &node.children {
                    if processor.name != "processor" {
                        return Err(malformed(format!(
                            "<{}> node found in <processors>",
                            processor.name
                        )));
                    }
                    require_int_attr(processor, "id")?;
                    require_attr(processor, "name")?;
                    check_property_children(processor)?;
                }
            }
            "aliases" => {
                for alias in &node.children {
                    if alias.name != "alias" {
                        return Err(malformed(format!(
                            "<{}> node found in <aliases>",
                            alias.name
                        )));
                    }
                    require_int_attr(alias, "target")?;
                    for sub in &alias.children {
                        if sub.name != "vendor" && sub.name != "model" {
                            return Err(malformed(format!(
                                "<{}> node found in <alias>",
                                sub.name
                            )));
                        }
                    }
                }
            }
            // Line-oriented transcripts; their content is checked by the
            // dedicated sub-parsers.
            "udev" | "dmi" | "sysfs-attributes" => {}
            _ => unreachable!(),
        }
    }
    if !seen.contains("processors") {
        return Err(malformed("missing hardware node <processors>".into()));
    }
    if !seen.contains("hal") && !seen.contains("udev") {
        return Err(malformed(
            "hardware section carries neither a device tree nor a flat export".into(),
        ));
    }
    if seen.contains("udev") && !seen.contains("hal") && !seen.contains("dmi") {
        return Err(malformed(
            "flat-export hardware section without a <dmi> node".into(),
        ));
    }
    Ok(())
}

fn check_software(software: &Element) -> Result<(), SubmissionError> {
    let mut seen = HashSet::new();
    for node in &software.children {
        let tag = node.name.as_str();
        if !SOFTWARE_TAGS.contains(&tag) {
            return Err(malformed(format!("unexpected software node <{tag}>")));
        }
        if !seen.insert(tag.to_string()) {
            return Err(malformed(format!(
                "software node <{tag}> appears more than once"
            )));
        }
        match tag {
            "lsbrelease" => check_property_children(node)?,
            "packages" => {
                for package in &node.children {
                    if package.name != "package" {
                        return Err(malformed(format!(
                            "<{}> node found in <packages>",
                            package.name
                        )));
                    }
                    require_attr(package, "name")?;
                    require_int_attr(package, "id")?;
                    check_property_children(package)?;
                }
            }
            "xorg" => {
                require_attr(node, "version")?;
                for driver in &node.children {
                    if driver.name != "driver" {
                        return Err(malformed(format!(
                            "<{}> node found in <xorg>",
                            driver.name
                        )));
                    }
                    require_attr(driver, "name")?;
                    if driver.attr("device").is_some() {
                        require_int_attr(driver, "device")?;
                    }
                }
            }
            _ => unreachable!(),
        }
    }
    if !seen.contains("lsbrelease") {
        return Err(malformed("missing software node <lsbrelease>".into()));
    }
    Ok(())
}

fn check_questions(questions: &Element) -> Result<(), SubmissionError> {
    for question in &questions.children {
        if question.name != "question" {
            return Err(malformed(format!(
                "<{}> node found in <questions>",
                question.name
            )));
        }
        require_attr(question, "name")?;
        for sub in &question.children {
            let tag = sub.name.as_str();
            if !QUESTION_CHILD_TAGS.contains(&tag) {
                return Err(malformed(format!(
                    "unexpected node <{tag}> in <question>"
                )));
            }
            match tag {
                "answer" => {
                    let answer_type = require_attr(sub, "type")?;
                    if !ANSWER_TYPES.contains(&answer_type) {
                        return Err(malformed(format!(
                            "unexpected answer type {answer_type:?}"
                        )));
                    }
                }
                "answer_choices" => {
                    for value in &sub.children {
                        check_typed_node(value, false)?;
                    }
                }
                "target" => require_int_attr(sub, "id")?,
                _ => {}
            }
        }
    }
    Ok(())
}
