//! Typed leaf value decoding for `<property>` and `<value>` nodes.
//!
//! Every leaf node carries an explicit `type` attribute naming its
//! encoding. The schema validation guarantees the tag set, so an
//! unrecognized tag here is an internal defect, not bad input.

use chrono::{DateTime, Duration, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::SubmissionError;
use crate::xml::Element;

/// Tags decoding to a boolean.
const BOOL_TYPES: &[&str] = &["dbus.Boolean", "bool"];
/// Tags decoding to a string.
const STR_TYPES: &[&str] = &["str", "dbus.String", "dbus.UTF8String"];
/// Tags decoding to an integer.
const INT_TYPES: &[&str] = &[
    "dbus.Byte", "dbus.Int16", "dbus.Int32", "dbus.Int64", "dbus.UInt16",
    "dbus.UInt32", "dbus.UInt64", "int", "long",
];
/// Tags decoding to a float.
const FLOAT_TYPES: &[&str] = &["dbus.Double", "float"];
/// Tags decoding to an ordered list of recursively decoded values.
const LIST_TYPES: &[&str] = &["dbus.Array", "list"];
/// Tags decoding to a name-keyed map of recursively decoded values.
const MAP_TYPES: &[&str] = &["dbus.Dictionary", "dict"];

/// A decoded property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<PropertyValue>),
    Map(HashMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// True if `tag` is one of the recognized leaf type tags.
pub fn is_known_type_tag(tag: &str) -> bool {
    BOOL_TYPES.contains(&tag)
        || STR_TYPES.contains(&tag)
        || INT_TYPES.contains(&tag)
        || FLOAT_TYPES.contains(&tag)
        || LIST_TYPES.contains(&tag)
        || MAP_TYPES.contains(&tag)
}

/// Decode a `<property>` or `<value>` node using its `type` attribute.
pub fn decode_typed(node: &Element) -> Result<PropertyValue, SubmissionError> {
    let type_tag = node.attr("type").ok_or_else(|| {
        SubmissionError::Internal(format!("<{}> node without type attribute", node.name))
    })?;
    let text = node.trimmed_text();

    if BOOL_TYPES.contains(&type_tag) {
        match text {
            "True" => Ok(PropertyValue::Bool(true)),
            "False" => Ok(PropertyValue::Bool(false)),
            other => Err(SubmissionError::Internal(format!(
                "invalid bool value in <{}>: {:?}",
                node.name, other
            ))),
        }
    } else if STR_TYPES.contains(&type_tag) {
        Ok(PropertyValue::Str(text.to_string()))
    } else if INT_TYPES.contains(&type_tag) {
        text.parse::<i64>()
            .map(PropertyValue::Int)
            .map_err(|_| {
                SubmissionError::Malformed(format!(
                    "invalid integer value in <{}>: {:?}",
                    node.name, text
                ))
            })
    } else if FLOAT_TYPES.contains(&type_tag) {
        text.parse::<f64>()
            .map(PropertyValue::Float)
            .map_err(|_| {
                SubmissionError::Malformed(format!(
                    "invalid float value in <{}>: {:?}",
                    node.name, text
                ))
            })
    } else if LIST_TYPES.contains(&type_tag) {
        let mut values = Vec::with_capacity(node.children.len());
        for child in &node.children {
            values.push(decode_typed(child)?);
        }
        Ok(PropertyValue::List(values))
    } else if MAP_TYPES.contains(&type_tag) {
        let mut map = HashMap::new();
        for child in &node.children {
            let name = child.attr("name").ok_or_else(|| {
                SubmissionError::Internal(format!(
                    "dictionary entry <{}> without name attribute",
                    child.name
                ))
            })?;
            map.insert(name.to_string(), decode_typed(child)?);
        }
        Ok(PropertyValue::Map(map))
    } else {
        // The schema restricts the type attribute to the tags above.
        Err(SubmissionError::Internal(format!(
            "unexpected type tag in <{}>: {:?}",
            node.name, type_tag
        )))
    }
}

/// Parse an ISO-8601-like timestamp with optional fractional seconds
/// and optional zone offset, normalized to UTC.
///
/// Producers occasionally emit leap-second values; a seconds field of
/// 60 or more is clamped to 59.999999 s rather than rejected, since
/// client clocks are not precise enough for the distinction to matter.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, SubmissionError> {
    // Fixed literal; compilation cannot fail.
    static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?x)^(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})
              T(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2})
              (?:\.(?P<fraction>\d{0,6}))?
              (?P<tz>(?:(?P<tz_sign>[-+])(?P<tz_hour>\d{2}):(?P<tz_minute>\d{2}))|Z)?$",
        )
        .unwrap()
    });

    let caps = TIMESTAMP.captures(text).ok_or_else(|| {
        SubmissionError::Malformed(format!("timestamp with unreasonable value: {text:?}"))
    })?;

    let field = |name: &str| -> u32 {
        caps.name(name)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0)
    };

    let mut second = field("second");
    let mut micros = match caps.name("fraction") {
        Some(m) => {
            let padded = format!("{:0<6}", m.as_str());
            padded.parse::<u32>().unwrap_or(0)
        }
        None => 0,
    };
    if second > 59 {
        second = 59;
        micros = 999_999;
    }

    let timestamp = Utc
        .with_ymd_and_hms(
            field("year") as i32,
            field("month"),
            field("day"),
            field("hour"),
            field("minute"),
            second,
        )
        .single()
        .ok_or_else(|| {
            SubmissionError::Malformed(format!(
                "timestamp with unreasonable value: {text:?}"
            ))
        })?
        + Duration::microseconds(micros as i64);

    // A declared offset shifts the value back onto UTC.
    match caps.name("tz_sign").map(|m| m.as_str()) {
        Some(sign) => {
            let delta = Duration::hours(field("tz_hour") as i64)
                + Duration::minutes(field("tz_minute") as i64);
            if sign == "-" {
                Ok(timestamp + delta)
            } else {
                Ok(timestamp - delta)
            }
        }
        None => Ok(timestamp),
    }
}
