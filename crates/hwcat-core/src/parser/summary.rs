//! The `<summary>` section: client identity, distribution facts and
//! the submission timestamp.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SubmissionError;
use crate::value::parse_timestamp;
use crate::xml::Element;

#[derive(Debug, Clone, Serialize)]
pub struct ClientPlugin {
    pub name: String,
    pub version: String,
}

/// The client program that produced the submission.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
    pub plugins: Vec<ClientPlugin>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub live_cd: bool,
    pub system_id: String,
    pub distribution: String,
    pub distroseries: String,
    pub architecture: String,
    pub private: bool,
    pub contactable: bool,
    pub date_created: DateTime<Utc>,
    pub client: ClientInfo,
    /// Optional; newer producers declare the running kernel here.
    pub kernel_release: Option<String>,
}

fn value_attr<'a>(node: &'a Element) -> Result<&'a str, SubmissionError> {
    node.attr("value").ok_or_else(|| {
        SubmissionError::Internal(format!("<{}> without value attribute", node.name))
    })
}

fn bool_attr(node: &Element) -> Result<bool, SubmissionError> {
    // The schema restricts the attribute to True/False.
    match value_attr(node)? {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(SubmissionError::Internal(format!(
            "boolean value expected in <{}>, got {other:?}",
            node.name
        ))),
    }
}

fn parse_client(node: &Element) -> Result<ClientInfo, SubmissionError> {
    let name = node
        .attr("name")
        .ok_or_else(|| SubmissionError::Internal("<client> without name".into()))?;
    let version = node
        .attr("version")
        .ok_or_else(|| SubmissionError::Internal("<client> without version".into()))?;
    let mut plugins = Vec::new();
    for plugin in &node.children {
        plugins.push(ClientPlugin {
            name: plugin
                .attr("name")
                .ok_or_else(|| SubmissionError::Internal("<plugin> without name".into()))?
                .to_string(),
            version: plugin
                .attr("version")
                .ok_or_else(|| {
                    SubmissionError::Internal("<plugin> without version".into())
                })?
                .to_string(),
        });
    }
    Ok(ClientInfo {
        name: name.to_string(),
        version: version.to_string(),
        plugins,
    })
}

pub fn parse_summary(summary: &Element) -> Result<Summary, SubmissionError> {
    let mut live_cd = None;
    let mut system_id = None;
    let mut distribution = None;
    let mut distroseries = None;
    let mut architecture = None;
    let mut private = None;
    let mut contactable = None;
    let mut date_created = None;
    let mut client = None;
    let mut kernel_release = None;

    for node in &summary.children {
        match node.name.as_str() {
            "live_cd" => live_cd = Some(bool_attr(node)?),
            "system_id" => system_id = Some(value_attr(node)?.to_string()),
            "distribution" => distribution = Some(value_attr(node)?.to_string()),
            "distroseries" => distroseries = Some(value_attr(node)?.to_string()),
            "architecture" => architecture = Some(value_attr(node)?.to_string()),
            "private" => private = Some(bool_attr(node)?),
            "contactable" => contactable = Some(bool_attr(node)?),
            "date_created" => date_created = Some(parse_timestamp(value_attr(node)?)?),
            "client" => client = Some(parse_client(node)?),
            "kernel-release" => kernel_release = Some(value_attr(node)?.to_string()),
            other => {
                return Err(SubmissionError::Internal(format!(
                    "unexpected summary node <{other}>"
                )))
            }
        }
    }

    // The schema guarantees the required nodes.
    let missing = || SubmissionError::Internal("summary node missing after validation".into());
    Ok(Summary {
        live_cd: live_cd.ok_or_else(missing)?,
        system_id: system_id.ok_or_else(missing)?,
        distribution: distribution.ok_or_else(missing)?,
        distroseries: distroseries.ok_or_else(missing)?,
        architecture: architecture.ok_or_else(missing)?,
        private: private.ok_or_else(missing)?,
        contactable: contactable.ok_or_else(missing)?,
        date_created: date_created.ok_or_else(missing)?,
        client: client.ok_or_else(missing)?,
        kernel_release,
    })
}
