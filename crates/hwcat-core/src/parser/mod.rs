//! Section parsers for validated submission documents.
//!
//! All four sections must parse for the submission to proceed; a
//! failure in any of them aborts the submission with no partial
//! result. An optional `<context>` section is accepted and warned
//! about, but not parsed.

pub mod hardware;
pub mod questions;
pub mod software;
pub mod summary;

use serde::Serialize;

use crate::diagnostics::{Diagnostics, WarnCategory};
use crate::error::SubmissionError;
use crate::xml::Element;

pub use hardware::{
    Alias, HalData, HalDeviceData, Hardware, Processor, SysfsAttributes,
    UdevDeviceData,
};
pub use questions::{Answer, Question, QuestionTarget};
pub use software::{Package, Software, Xorg, XorgDriver};
pub use summary::{ClientInfo, ClientPlugin, Summary};

/// The fully parsed content of one submission. Created and discarded
/// within a single parse call.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedSubmission {
    pub summary: Summary,
    pub hardware: Hardware,
    pub software: Software,
    pub questions: Vec<Question>,
}

/// Parse the four main sections of a validated document.
pub fn parse_sections(
    root: &Element,
    diag: &mut Diagnostics,
) -> Result<ParsedSubmission, SubmissionError> {
    let mut summary = None;
    let mut hardware = None;
    let mut software = None;
    let mut questions = None;

    for section in &root.children {
        match section.name.as_str() {
            "summary" => summary = Some(summary::parse_summary(section)?),
            "hardware" => hardware = Some(hardware::parse_hardware(section, diag)?),
            "software" => software = Some(software::parse_software(section)?),
            "questions" => questions = Some(questions::parse_questions(section)?),
            "context" => {
                diag.warn_once(
                    WarnCategory::UnprocessedContext,
                    "submission contains unprocessed <context> data",
                );
            }
            other => {
                // The schema restricts the section set.
                return Err(SubmissionError::Internal(format!(
                    "unexpected section <{other}>"
                )));
            }
        }
    }

    // The schema guarantees all four sections are present.
    match (summary, hardware, software, questions) {
        (Some(summary), Some(hardware), Some(software), Some(questions)) => {
            Ok(ParsedSubmission {
                summary,
                hardware,
                software,
                questions,
            })
        }
        _ => Err(SubmissionError::Internal(
            "validated document is missing a main section".into(),
        )),
    }
}

/// Parse the `<property>` children of a node into a name-keyed map.
/// A property name repeated within one node is a hard error.
pub(crate) fn parse_properties(
    node: &Element,
) -> Result<std::collections::HashMap<String, crate::value::PropertyValue>, SubmissionError> {
    let mut properties = std::collections::HashMap::new();
    for child in &node.children {
        if child.name != "property" {
            return Err(SubmissionError::Internal(format!(
                "found <{}> node in <{}>, expected <property>",
                child.name, node.name
            )));
        }
        let name = child.attr("name").ok_or_else(|| {
            SubmissionError::Internal("<property> without name attribute".into())
        })?;
        let value = crate::value::decode_typed(child)?;
        if properties.insert(name.to_string(), value).is_some() {
            return Err(SubmissionError::Malformed(format!(
                "<property name=\"{name}\"> found more than once in <{}>",
                node.name
            )));
        }
    }
    Ok(properties)
}
