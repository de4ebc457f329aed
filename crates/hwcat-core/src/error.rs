//! Error taxonomy for submission processing.
//!
//! Three failure classes abort a submission: input that is not
//! well-formed or fails the schema, input that parses but violates a
//! consistency rule, and values reaching branches the schema should
//! have made unreachable. Degraded-but-acceptable input (missing
//! optional fields) is handled with warnings, not errors.

use thiserror::Error;

use crate::xml::XmlError;

#[derive(Error, Debug)]
pub enum SubmissionError {
    /// Not well-formed, unsupported version, or schema violation.
    #[error("malformed submission: {0}")]
    Malformed(String),
    /// Passed the schema but failed a consistency rule; the message
    /// names the offending ids.
    #[error("inconsistent submission: {0}")]
    Inconsistent(String),
    /// A value reached a branch the schema validation should have made
    /// unreachable.
    #[error("internal defect: {0}")]
    Internal(String),
}

impl From<XmlError> for SubmissionError {
    fn from(err: XmlError) -> Self {
        SubmissionError::Malformed(err.to_string())
    }
}
