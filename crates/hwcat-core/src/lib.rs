//! hwcat Core - Submission parsing, validation and device classification
//!
//! This crate implements the processing pipeline for hardware
//! inventory submissions:
//! - Decompression, text repair and structural validation of raw
//!   submission documents
//! - Section parsers for the summary, hardware, software and question
//!   data, covering both the hierarchical and the flat path-keyed
//!   device representation
//! - Cross-section consistency checks
//! - The device tree with bus translation and real-device
//!   classification
//! - Catalog record emission through pluggable storage ports

pub mod catalog;
pub mod consistency;
pub mod device;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod parser;
pub mod schema;
pub mod submission;
pub mod tree;
pub mod value;
pub mod xml;

#[cfg(test)]
pub mod test_fixtures;

pub use catalog::{Catalog, MemoryCatalog};
pub use device::{Device, HwBus, IdValue};
pub use diagnostics::Diagnostics;
pub use error::SubmissionError;
pub use parser::ParsedSubmission;
pub use submission::SubmissionProcessor;
pub use tree::DeviceTree;
