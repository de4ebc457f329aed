//! The processing facade: expand, repair, parse, validate, check and
//! emit one raw submission.

use std::io::Read;

use flate2::read::GzDecoder;
use tracing::info;

use crate::catalog::Catalog;
use crate::consistency::check_consistency;
use crate::diagnostics::Diagnostics;
use crate::emit::{kernel_package_name, RecordEmitter};
use crate::error::SubmissionError;
use crate::parser::{parse_sections, ParsedSubmission};
use crate::schema::SchemaValidator;
use crate::tree::DeviceTree;
use crate::xml::parse_document;

/// Processes raw submissions end to end. One processor can handle any
/// number of submissions; per-submission state lives in the
/// [`Diagnostics`] handed through the pipeline.
pub struct SubmissionProcessor {
    validator: SchemaValidator,
    record_warnings: bool,
}

impl Default for SubmissionProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionProcessor {
    pub fn new() -> Self {
        Self {
            validator: SchemaValidator::new(),
            record_warnings: true,
        }
    }

    /// Drop per-submission warning messages after logging them.
    /// Reprocessing runs over large backlogs use this to keep memory
    /// flat.
    pub fn without_recorded_warnings(mut self) -> Self {
        self.record_warnings = false;
        self
    }

    /// Decompress, repair, parse and validate raw submission data.
    pub fn parse(
        &self,
        raw: &[u8],
        diag: &mut Diagnostics,
    ) -> Result<ParsedSubmission, SubmissionError> {
        let text = expand(raw)?;
        let repaired = self.validator.repair(&text);
        let root = parse_document(&repaired)?;
        self.validator.validate(&root)?;
        parse_sections(&root, diag)
    }

    /// Run the full pipeline for one submission and write catalog
    /// records. Returns true when the submission was stored.
    pub fn process<C: Catalog>(
        &self,
        raw: &[u8],
        submission_key: &str,
        catalog: &mut C,
    ) -> bool {
        let mut diag = Diagnostics::new(submission_key, self.record_warnings);

        let mut parsed = match self.parse(raw, &mut diag) {
            Ok(parsed) => parsed,
            Err(error) => {
                report(&mut diag, &error);
                return false;
            }
        };
        if let Err(error) = check_consistency(&mut parsed, &mut diag) {
            report(&mut diag, &error);
            return false;
        }
        let tree = match DeviceTree::build(&parsed.hardware) {
            Ok(tree) => tree,
            Err(error) => {
                report(&mut diag, &error);
                return false;
            }
        };
        let kernel_package = kernel_package_name(
            &tree,
            &parsed.summary,
            &parsed.software.packages,
            &mut diag,
        );
        RecordEmitter::new(&tree, catalog, kernel_package).emit(&mut diag);
        info!(
            submission_key,
            devices = tree.len(),
            warnings = diag.warning_count(),
            "submission processed"
        );
        true
    }
}

/// Submissions are usually gzip-compressed, but this is not enforced
/// on upload. Data that does not decompress is taken literally.
fn expand(raw: &[u8]) -> Result<String, SubmissionError> {
    let mut expanded = Vec::new();
    if GzDecoder::new(raw).read_to_end(&mut expanded).is_err() {
        expanded = raw.to_vec();
    }
    String::from_utf8(expanded).map_err(|_| {
        SubmissionError::Malformed("submission data is not valid UTF-8".into())
    })
}

/// Bad submission data is expected and logged without an incident;
/// internal defects raise one.
fn report(diag: &mut Diagnostics, error: &SubmissionError) {
    match error {
        SubmissionError::Internal(_) => diag.error(&error.to_string()),
        _ => diag.error_no_incident(&error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::device::HwBus;
    use crate::test_fixtures::{FULL_HAL_SUBMISSION, MINIMAL_HAL_SUBMISSION};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn expands_compressed_and_literal_data() {
        assert_eq!(expand(b"plain <xml/>").unwrap(), "plain <xml/>");
        assert_eq!(expand(&gzip("compressed <xml/>")).unwrap(), "compressed <xml/>");
        assert!(expand(&[0xff, 0xfe, 0x00, 0x80]).is_err());
    }

    #[test]
    fn processes_a_minimal_submission() {
        let processor = SubmissionProcessor::new();
        let mut catalog = MemoryCatalog::new();
        assert!(processor.process(
            MINIMAL_HAL_SUBMISSION.as_bytes(),
            "minimal",
            &mut catalog
        ));
        // The root system device is always recorded.
        assert_eq!(catalog.devices.len(), 1);
        assert_eq!(catalog.devices[0].bus, HwBus::System);
        assert_eq!(catalog.devices[0].vendor_id, "FooCorp");
    }

    #[test]
    fn processes_a_compressed_submission() {
        let processor = SubmissionProcessor::new();
        let mut catalog = MemoryCatalog::new();
        assert!(processor.process(&gzip(FULL_HAL_SUBMISSION), "compressed", &mut catalog));
        assert!(!catalog.devices.is_empty());
    }

    #[test]
    fn full_submission_emits_the_device_chain() {
        let processor = SubmissionProcessor::new();
        let mut catalog = MemoryCatalog::new();
        assert!(processor.process(
            FULL_HAL_SUBMISSION.as_bytes(),
            "full",
            &mut catalog
        ));

        let buses: Vec<HwBus> = catalog.devices.iter().map(|d| d.bus).collect();
        assert_eq!(buses, vec![HwBus::System, HwBus::Pci, HwBus::Sata]);
        assert_eq!(catalog.devices[1].vendor_id, "0x8086");
        assert_eq!(catalog.devices[1].product_id, "0x27c5");
        // Drivers are tied to the kernel package from the package list.
        assert!(catalog
            .drivers
            .iter()
            .all(|d| d.package_name.as_deref()
                == Some("linux-image-2.6.28-11-generic")));
    }

    #[test]
    fn rejects_garbage_without_panicking() {
        let processor = SubmissionProcessor::new();
        let mut catalog = MemoryCatalog::new();
        assert!(!processor.process(b"<not a submission>", "garbage", &mut catalog));
        assert!(!processor.process(b"", "empty", &mut catalog));
        assert!(catalog.devices.is_empty());
    }

    #[test]
    fn rejects_inconsistent_submission() {
        let processor = SubmissionProcessor::new();
        let mut catalog = MemoryCatalog::new();
        // A question target referencing a nonexistent id.
        let text = MINIMAL_HAL_SUBMISSION.replace(
            "<questions>",
            r#"<questions><question name="q"><target id="999"/></question>"#,
        );
        assert!(!processor.process(text.as_bytes(), "dangling-target", &mut catalog));
        assert!(catalog.devices.is_empty());
    }
}
