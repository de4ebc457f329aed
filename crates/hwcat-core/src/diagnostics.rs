//! Submission-scoped diagnostics.
//!
//! Hard errors are attributed to the submission key; warnings go
//! through a per-submission de-duplication set so a category is
//! logged at most once per submission, however often it occurs.
//! A fresh `Diagnostics` is created for every submission.

use std::collections::HashSet;
use tracing::{error, warn};

/// Warning categories that are de-duplicated per submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarnCategory {
    /// Neither the root device nor the summary declared a kernel version.
    MissingKernelVersion,
    /// The declared kernel version has no matching kernel package.
    KernelPackageMismatch,
    /// The submission carries an unprocessed `<context>` section.
    UnprocessedContext,
}

#[derive(Debug)]
pub struct Diagnostics {
    submission_key: String,
    record_warnings: bool,
    logged_categories: HashSet<WarnCategory>,
    warning_count: usize,
}

impl Diagnostics {
    pub fn new(submission_key: &str, record_warnings: bool) -> Self {
        Self {
            submission_key: submission_key.to_string(),
            record_warnings,
            logged_categories: HashSet::new(),
            warning_count: 0,
        }
    }

    pub fn submission_key(&self) -> &str {
        &self.submission_key
    }

    /// Log a hard error for this submission.
    pub fn error(&self, message: &str) {
        error!(submission = %self.submission_key, "{message}");
    }

    /// Log a hard error that is known-benign for incident tracking
    /// (e.g. schema validation failures of junk uploads).
    pub fn error_no_incident(&self, message: &str) {
        error!(submission = %self.submission_key, incident = false, "{message}");
    }

    /// Log a warning unconditionally.
    pub fn warn(&mut self, message: &str) {
        if !self.record_warnings {
            return;
        }
        self.warning_count += 1;
        warn!(submission = %self.submission_key, "{message}");
    }

    /// Log a warning at most once per category per submission.
    pub fn warn_once(&mut self, category: WarnCategory, message: &str) {
        if !self.record_warnings {
            return;
        }
        if self.logged_categories.insert(category) {
            self.warning_count += 1;
            warn!(submission = %self.submission_key, "{message}");
        }
    }

    /// Number of warnings actually emitted for this submission.
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }
}
