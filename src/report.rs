//! Human-readable outcome of a sync run.

use std::fmt;

use serde::Serialize;

use crate::diff::DiffSummary;

/// A file that could not be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub new: usize,
    pub ignored: usize,
    pub replaced: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub new: Vec<String>,
    pub ignored: Vec<String>,
    pub replaced: Vec<String>,
    /// Stale paths removed from the bucket (or that would be, in a dry run).
    pub deleted: Vec<String>,
    /// Stale paths left alone because cleaning was disabled.
    pub retained: Vec<String>,
    pub failed: Vec<FileFailure>,
    pub uploaded: usize,
    pub cleanup_error: Option<String>,
    /// Set when the final manifest save failed.
    pub manifest_error: Option<String>,
    /// Set when the file source stopped with an error before its end.
    pub interrupted: Option<String>,
    pub simulated: bool,
}

impl SyncReport {
    pub(crate) fn from_summary(summary: DiffSummary, clean: bool) -> Self {
        let (deleted, retained) = if clean {
            (summary.deleted, Vec::new())
        } else {
            (Vec::new(), summary.deleted)
        };
        SyncReport {
            new: summary.new,
            ignored: summary.ignored,
            replaced: summary.replaced,
            deleted,
            retained,
            ..Default::default()
        }
    }

    pub fn counts(&self) -> ReportCounts {
        ReportCounts {
            new: self.new.len(),
            ignored: self.ignored.len(),
            replaced: self.replaced.len(),
            deleted: self.deleted.len(),
        }
    }

    /// Nothing failed and the file source ran to its end.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.cleanup_error.is_none()
            && self.manifest_error.is_none()
            && self.interrupted.is_none()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.simulated {
            writeln!(f, "(simulated run, nothing was changed)")?;
        }
        for path in &self.new {
            writeln!(f, "[newfile] {path}")?;
        }
        for path in &self.ignored {
            writeln!(f, "[ignored] {path}")?;
        }
        for path in &self.replaced {
            writeln!(f, "[replace] {path}")?;
        }
        for path in &self.deleted {
            writeln!(f, "[deleted] {path}")?;
        }
        for path in &self.retained {
            writeln!(f, "[retained] {path}")?;
        }
        for failure in &self.failed {
            writeln!(f, "[failed] {}: {}", failure.path, failure.reason)?;
        }
        if let Some(e) = &self.cleanup_error {
            writeln!(f, "[cleanup failed] {e}")?;
        }
        if let Some(e) = &self.manifest_error {
            writeln!(f, "[manifest not saved] {e}")?;
        }
        if let Some(e) = &self.interrupted {
            writeln!(f, "[interrupted] {e}")?;
        }
        let counts = self.counts();
        write!(
            f,
            "new: {}, ignored: {}, replaced: {}, deleted: {}",
            counts.new, counts.ignored, counts.replaced, counts.deleted
        )
    }
}
