//! Results of lifecycle sweeps.
//!
//! Per-object failures are recorded here rather than returned as errors:
//! each outcome carries a failure count and the messages behind it.

use serde::Serialize;

use crate::lifecycle::DuplicatePair;

/// Result of `archive_old_data`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveOutcome {
    /// Objects written into the bundle.
    pub archived: usize,

    /// Archived objects removed from the hot tier.
    pub deleted: usize,

    /// Objects left out of the bundle because they could not be read.
    pub download_failures: usize,

    /// Archived objects that could not be removed from the hot tier.
    pub delete_failures: usize,

    /// Store path of the uploaded bundle, `None` if nothing was archived.
    pub archive_path: Option<String>,

    pub archive_size_bytes: u64,

    /// Paths packed into the bundle.
    pub contained_paths: Vec<String>,

    /// Shutdown was requested while deleting archived objects.
    pub interrupted: bool,

    pub errors: Vec<String>,
}

impl ArchiveOutcome {
    pub fn record_download_failure(&mut self, error: String) {
        self.download_failures += 1;
        self.errors.push(error);
    }

    pub fn record_delete_failure(&mut self, error: String) {
        self.delete_failures += 1;
        self.errors.push(error);
    }

    pub fn failure_count(&self) -> usize {
        self.download_failures + self.delete_failures
    }

    pub fn has_errors(&self) -> bool {
        self.failure_count() > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Archived: {}, Deleted: {}, Download failures: {}, Delete failures: {}, Bundle: {} ({} bytes)",
            self.archived,
            self.deleted,
            self.download_failures,
            self.delete_failures,
            self.archive_path.as_deref().unwrap_or("-"),
            self.archive_size_bytes
        )
    }
}

/// Result of `delete_old_data`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteOutcome {
    pub deleted: usize,

    /// Bytes freed by the deleted objects.
    pub total_size_bytes: u64,

    pub failed: usize,
    pub interrupted: bool,
    pub errors: Vec<String>,
}

impl DeleteOutcome {
    pub fn record_deletion(&mut self, size_bytes: u64) {
        self.deleted += 1;
        self.total_size_bytes += size_bytes;
    }

    pub fn record_error(&mut self, error: String) {
        self.failed += 1;
        self.errors.push(error);
    }

    pub fn summary(&self) -> String {
        format!(
            "Deleted: {}, Freed: {} bytes, Failed: {}",
            self.deleted, self.total_size_bytes, self.failed
        )
    }
}

/// Result of a duplicate scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateScan {
    pub pairs: Vec<DuplicatePair>,

    /// Records read and digested.
    pub scanned: usize,

    /// Records that could not be read or parsed.
    pub skipped: usize,
}

/// Result of `remove_duplicates`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupOutcome {
    pub removed: usize,
    pub failed: usize,
    pub pairs: Vec<DuplicatePair>,
    pub interrupted: bool,
    pub errors: Vec<String>,
}

impl DedupOutcome {
    pub fn record_error(&mut self, error: String) {
        self.failed += 1;
        self.errors.push(error);
    }

    pub fn summary(&self) -> String {
        format!(
            "Duplicates: {}, Removed: {}, Failed: {}",
            self.pairs.len(),
            self.removed,
            self.failed
        )
    }
}

/// Result of `export_all_data`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportOutcome {
    pub export_path: String,
    pub export_size_bytes: u64,
    pub included_count: usize,
    pub skipped_count: usize,

    /// Folders that could not be listed at all.
    pub skipped_folders: Vec<String>,

    pub errors: Vec<String>,
}

impl ExportOutcome {
    pub fn record_skip(&mut self, error: String) {
        self.skipped_count += 1;
        self.errors.push(error);
    }

    pub fn summary(&self) -> String {
        format!(
            "Exported: {}, Skipped: {}, Bundle: {} ({} bytes)",
            self.included_count, self.skipped_count, self.export_path, self.export_size_bytes
        )
    }
}
