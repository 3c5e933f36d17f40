use crate::jobs::RunStatus;
use crate::model::settings::ImportSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents one execution of the CSV-to-products pipeline, from upload to
/// completion or failure.
///
/// The record is created by the upload handler, its counters are advanced by
/// the CSV reader (total, skipped) and the background worker (processed,
/// errors), and it is read by the status endpoint until it expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    /// Unique identifier for this run (UUID).
    pub run_id: String,
    /// Current run-level state.
    pub status: RunStatus,
    /// Last terminal message, e.g. the reason a run failed.
    pub message: Option<String>,
    /// Stored location of the uploaded CSV.
    pub file_path: String,
    /// MD5 of the uploaded bytes, kept for audit.
    pub file_md5: Option<String>,
    /// Rows counted so far (fully empty rows are never counted).
    pub total_rows: u64,
    /// Rows written to the catalog successfully.
    pub processed_rows: u64,
    /// Rows rejected before queueing (malformed or missing mandatory fields).
    pub skipped_rows: u64,
    /// Queued rows whose processing failed.
    pub error_rows: u64,
    /// Error-level lines of the run log, oldest first.
    pub errors: Vec<String>,
    /// Set once the reader has flushed its final batch; the run can only
    /// complete after this.
    pub dispatch_complete: bool,
    /// Settings captured when the run started.
    pub settings: ImportSettings,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// After this instant the run is treated as unknown.
    pub expires_at: DateTime<Utc>,
}
