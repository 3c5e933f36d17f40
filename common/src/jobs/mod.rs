use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run-level lifecycle of an import, as persisted and as reported to pollers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(RunStatus::InProgress),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Clients stop polling once this returns true.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

/// State of a single queued row while it moves through the worker.
///
/// Only `Queued` and `Processing` are ever stored; the two outcomes are
/// reflected in the run counters and the run log, after which the item is
/// removed from the queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Queued,
    Processing,
    Succeeded,
    Failed(String),
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Queued => "queued",
            ItemState::Processing => "processing",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed(_) => "failed",
        }
    }
}

/// Payload of `GET /api/imports/status/{run_id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Human readable one-liner, e.g. "Processed 40 of 120 rows (2 skipped, 1 errors)".
    pub message: String,
    pub progress_percent: f64,
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub log_tail: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `processed / total * 100` rounded to two decimals and clamped to 100.
/// Zero when nothing has been counted yet.
pub fn progress_percent(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = processed as f64 / total as f64 * 100.0;
    ((pct * 100.0).round() / 100.0).min(100.0)
}
