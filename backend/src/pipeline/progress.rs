use crate::error::{ImportError, ImportResult};
use crate::store::runs::RunDelta;
use crate::store::Store;
use chrono::{Duration, Utc};
use common::jobs::{progress_percent, RunStatus, StatusReport};
use common::model::run::ImportRun;
use common::model::settings::ImportSettings;
use log::{error, info, warn};

/// Lines of run log returned with every status report.
pub const LOG_TAIL_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Run state as seen by the reader, the worker and the status endpoint.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    store: Store,
}

impl ProgressTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn start(
        &self,
        run_id: &str,
        file_path: &str,
        file_md5: Option<String>,
        settings: ImportSettings,
    ) -> ImportResult<ImportRun> {
        let now = Utc::now();
        let expires_at = Duration::try_days(i64::from(settings.retention_days))
            .and_then(|retention| now.checked_add_signed(retention))
            .ok_or_else(|| {
                ImportError::InvalidSettings(format!(
                    "retention_days {} is out of range",
                    settings.retention_days
                ))
            })?;
        let run = ImportRun {
            run_id: run_id.to_string(),
            status: RunStatus::InProgress,
            message: None,
            file_path: file_path.to_string(),
            file_md5,
            total_rows: 0,
            processed_rows: 0,
            skipped_rows: 0,
            error_rows: 0,
            errors: Vec::new(),
            dispatch_complete: false,
            expires_at,
            settings,
            started_at: now,
            completed_at: None,
        };
        self.store.insert_run(&run)?;
        self.log(run_id, LogLevel::Info, &format!("import started for {}", file_path));
        Ok(run)
    }

    /// Returns false when the run no longer exists.
    pub fn update(&self, run_id: &str, delta: RunDelta) -> ImportResult<bool> {
        self.store.apply_run_delta(run_id, delta)
    }

    pub fn mark_dispatch_complete(&self, run_id: &str) -> ImportResult<bool> {
        self.store.set_dispatch_complete(run_id)
    }

    /// Completes the run once every row is accounted for. Safe to call after
    /// each item; only the call that flips the status returns true.
    pub fn try_complete(&self, run_id: &str) -> ImportResult<bool> {
        let now = Utc::now();
        let Some(run) = self.store.load_run(run_id, now)? else {
            return Ok(false);
        };
        let message = summary_message(&run);
        let completed = self.store.complete_run_if_drained(run_id, &message, now)?;
        if completed {
            self.log(run_id, LogLevel::Info, &format!("import completed: {}", message));
        }
        Ok(completed)
    }

    pub fn fail(&self, run_id: &str, message: &str) -> ImportResult<bool> {
        let failed = self.store.fail_run(run_id, message, Utc::now())?;
        if failed {
            self.log(run_id, LogLevel::Error, &format!("import failed: {}", message));
        }
        Ok(failed)
    }

    pub fn load(&self, run_id: &str) -> ImportResult<Option<ImportRun>> {
        self.store.load_run(run_id, Utc::now())
    }

    /// Status report for pollers; `None` for unknown or expired runs.
    pub fn read(&self, run_id: &str) -> ImportResult<Option<StatusReport>> {
        let Some(run) = self.load(run_id)? else {
            return Ok(None);
        };
        let message = match (&run.status, &run.message) {
            (RunStatus::InProgress, _) | (_, None) => summary_message(&run),
            (_, Some(message)) => message.clone(),
        };
        Ok(Some(StatusReport {
            progress_percent: progress_percent(run.processed_rows, run.total_rows),
            log_tail: self.store.run_log_tail(run_id, LOG_TAIL_LINES)?,
            run_id: run.run_id,
            status: run.status,
            message,
            total: run.total_rows,
            processed: run.processed_rows,
            skipped: run.skipped_rows,
            errors: run.error_rows,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }))
    }

    /// Appends to the run log and mirrors the line to the process log.
    /// Failing to persist a log line never interrupts the import.
    pub fn log(&self, run_id: &str, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!("[run {}] {}", run_id, message),
            LogLevel::Warning => warn!("[run {}] {}", run_id, message),
            LogLevel::Error => error!("[run {}] {}", run_id, message),
        }
        if let Err(e) = self.store.append_run_log(run_id, level.as_str(), message) {
            error!("[run {}] could not persist log line: {}", run_id, e);
        }
    }

    pub fn purge_expired(&self) -> ImportResult<usize> {
        let removed = self.store.purge_expired_runs(Utc::now())?;
        if removed > 0 {
            info!("purged {} expired import runs", removed);
        }
        Ok(removed)
    }
}

fn summary_message(run: &ImportRun) -> String {
    format!(
        "Processed {} of {} rows ({} skipped, {} errors)",
        run.processed_rows, run.total_rows, run.skipped_rows, run.error_rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::temp_store;

    #[test]
    fn fresh_run_reports_zero_percent() {
        let (_dir, store) = temp_store();
        let tracker = ProgressTracker::new(store);
        tracker.start("r1", "a.csv", None, ImportSettings::default()).unwrap();

        let report = tracker.read("r1").unwrap().unwrap();
        assert_eq!(report.status, RunStatus::InProgress);
        assert_eq!(report.progress_percent, 0.0);
        assert_eq!(report.message, "Processed 0 of 0 rows (0 skipped, 0 errors)");
        assert!(report.log_tail[0].ends_with("[INFO] import started for a.csv"));
    }

    #[test]
    fn unknown_run_reads_as_none() {
        let (_dir, store) = temp_store();
        assert!(ProgressTracker::new(store).read("nope").unwrap().is_none());
    }

    #[test]
    fn completion_waits_for_dispatch_and_keeps_the_summary() {
        let (_dir, store) = temp_store();
        let tracker = ProgressTracker::new(store);
        tracker.start("r1", "a.csv", None, ImportSettings::default()).unwrap();
        tracker
            .update("r1", RunDelta { total: 3, processed: 2, skipped: 1, errors: 0 })
            .unwrap();

        assert!(!tracker.try_complete("r1").unwrap());
        tracker.mark_dispatch_complete("r1").unwrap();
        assert!(tracker.try_complete("r1").unwrap());
        assert!(!tracker.try_complete("r1").unwrap());

        let report = tracker.read("r1").unwrap().unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.progress_percent, 66.67);
        assert_eq!(report.message, "Processed 2 of 3 rows (1 skipped, 0 errors)");
        assert!(report.completed_at.is_some());
    }

    #[test]
    fn out_of_range_retention_is_an_error_not_a_run() {
        let (_dir, store) = temp_store();
        let tracker = ProgressTracker::new(store);
        let settings = ImportSettings {
            retention_days: u32::MAX,
            ..ImportSettings::default()
        };

        let result = tracker.start("r1", "a.csv", None, settings);
        assert!(matches!(result, Err(ImportError::InvalidSettings(_))));
        assert!(tracker.read("r1").unwrap().is_none());
    }

    #[test]
    fn failed_run_keeps_its_reason() {
        let (_dir, store) = temp_store();
        let tracker = ProgressTracker::new(store);
        tracker.start("r1", "a.csv", None, ImportSettings::default()).unwrap();

        assert!(tracker.fail("r1", "CSV file not found: a.csv").unwrap());
        let report = tracker.read("r1").unwrap().unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.message, "CSV file not found: a.csv");
        assert!(report.log_tail.last().unwrap().contains("[ERROR] import failed"));
    }
}
