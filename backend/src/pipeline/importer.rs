//! Reads an uploaded CSV file and feeds valid rows into the work queue.
//!
//! The reader owns the `total` and `skipped` counters of a run and flips its
//! dispatch-complete flag once the last batch is queued. Anything that stops
//! the file from being read at all fails the run.

use super::batch::{BatchQueue, Dispatch, QueueDispatcher, QueuedRow};
use super::mapper::{normalize_header, validate_mapping, ColumnMapper, RawRow};
use super::progress::{LogLevel, ProgressTracker};
use super::validator::RowValidator;
use crate::error::{ImportError, ImportResult};
use crate::job_controller::state::DrainSignal;
use crate::store::runs::RunDelta;
use crate::store::Store;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub total: u64,
    pub queued: u64,
    pub skipped: u64,
    /// Reading stopped early because `max_rows` was reached.
    pub truncated: bool,
}

pub struct CsvImporter {
    store: Store,
    tracker: ProgressTracker,
    signal: Option<mpsc::Sender<DrainSignal>>,
}

impl CsvImporter {
    pub fn new(store: Store, signal: Option<mpsc::Sender<DrainSignal>>) -> Self {
        Self {
            tracker: ProgressTracker::new(store.clone()),
            store,
            signal,
        }
    }

    /// Imports `path` into the already started run `run_id`. On a fatal
    /// error the run is marked failed with the error as its message.
    pub fn run(&self, run_id: &str, path: &Path) -> ImportResult<ImportSummary> {
        let dispatcher = QueueDispatcher::new(self.store.clone(), self.signal.clone());
        match self.read_file(run_id, path, dispatcher) {
            Ok(summary) => {
                self.tracker.mark_dispatch_complete(run_id)?;
                self.tracker.log(
                    run_id,
                    LogLevel::Info,
                    &format!(
                        "finished reading: {} rows, {} queued, {} skipped",
                        summary.total, summary.queued, summary.skipped
                    ),
                );
                // Nothing may have been queued, or the worker may already be done.
                self.tracker.try_complete(run_id)?;
                Ok(summary)
            }
            Err(e) => {
                self.tracker.fail(run_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    fn read_file<D: Dispatch>(
        &self,
        run_id: &str,
        path: &Path,
        dispatcher: D,
    ) -> ImportResult<ImportSummary> {
        let run = self
            .tracker
            .load(run_id)?
            .ok_or_else(|| ImportError::RunNotFound(run_id.to_string()))?;
        let settings = run.settings;

        let mapping = self.store.load_mapping()?;
        validate_mapping(&mapping)?;
        let mapper = ColumnMapper::new(&mapping)?;
        let validator = RowValidator::new(&settings.required_fields);

        if !path.is_file() {
            return Err(ImportError::FileNotFound(path.to_path_buf()));
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = read_headers(&mut reader)?;
        self.tracker.log(
            run_id,
            LogLevel::Info,
            &format!("CSV headers: {}", headers.join(", ")),
        );
        for name in duplicate_headers(&headers) {
            self.tracker.log(
                run_id,
                LogLevel::Warning,
                &format!("column '{}' appears more than once; the first one is used", name),
            );
        }

        let mut queue = BatchQueue::new(run_id, settings.batch_size, dispatcher);
        let mut summary = ImportSummary::default();
        let mut pending = RunDelta::default();

        for (index, result) in reader.records().enumerate() {
            let fallback_line = index as u64 + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    if summary.total as usize >= settings.max_rows {
                        summary.truncated = true;
                        break;
                    }
                    summary.total += 1;
                    summary.skipped += 1;
                    pending.total += 1;
                    pending.skipped += 1;
                    self.tracker.log(
                        run_id,
                        LogLevel::Warning,
                        &format!("row {} skipped: unreadable ({})", fallback_line, e),
                    );
                    continue;
                }
            };
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(fallback_line);

            if record.iter().all(|cell| cell.trim().is_empty()) {
                self.tracker
                    .log(run_id, LogLevel::Warning, &format!("row {} is empty, ignored", line));
                continue;
            }
            if summary.total as usize >= settings.max_rows {
                summary.truncated = true;
                break;
            }
            summary.total += 1;
            pending.total += 1;

            if record.len() != headers.len() {
                summary.skipped += 1;
                pending.skipped += 1;
                self.tracker.log(
                    run_id,
                    LogLevel::Warning,
                    &format!(
                        "row {} skipped: {} cells for {} columns",
                        line,
                        record.len(),
                        headers.len()
                    ),
                );
                continue;
            }

            let mut raw = RawRow::with_capacity(headers.len());
            for (header, cell) in headers.iter().zip(record.iter()) {
                raw.entry(header.clone()).or_insert_with(|| cell.to_string());
            }
            let mapped = mapper.map_row(&raw);
            if let Err(rejection) = validator.validate(&mapped) {
                summary.skipped += 1;
                pending.skipped += 1;
                self.tracker.log(
                    run_id,
                    LogLevel::Warning,
                    &format!("row {} skipped: {}", line, rejection),
                );
                continue;
            }

            // A drain may start as soon as a batch lands; the run total must
            // already cover its rows.
            if queue.fills_on_next_push() || pending.total as usize >= settings.batch_size {
                self.flush_counters(run_id, &mut pending)?;
            }
            queue.push(QueuedRow {
                row_number: line,
                raw,
                mapped,
            })?;
            summary.queued += 1;
        }

        if summary.truncated {
            self.tracker.log(
                run_id,
                LogLevel::Warning,
                &format!("stopped reading after the {} row limit", settings.max_rows),
            );
        }
        self.flush_counters(run_id, &mut pending)?;
        queue.finish()?;
        Ok(summary)
    }

    /// Counters are applied in chunks rather than per row.
    fn flush_counters(&self, run_id: &str, pending: &mut RunDelta) -> ImportResult<()> {
        if *pending == RunDelta::default() {
            return Ok(());
        }
        if !self.tracker.update(run_id, *pending)? {
            return Err(ImportError::RunNotFound(run_id.to_string()));
        }
        *pending = RunDelta::default();
        Ok(())
    }
}

fn read_headers<R: std::io::Read>(reader: &mut csv::Reader<R>) -> ImportResult<Vec<String>> {
    let record: StringRecord = reader
        .headers()
        .map_err(|e| ImportError::UnreadableHeaders(e.to_string()))?
        .clone();
    let headers: Vec<String> = record
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            normalize_header(h)
        })
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(ImportError::UnreadableHeaders(
            "the file has no header row".to_string(),
        ));
    }
    Ok(headers)
}

/// Normalized names that occur more than once, each listed once.
fn duplicate_headers(headers: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for name in headers {
        if !seen.insert(name.as_str()) && !duplicates.contains(&name.as_str()) {
            duplicates.push(name.as_str());
        }
    }
    duplicates
}
