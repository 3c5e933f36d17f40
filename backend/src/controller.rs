//! Entry point shared by the HTTP handlers and the drain scheduler.
//!
//! Built once in `main.rs` and handed to actix as `web::Data`. Everything it
//! holds is either a handle (the store, the scheduler sender) or shared
//! through an `Arc`, so clones are cheap and see the same drain guard.

use crate::catalog::sqlite::SqliteCatalog;
use crate::config::AppConfig;
use crate::error::{ImportError, ImportResult};
use crate::job_controller::state::DrainSignal;
use crate::pipeline::importer::{CsvImporter, ImportSummary};
use crate::pipeline::mapper::validate_mapping;
use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::worker::{DrainBudget, DrainReport, ImportWorker};
use crate::store::settings::{IMPORT_SETTINGS_KEY, MAPPING_KEY};
use crate::store::Store;
use common::jobs::StatusReport;
use common::model::mapping::MappingConfig;
use common::model::settings::ImportSettings;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ImportController {
    store: Store,
    upload_dir: PathBuf,
    budget: DrainBudget,
    signal: mpsc::Sender<DrainSignal>,
    draining: Arc<AtomicBool>,
}

/// Clears the drain flag when the drain ends, however it ends.
struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ImportController {
    pub fn new(store: Store, config: &AppConfig, signal: mpsc::Sender<DrainSignal>) -> Self {
        Self {
            store,
            upload_dir: config.upload_dir.clone(),
            budget: DrainBudget {
                max_items: config.drain_max_items,
                max_duration: config.drain_max_duration,
            },
            signal,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn drain_budget(&self) -> DrainBudget {
        self.budget
    }

    pub fn signal(&self) -> &mpsc::Sender<DrainSignal> {
        &self.signal
    }

    fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new(self.store.clone())
    }

    /// Starts a run for an uploaded file and reads it in the background.
    /// Returns the run id as soon as the run record exists.
    pub fn submit(&self, path: PathBuf, file_md5: Option<String>) -> ImportResult<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let settings = self.store.load_import_settings()?;
        settings.validate().map_err(ImportError::InvalidSettings)?;
        self.tracker()
            .start(&run_id, &path.display().to_string(), file_md5, settings)?;

        let importer = CsvImporter::new(self.store.clone(), Some(self.signal.clone()));
        let tracker = self.tracker();
        let id = run_id.clone();
        tokio::spawn(async move {
            let id_for_blocking = id.clone();
            let handle =
                tokio::task::spawn_blocking(move || importer.run(&id_for_blocking, &path));
            await_reader(&tracker, &id, handle).await;
        });

        Ok(run_id)
    }

    pub fn status(&self, run_id: &str) -> ImportResult<StatusReport> {
        self.tracker()
            .read(run_id)?
            .ok_or_else(|| ImportError::RunNotFound(run_id.to_string()))
    }

    /// Purges expired runs and runs one bounded drain on the blocking pool.
    /// Returns `None` without doing anything when a drain is already running.
    pub async fn drain(&self) -> ImportResult<Option<DrainReport>> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        let guard = DrainGuard(self.draining.clone());
        let store = self.store.clone();
        let budget = self.budget;

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            ProgressTracker::new(store.clone()).purge_expired()?;
            ImportWorker::new(store.clone(), SqliteCatalog::new(store)).drain(budget)
        });
        let report = handle
            .await
            .map_err(|e| ImportError::Task(e.to_string()))??;
        Ok(Some(report))
    }

    pub fn mapping(&self) -> ImportResult<MappingConfig> {
        self.store.load_mapping()
    }

    /// Validates and stores a mapping; an invalid one leaves the stored
    /// configuration untouched.
    pub fn save_mapping(&self, mapping: MappingConfig) -> ImportResult<MappingConfig> {
        validate_mapping(&mapping)?;
        self.store.put_setting(MAPPING_KEY, &mapping)?;
        info!("column mapping updated");
        Ok(mapping)
    }

    pub fn reset_mapping(&self) -> ImportResult<MappingConfig> {
        self.store.delete_setting(MAPPING_KEY)?;
        info!("column mapping reset to default");
        self.store.load_mapping()
    }

    pub fn settings(&self) -> ImportResult<ImportSettings> {
        self.store.load_import_settings()
    }

    pub fn save_settings(&self, settings: ImportSettings) -> ImportResult<ImportSettings> {
        settings.validate().map_err(ImportError::InvalidSettings)?;
        self.store.put_setting(IMPORT_SETTINGS_KEY, &settings)?;
        info!("import settings updated");
        Ok(settings)
    }
}

/// Waits for a reader task. A reader that panicked never reached its own
/// failure handling, so its run is failed here.
async fn await_reader(
    tracker: &ProgressTracker,
    run_id: &str,
    handle: JoinHandle<ImportResult<ImportSummary>>,
) {
    match handle.await {
        Ok(Ok(summary)) => info!(
            "run {}: read {} rows ({} queued, {} skipped)",
            run_id, summary.total, summary.queued, summary.skipped
        ),
        Ok(Err(e)) => error!("run {}: import failed: {}", run_id, e),
        Err(join_err) => {
            error!("run {}: reader task died: {}", run_id, join_err);
            let reason = format!("reader task died: {}", join_err);
            if let Err(e) = tracker.fail(run_id, &reason) {
                error!("run {}: could not record the failure: {}", run_id, e);
            }
        }
    }
}
