use super::Store;
use crate::error::ImportResult;
use chrono::{DateTime, Utc};
use common::jobs::RunStatus;
use common::model::run::ImportRun;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Counter increments applied to a run in one statement.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunDelta {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl RunDelta {
    #[cfg(test)]
    pub fn total(n: u64) -> Self {
        Self { total: n, ..Self::default() }
    }
    pub fn processed(n: u64) -> Self {
        Self { processed: n, ..Self::default() }
    }
    #[cfg(test)]
    pub fn skipped(n: u64) -> Self {
        Self { skipped: n, ..Self::default() }
    }
    pub fn errors(n: u64) -> Self {
        Self { errors: n, ..Self::default() }
    }
}

const RUN_COLUMNS: &str = "run_id, status, message, file_path, file_md5, total_rows, processed_rows, \
     skipped_rows, error_rows, dispatch_complete, settings, started_at, completed_at, expires_at";

impl Store {
    pub fn insert_run(&self, run: &ImportRun) -> ImportResult<()> {
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                run.run_id,
                run.status.as_str(),
                run.message,
                run.file_path,
                run.file_md5,
                run.total_rows as i64,
                run.processed_rows as i64,
                run.skipped_rows as i64,
                run.error_rows as i64,
                run.dispatch_complete,
                serde_json::to_string(&run.settings)?,
                run.started_at,
                run.completed_at,
                run.expires_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Loads a run that has not expired yet, including its error lines.
    pub fn load_run(&self, run_id: &str, now: DateTime<Utc>) -> ImportResult<Option<ImportRun>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1 AND expires_at > ?2"),
                params![run_id, now.timestamp()],
                read_run_row,
            )
            .optional()?;
        let Some((mut run, settings_json)) = row else {
            return Ok(None);
        };
        run.settings = serde_json::from_str(&settings_json)?;
        run.errors = log_lines(&conn, run_id, Some("ERROR"), None)?;
        Ok(Some(run))
    }

    /// Adds `delta` to the run counters. Returns false when the run does not exist.
    pub fn apply_run_delta(&self, run_id: &str, delta: RunDelta) -> ImportResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE runs SET total_rows = total_rows + ?2, processed_rows = processed_rows + ?3,
                 skipped_rows = skipped_rows + ?4, error_rows = error_rows + ?5
             WHERE run_id = ?1",
            params![
                run_id,
                delta.total as i64,
                delta.processed as i64,
                delta.skipped as i64,
                delta.errors as i64
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_dispatch_complete(&self, run_id: &str) -> ImportResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE runs SET dispatch_complete = 1 WHERE run_id = ?1",
            params![run_id],
        )?;
        Ok(changed > 0)
    }

    /// Marks the run completed iff the reader is done and no queue item of the
    /// run remains, queued or in flight. Returns true when this call completed it.
    pub fn complete_run_if_drained(
        &self,
        run_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> ImportResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE runs SET status = ?2, message = ?3, completed_at = ?4
             WHERE run_id = ?1 AND status = ?5 AND dispatch_complete = 1
               AND NOT EXISTS (SELECT 1 FROM queue WHERE queue.run_id = ?1)",
            params![
                run_id,
                RunStatus::Completed.as_str(),
                message,
                now,
                RunStatus::InProgress.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    /// Moves an in-progress run to `failed`. Returns false if it was missing or already terminal.
    pub fn fail_run(&self, run_id: &str, message: &str, now: DateTime<Utc>) -> ImportResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE runs SET status = ?2, message = ?3, completed_at = ?4
             WHERE run_id = ?1 AND status = ?5",
            params![
                run_id,
                RunStatus::Failed.as_str(),
                message,
                now,
                RunStatus::InProgress.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn append_run_log(&self, run_id: &str, level: &str, message: &str) -> ImportResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO run_log (run_id, level, message, logged_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, level, message, Utc::now()],
        )?;
        Ok(())
    }

    /// Last `limit` formatted log lines of a run, oldest first.
    pub fn run_log_tail(&self, run_id: &str, limit: usize) -> ImportResult<Vec<String>> {
        let conn = self.connect()?;
        log_lines(&conn, run_id, None, Some(limit))
    }

    /// Deletes expired runs together with their log lines and any queue items
    /// that no longer belong to a run. Returns the number of runs removed.
    pub fn purge_expired_runs(&self, now: DateTime<Utc>) -> ImportResult<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM runs WHERE expires_at <= ?1",
            params![now.timestamp()],
        )?;
        tx.execute(
            "DELETE FROM run_log WHERE run_id NOT IN (SELECT run_id FROM runs)",
            [],
        )?;
        tx.execute(
            "DELETE FROM queue WHERE run_id NOT IN (SELECT run_id FROM runs)",
            [],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Removes a run record outright; queued items of the run are left for
    /// the worker to discard.
    #[cfg(test)]
    pub fn delete_run(&self, run_id: &str) -> ImportResult<bool> {
        let conn = self.connect()?;
        let changed = conn.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        Ok(changed > 0)
    }
}

fn read_run_row(row: &Row<'_>) -> rusqlite::Result<(ImportRun, String)> {
    let status: String = row.get(1)?;
    let expires_at: i64 = row.get(13)?;
    let run = ImportRun {
        run_id: row.get(0)?,
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        message: row.get(2)?,
        file_path: row.get(3)?,
        file_md5: row.get(4)?,
        total_rows: row.get::<_, i64>(5)? as u64,
        processed_rows: row.get::<_, i64>(6)? as u64,
        skipped_rows: row.get::<_, i64>(7)? as u64,
        error_rows: row.get::<_, i64>(8)? as u64,
        errors: Vec::new(),
        dispatch_complete: row.get(9)?,
        settings: Default::default(),
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
        expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_default(),
    };
    Ok((run, row.get(10)?))
}

fn log_lines(
    conn: &Connection,
    run_id: &str,
    level: Option<&str>,
    limit: Option<usize>,
) -> ImportResult<Vec<String>> {
    // Newest first so LIMIT keeps the tail, reversed below.
    let mut stmt = conn.prepare(
        "SELECT level, message, logged_at FROM run_log
         WHERE run_id = ?1 AND (?2 IS NULL OR level = ?2)
         ORDER BY id DESC LIMIT ?3",
    )?;
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let mut lines = stmt
        .query_map(params![run_id, level, limit], |row| {
            let level: String = row.get(0)?;
            let message: String = row.get(1)?;
            let logged_at: DateTime<Utc> = row.get(2)?;
            Ok(format!(
                "[{}] [{}] {}",
                logged_at.format("%Y-%m-%d %H:%M:%S"),
                level,
                message
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    lines.reverse();
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::temp_store;
    use chrono::Duration;
    use common::model::settings::ImportSettings;

    fn sample_run(run_id: &str, started_at: DateTime<Utc>) -> ImportRun {
        ImportRun {
            run_id: run_id.to_string(),
            status: RunStatus::InProgress,
            message: None,
            file_path: "uploads/test.csv".to_string(),
            file_md5: None,
            total_rows: 0,
            processed_rows: 0,
            skipped_rows: 0,
            error_rows: 0,
            errors: Vec::new(),
            dispatch_complete: false,
            settings: ImportSettings::default(),
            started_at,
            completed_at: None,
            expires_at: started_at + Duration::days(7),
        }
    }

    #[test]
    fn counters_accumulate_across_deltas() {
        let (_dir, store) = temp_store();
        let now = Utc::now();
        store.insert_run(&sample_run("r1", now)).unwrap();

        store.apply_run_delta("r1", RunDelta::total(3)).unwrap();
        store.apply_run_delta("r1", RunDelta::processed(2)).unwrap();
        store.apply_run_delta("r1", RunDelta::skipped(1)).unwrap();

        let run = store.load_run("r1", now).unwrap().unwrap();
        assert_eq!((run.total_rows, run.processed_rows, run.skipped_rows), (3, 2, 1));
        assert!(!store.apply_run_delta("missing", RunDelta::errors(1)).unwrap());
    }

    #[test]
    fn run_completes_only_after_dispatch_finished_and_queue_empty() {
        let (_dir, store) = temp_store();
        let now = Utc::now();
        store.insert_run(&sample_run("r1", now)).unwrap();
        store.enqueue_batch("r1", &["{}".to_string()]).unwrap();

        assert!(!store.complete_run_if_drained("r1", "done", now).unwrap());
        store.set_dispatch_complete("r1").unwrap();
        assert!(!store.complete_run_if_drained("r1", "done", now).unwrap());

        let item = store.claim_next_item(now).unwrap().unwrap();
        assert!(!store.complete_run_if_drained("r1", "done", now).unwrap());
        store.finish_item(item.id).unwrap();
        assert!(store.complete_run_if_drained("r1", "done", now).unwrap());

        let run = store.load_run("r1", now).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(!store.fail_run("r1", "late failure", now).unwrap());
    }

    #[test]
    fn expired_runs_disappear_and_are_purged() {
        let (_dir, store) = temp_store();
        let started = Utc::now() - Duration::days(8);
        store.insert_run(&sample_run("old", started)).unwrap();
        store.append_run_log("old", "INFO", "hello").unwrap();
        store.enqueue_batch("old", &["{}".to_string()]).unwrap();

        let now = Utc::now();
        assert!(store.load_run("old", now).unwrap().is_none());
        assert_eq!(store.purge_expired_runs(now).unwrap(), 1);
        assert!(store.run_log_tail("old", 10).unwrap().is_empty());
        assert_eq!(store.pending_items_for_run("old").unwrap(), 0);
    }

    #[test]
    fn log_tail_keeps_the_most_recent_lines_in_order() {
        let (_dir, store) = temp_store();
        let now = Utc::now();
        store.insert_run(&sample_run("r1", now)).unwrap();
        for i in 0..5 {
            store.append_run_log("r1", "INFO", &format!("line {i}")).unwrap();
        }
        store.append_run_log("r1", "ERROR", "boom").unwrap();

        let tail = store.run_log_tail("r1", 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].ends_with("[INFO] line 4"));
        assert!(tail[1].ends_with("[ERROR] boom"));

        let run = store.load_run("r1", now).unwrap().unwrap();
        assert_eq!(run.errors.len(), 1);
    }
}
