use super::Store;
use crate::error::ImportResult;
use chrono::{DateTime, Utc};
use common::jobs::ItemState;
use rusqlite::{params, OptionalExtension};

/// A queue row handed to the worker. The payload is kept as raw JSON so the
/// worker can reject malformed items itself instead of failing the claim.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: i64,
    pub run_id: String,
    pub payload: String,
}

impl Store {
    /// Appends a batch in one transaction; insertion order is processing order.
    pub fn enqueue_batch(&self, run_id: &str, payloads: &[String]) -> ImportResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO queue (run_id, payload, state, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = Utc::now();
            for payload in payloads {
                stmt.execute(params![run_id, payload, ItemState::Queued.as_str(), now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Atomically moves the oldest queued item to `processing` and returns it.
    pub fn claim_next_item(&self, now: DateTime<Utc>) -> ImportResult<Option<QueueItem>> {
        let conn = self.connect()?;
        let item = conn
            .query_row(
                "UPDATE queue SET state = ?1, claimed_at = ?2
                 WHERE id = (SELECT id FROM queue WHERE state = ?3 ORDER BY id LIMIT 1)
                 RETURNING id, run_id, payload",
                params![
                    ItemState::Processing.as_str(),
                    now,
                    ItemState::Queued.as_str()
                ],
                |row| {
                    Ok(QueueItem {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        payload: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    /// Removes a processed item, whatever its outcome.
    pub fn finish_item(&self, id: i64) -> ImportResult<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Returns items a previous process claimed but never finished to the queue.
    pub fn recover_claimed_items(&self) -> ImportResult<usize> {
        let conn = self.connect()?;
        let recovered = conn.execute(
            "UPDATE queue SET state = ?1, claimed_at = NULL WHERE state = ?2",
            params![ItemState::Queued.as_str(), ItemState::Processing.as_str()],
        )?;
        Ok(recovered)
    }

    /// Items of a run still queued or in flight.
    #[cfg(test)]
    pub fn pending_items_for_run(&self, run_id: &str) -> ImportResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Drops every queued item of a run that no longer exists.
    pub fn discard_run_items(&self, run_id: &str) -> ImportResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM queue WHERE run_id = ?1 AND state = ?2",
            params![run_id, ItemState::Queued.as_str()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::testing::temp_store;
    use chrono::Utc;

    #[test]
    fn items_are_claimed_in_enqueue_order_across_batches() {
        let (_dir, store) = temp_store();
        store
            .enqueue_batch("r1", &["a".to_string(), "b".to_string()])
            .unwrap();
        store.enqueue_batch("r1", &["c".to_string()]).unwrap();

        let mut seen = Vec::new();
        while let Some(item) = store.claim_next_item(Utc::now()).unwrap() {
            seen.push(item.payload.clone());
            store.finish_item(item.id).unwrap();
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn claimed_item_is_not_handed_out_twice() {
        let (_dir, store) = temp_store();
        store.enqueue_batch("r1", &["a".to_string()]).unwrap();

        let first = store.claim_next_item(Utc::now()).unwrap();
        assert!(first.is_some());
        assert!(store.claim_next_item(Utc::now()).unwrap().is_none());
        assert_eq!(store.pending_items_for_run("r1").unwrap(), 1);
    }

    #[test]
    fn abandoned_claims_are_recovered() {
        let (_dir, store) = temp_store();
        store.enqueue_batch("r1", &["a".to_string()]).unwrap();
        store.claim_next_item(Utc::now()).unwrap();

        assert_eq!(store.recover_claimed_items().unwrap(), 1);
        let again = store.claim_next_item(Utc::now()).unwrap().unwrap();
        assert_eq!(again.payload, "a");
    }

    #[test]
    fn discarding_a_run_leaves_other_runs_untouched() {
        let (_dir, store) = temp_store();
        store.enqueue_batch("gone", &["a".to_string(), "b".to_string()]).unwrap();
        store.enqueue_batch("kept", &["c".to_string()]).unwrap();

        assert_eq!(store.discard_run_items("gone").unwrap(), 2);
        assert_eq!(store.pending_items_for_run("kept").unwrap(), 1);
    }
}
