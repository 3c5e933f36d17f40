use super::mapper::{MappedRow, RawRow};
use crate::error::ImportResult;
use crate::job_controller::state::DrainSignal;
use crate::store::Store;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Upper bound on the buffer preallocation; larger batches grow on demand.
const PREALLOCATED_ROWS: usize = 1024;

/// A validated row as stored in the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRow {
    /// Line of the row in the source file; the header is line 1.
    pub row_number: u64,
    pub raw: RawRow,
    pub mapped: MappedRow,
}

/// Receives full batches from a [`BatchQueue`].
pub trait Dispatch {
    fn dispatch(&mut self, run_id: &str, batch: Vec<QueuedRow>) -> ImportResult<()>;
}

/// Dispatcher writing batches into the persistent queue and nudging the
/// drain scheduler.
pub struct QueueDispatcher {
    store: Store,
    signal: Option<mpsc::Sender<DrainSignal>>,
}

impl QueueDispatcher {
    pub fn new(store: Store, signal: Option<mpsc::Sender<DrainSignal>>) -> Self {
        Self { store, signal }
    }
}

impl Dispatch for QueueDispatcher {
    fn dispatch(&mut self, run_id: &str, batch: Vec<QueuedRow>) -> ImportResult<()> {
        let payloads = batch
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.enqueue_batch(run_id, &payloads)?;
        debug!("run {}: queued batch of {} rows", run_id, payloads.len());
        if let Some(tx) = &self.signal {
            // A full channel already holds a pending wake-up.
            let _ = tx.try_send(DrainSignal::BatchQueued);
        }
        Ok(())
    }
}

/// Buffers rows and hands them to the dispatcher `batch_size` at a time.
pub struct BatchQueue<D: Dispatch> {
    run_id: String,
    batch_size: usize,
    buffer: Vec<QueuedRow>,
    dispatcher: D,
    dispatched: u64,
}

impl<D: Dispatch> BatchQueue<D> {
    pub fn new(run_id: &str, batch_size: usize, dispatcher: D) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            run_id: run_id.to_string(),
            batch_size,
            buffer: Vec::with_capacity(batch_size.min(PREALLOCATED_ROWS)),
            dispatcher,
            dispatched: 0,
        }
    }

    pub fn push(&mut self, row: QueuedRow) -> ImportResult<()> {
        self.buffer.push(row);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// True when the next `push` hands a batch to the dispatcher.
    pub fn fills_on_next_push(&self) -> bool {
        self.buffer.len() + 1 >= self.batch_size
    }

    /// Flushes the partial batch left at end of stream. Returns the number of
    /// rows dispatched over the queue's lifetime.
    pub fn finish(mut self) -> ImportResult<u64> {
        self.flush()?;
        Ok(self.dispatched)
    }

    fn flush(&mut self) -> ImportResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.batch_size.min(PREALLOCATED_ROWS)),
        );
        let len = batch.len() as u64;
        self.dispatcher.dispatch(&self.run_id, batch)?;
        self.dispatched += len;
        Ok(())
    }
}
