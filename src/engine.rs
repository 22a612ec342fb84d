//! Engine Module
//!
//! The public facade tying keys, atomic writes, reads and the queue to one
//! versioned table.
//!
//! ## Responsibilities
//! - Validate every request against the configured limits before touching
//!   the table
//! - Run atomic writes and queue operations as single transactions
//! - Hand out lazy list iterators
//! - Wake blocked queue consumers when a write enqueues messages

use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::{KvError, Result};
use crate::key::Key;
use crate::queue::{self, QueueMessage};
use crate::read::{self, ListIterator, ListOptions, ReadRange, Selector};
use crate::table::{Consistency, LocalTable, VersionedTable};
use crate::write::{self, AtomicWrite, CommitOutcome};

/// The key-value engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// The engine adds no locking of its own. Writes, dequeues and
/// reschedules each run inside one table transaction, and the table
/// serializes transactions. Reads go straight to the table's scans.
/// Share an engine across threads with `Arc`.
pub struct Engine<T: VersionedTable = LocalTable> {
    table: T,
    config: Config,

    /// Signalled after a commit that enqueued messages; capacity 1 so
    /// repeated signals coalesce
    queue_signal: Sender<()>,
    queue_waiter: Receiver<()>,
}

impl Engine<LocalTable> {
    /// Open or create a durable engine under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let table = LocalTable::open(&config)?;
        Ok(Self::assemble(table, config))
    }

    /// Create an engine that keeps everything in memory
    pub fn in_memory() -> Self {
        Self::assemble(LocalTable::in_memory(), Config::default())
    }

    /// Rewrite the WAL as a single snapshot
    pub fn checkpoint(&self) -> Result<()> {
        self.table.checkpoint()
    }
}

impl<T: VersionedTable> Engine<T> {
    /// Run the engine on any versioned table
    pub fn with_table(table: T, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(table, config))
    }

    fn assemble(table: T, config: Config) -> Self {
        let (queue_signal, queue_waiter) = channel::bounded(1);
        Self {
            table,
            config,
            queue_signal,
            queue_waiter,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a single key
    pub fn get(&self, key: &Key) -> Result<Option<Entry>> {
        let mut results = self.snapshot_read(&[ReadRange::point(key)?], Consistency::Strong)?;
        Ok(results.pop().and_then(|mut entries| entries.pop()))
    }

    /// Read several keys from one consistent view, in request order
    pub fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        let ranges = keys
            .iter()
            .map(ReadRange::point)
            .collect::<Result<Vec<_>>>()?;
        let results = self.snapshot_read(&ranges, Consistency::Strong)?;
        Ok(results
            .into_iter()
            .map(|mut entries| entries.pop())
            .collect())
    }

    /// Read bounded ranges; every range is validated before the first scan
    pub fn snapshot_read(
        &self,
        ranges: &[ReadRange],
        consistency: Consistency,
    ) -> Result<Vec<Vec<Entry>>> {
        read::snapshot_read(&self.table, ranges, consistency, &self.config.limits)
    }

    /// Lazily list the entries a selector covers
    ///
    /// Validation happens here; no scan is issued until the first `next()`.
    pub fn list(&self, selector: &Selector, options: ListOptions) -> Result<ListIterator<'_, T>> {
        ListIterator::new(
            &self.table,
            selector,
            options,
            self.config.default_batch_size,
            &self.config.limits,
        )
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply checks, mutations and enqueues as one transaction
    ///
    /// A failed check is reported as [`CommitOutcome::CheckFailed`], not as
    /// an error.
    pub fn atomic_write(&self, write: AtomicWrite) -> Result<CommitOutcome> {
        let prepared = write::prepare(&write, &self.config.limits)?;
        let outcome = write::commit(&self.table, &prepared, queue::now_millis())?;

        if outcome.is_committed() && !write.enqueues.is_empty() {
            self.notify_queue();
        }
        Ok(outcome)
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Remove and return the earliest message ready at `now_ms`
    pub fn dequeue(&self, now_ms: u64) -> Result<Option<QueueMessage>> {
        let mut txn = self.table.begin()?;
        let message = match queue::take_ready(txn.as_mut(), now_ms) {
            Ok(message) => message,
            Err(e) => {
                txn.rollback()?;
                return Err(e);
            }
        };
        txn.commit()?;
        Ok(message)
    }

    /// Settle a dequeued message
    ///
    /// A successful delivery needs no further work. A failed one is
    /// rescheduled along its backoff schedule, or written to its undelivered
    /// keys once the schedule is exhausted.
    pub fn finish(&self, message: QueueMessage, success: bool, now_ms: u64) -> Result<()> {
        if success {
            return Ok(());
        }

        let rescheduled = !message.backoff_remaining().is_empty();
        let mut txn = self.table.begin()?;
        if let Err(e) = queue::finish(txn.as_mut(), message, now_ms) {
            txn.rollback()?;
            return Err(e);
        }
        txn.commit()?;

        if rescheduled {
            self.notify_queue();
        }
        Ok(())
    }

    /// Block until a message is ready or `timeout` elapses
    pub fn dequeue_wait(&self, timeout: Duration) -> Result<Option<QueueMessage>> {
        let deadline = Instant::now() + timeout;

        loop {
            let now_ms = queue::now_millis();
            if let Some(message) = self.dequeue(now_ms)? {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let mut wait = deadline - now;
            if let Some(ready_at) = queue::peek_ready_at(&self.table)? {
                wait = wait.min(Duration::from_millis(ready_at.saturating_sub(now_ms).max(1)));
            }

            match self.queue_waiter.recv_timeout(wait) {
                Ok(()) | Err(channel::RecvTimeoutError::Timeout) => {}
                Err(channel::RecvTimeoutError::Disconnected) => {
                    return Err(KvError::IllegalState(
                        "queue signal channel disconnected".to_string(),
                    ));
                }
            }
        }
    }

    fn notify_queue(&self) {
        // Full means a wakeup is already pending.
        let _ = self.queue_signal.try_send(());
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
