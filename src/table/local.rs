//! Local table
//!
//! BTreeMap-backed [`VersionedTable`], optionally made durable by the WAL.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};

use crate::config::{Config, WalSyncStrategy};
use crate::error::{KvError, Result};
use crate::value::ValueEncoding;
use crate::wal::{Operation, WalRecord, WalRecovery, WalWriter};

use super::{Consistency, Row, ScanRange, TableTxn, VersionedTable};

/// Ordered in-process table
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Transactions** hold the state lock from `begin` until commit or
///   rollback, so they are serialized and never observe each other's
///   partial effects.
/// - **Scans** take the same lock briefly per call; they see only committed
///   state because a transaction's writes are undone before its lock is
///   released unless it commits.
///
/// Lock order is always state → WAL.
pub struct LocalTable {
    /// Rows and the global version counter
    state: Mutex<TableState>,

    /// Present for durable tables
    wal: Option<Mutex<WalWriter>>,

    sync_strategy: WalSyncStrategy,

    /// WAL size that triggers a checkpoint after commit
    checkpoint_threshold: u64,
}

#[derive(Default)]
struct TableState {
    rows: BTreeMap<Vec<u8>, StoredRow>,
    version: u64,
}

#[derive(Debug, Clone)]
struct StoredRow {
    value: Vec<u8>,
    encoding: ValueEncoding,
    version: u64,
}

impl TableState {
    fn apply(&mut self, op: Operation) {
        match op {
            Operation::Set {
                key,
                value,
                encoding,
                version,
            } => {
                self.rows.insert(
                    key,
                    StoredRow {
                        value,
                        encoding,
                        version,
                    },
                );
            }
            Operation::Delete { key } => {
                self.rows.remove(&key);
            }
        }
    }

    fn replay(&mut self, record: WalRecord) {
        match record {
            WalRecord::Commit { version, ops } => {
                for op in ops {
                    self.apply(op);
                }
                self.version = version;
            }
            WalRecord::Snapshot { version, rows } => {
                self.rows.clear();
                for op in rows {
                    self.apply(op);
                }
                self.version = version;
            }
        }
    }

    fn scan(&self, scan: &ScanRange) -> Vec<Row> {
        if scan.limit == 0 || scan.start >= scan.end {
            return Vec::new();
        }

        let range = self.rows.range::<[u8], _>((
            Bound::Included(scan.start.as_slice()),
            Bound::Excluded(scan.end.as_slice()),
        ));
        let to_row = |(key, row): (&Vec<u8>, &StoredRow)| Row {
            key: key.clone(),
            value: row.value.clone(),
            encoding: row.encoding,
            version: row.version,
        };

        if scan.reverse {
            range.rev().take(scan.limit).map(to_row).collect()
        } else {
            range.take(scan.limit).map(to_row).collect()
        }
    }

    fn snapshot_rows(&self) -> Vec<Operation> {
        self.rows
            .iter()
            .map(|(key, row)| Operation::Set {
                key: key.clone(),
                value: row.value.clone(),
                encoding: row.encoding,
                version: row.version,
            })
            .collect()
    }
}

impl LocalTable {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const CHECKPOINT_FILENAME: &'static str = "wal.log.tmp";

    /// Create a table that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            wal: None,
            sync_strategy: WalSyncStrategy::EveryWrite,
            checkpoint_threshold: u64::MAX,
        }
    }

    /// Open or create a durable table under `config.data_dir`
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Recover the WAL, truncating any torn tail
    /// 3. Replay recovered records into memory
    /// 4. Reopen the WAL for appends
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let mut state = TableState::default();
        let mut next_lsn = 1;

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::debug!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }
            for entry in entries {
                state.replay(entry.record);
            }
            next_lsn = recovery.last_lsn + 1;
        }

        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy, next_lsn)?;

        tracing::debug!(
            "Opened table at {} ({} rows, version {})",
            config.data_dir.display(),
            state.rows.len(),
            state.version
        );

        Ok(Self {
            state: Mutex::new(state),
            wal: Some(Mutex::new(wal)),
            sync_strategy: config.wal_sync_strategy,
            checkpoint_threshold: config.wal_checkpoint_threshold,
        })
    }

    /// Current global version
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    /// Current WAL size in bytes (0 for in-memory tables)
    pub fn wal_size(&self) -> u64 {
        self.wal.as_ref().map(|wal| wal.lock().size()).unwrap_or(0)
    }

    /// Rewrite the WAL as a single snapshot record
    pub fn checkpoint(&self) -> Result<()> {
        let state = self.state.lock();
        self.checkpoint_locked(&state)
    }

    /// Checkpoint with the state lock already held
    fn checkpoint_locked(&self, state: &TableState) -> Result<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        let mut wal = wal.lock();

        let path = wal.path().to_path_buf();
        let tmp_path = path
            .parent()
            .map(|dir| dir.join(Self::CHECKPOINT_FILENAME))
            .unwrap_or_else(|| PathBuf::from(Self::CHECKPOINT_FILENAME));
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        // The snapshot writer becomes the live WAL; nothing is opened after
        // the rename.
        let lsn = wal.current_lsn();
        let mut snapshot = WalWriter::open(&tmp_path, self.sync_strategy, lsn)?;
        snapshot.append(WalRecord::Snapshot {
            version: state.version,
            rows: state.snapshot_rows(),
        })?;
        snapshot.sync()?;
        fs::rename(&tmp_path, &path)?;

        let previous_size = wal.size();
        *wal = snapshot.renamed_to(&path);
        sync_parent_dir(&path)?;

        tracing::info!(
            "Checkpointed WAL: {} rows at version {}, {} -> {} bytes",
            state.rows.len(),
            state.version,
            previous_size,
            wal.size()
        );
        Ok(())
    }
}

/// Persist a rename by syncing the directory that holds `path`
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

impl VersionedTable for LocalTable {
    fn begin(&self) -> Result<Box<dyn TableTxn + '_>> {
        Ok(Box::new(LocalTxn {
            table: self,
            state: self.state.lock(),
            undo: Vec::new(),
            redo: Vec::new(),
            finished: false,
        }))
    }

    /// Both consistency modes read the latest committed state; a single
    /// process has no stale replicas to serve eventual reads from.
    fn range_scan(&self, scan: &ScanRange, consistency: Consistency) -> Result<Vec<Row>> {
        let state = self.state.lock();
        let rows = state.scan(scan);
        tracing::trace!(
            "Scan ({:?}, reverse={}, limit={}) returned {} rows",
            consistency,
            scan.reverse,
            scan.limit,
            rows.len()
        );
        Ok(rows)
    }
}

// =============================================================================
// Transactions
// =============================================================================

enum Undo {
    Row {
        key: Vec<u8>,
        previous: Option<StoredRow>,
    },
    Version(u64),
}

/// A transaction holding the table's state lock
struct LocalTxn<'a> {
    table: &'a LocalTable,
    state: MutexGuard<'a, TableState>,
    /// Inverse of every change, applied newest-first on rollback
    undo: Vec<Undo>,
    /// Row operations to log on commit
    redo: Vec<Operation>,
    finished: bool,
}

impl LocalTxn<'_> {
    fn undo_all(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Row {
                    key,
                    previous: Some(row),
                } => {
                    self.state.rows.insert(key, row);
                }
                Undo::Row {
                    key,
                    previous: None,
                } => {
                    self.state.rows.remove(&key);
                }
                Undo::Version(version) => self.state.version = version,
            }
        }
        self.redo.clear();
    }
}

impl TableTxn for LocalTxn<'_> {
    fn get_version(&mut self, key: &[u8]) -> Result<Option<u64>> {
        Ok(self.state.rows.get(key).map(|row| row.version))
    }

    fn point_get(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, ValueEncoding)>> {
        Ok(self
            .state
            .rows
            .get(key)
            .map(|row| (row.value.clone(), row.encoding)))
    }

    fn point_set(
        &mut self,
        key: &[u8],
        value: &[u8],
        encoding: ValueEncoding,
        version: u64,
    ) -> Result<()> {
        let previous = self.state.rows.insert(
            key.to_vec(),
            StoredRow {
                value: value.to_vec(),
                encoding,
                version,
            },
        );
        self.undo.push(Undo::Row {
            key: key.to_vec(),
            previous,
        });
        self.redo.push(Operation::Set {
            key: key.to_vec(),
            value: value.to_vec(),
            encoding,
            version,
        });
        Ok(())
    }

    fn point_delete(&mut self, key: &[u8]) -> Result<bool> {
        match self.state.rows.remove(key) {
            Some(previous) => {
                self.undo.push(Undo::Row {
                    key: key.to_vec(),
                    previous: Some(previous),
                });
                self.redo.push(Operation::Delete { key: key.to_vec() });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn range_scan(&mut self, scan: &ScanRange) -> Result<Vec<Row>> {
        Ok(self.state.scan(scan))
    }

    fn next_global_version(&mut self) -> Result<u64> {
        let previous = self.state.version;
        let next = previous
            .checked_add(1)
            .ok_or_else(|| KvError::Storage("global version counter exhausted".to_string()))?;
        self.undo.push(Undo::Version(previous));
        self.state.version = next;
        Ok(next)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let table = self.table;
        let mut wal_size = 0;

        if let Some(wal) = &table.wal {
            if !self.undo.is_empty() {
                let record = WalRecord::Commit {
                    version: self.state.version,
                    ops: std::mem::take(&mut self.redo),
                };
                let mut wal = wal.lock();
                if let Err(e) = wal.append(record) {
                    drop(wal);
                    self.undo_all();
                    self.finished = true;
                    return Err(e);
                }
                wal_size = wal.size();
            }
        }

        self.undo.clear();
        self.redo.clear();
        self.finished = true;

        if wal_size > 0 && wal_size >= table.checkpoint_threshold {
            // The commit is already durable; a failed checkpoint leaves the
            // longer log in place.
            if let Err(e) = table.checkpoint_locked(&self.state) {
                tracing::warn!("WAL checkpoint failed: {}", e);
            }
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.undo_all();
        self.finished = true;
        Ok(())
    }
}

impl Drop for LocalTxn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Transaction dropped before commit; rolling back");
            self.undo_all();
        }
    }
}
