//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! A failed append leaves no trace: the file is cut back to its length
//! before the append and any buffered bytes are discarded. If that cleanup
//! fails too, the writer refuses further appends until it is reopened.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

use super::{WalEntry, WalRecord};

/// Writes entries to the WAL file
pub struct WalWriter {
    file: BufWriter<File>,
    path: PathBuf,
    /// LSN the next appended entry receives
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last fsync
    unsynced: usize,
    /// File length in bytes, covering only fully appended frames
    size: u64,
    /// Set when a failed append could not be undone
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file, appending after any existing content
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        let mut file = BufWriter::new(file);
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            next_lsn: next_lsn.max(1),
            sync_strategy,
            unsynced: 0,
            size,
            poisoned: false,
        })
    }

    /// Append a record to the WAL, returning the LSN it was assigned
    ///
    /// The frame is flushed to the OS before returning; fsync follows the
    /// configured strategy. On error the WAL is unchanged and the LSN is
    /// not consumed.
    pub fn append(&mut self, record: WalRecord) -> Result<u64> {
        if self.poisoned {
            return Err(KvError::Storage(format!(
                "WAL {} is unusable after a failed append; reopen required",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, record).encode()?;
        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count.max(1),
        };

        if let Err(e) = self.write_frame(&frame, due) {
            if let Err(cleanup) = self.discard_tail() {
                tracing::error!(
                    "WAL {}: could not undo failed append ({}); refusing further writes",
                    self.path.display(),
                    cleanup
                );
                self.poisoned = true;
            }
            return Err(e);
        }

        self.next_lsn += 1;
        self.size += frame.len() as u64;
        self.unsynced = if due { 0 } else { self.unsynced + 1 };

        Ok(lsn)
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> Result<()> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if sync {
            self.file.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Drop unwritten buffer contents and cut the file back to `size`
    fn discard_tail(&mut self) -> Result<()> {
        let handle = self.file.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.file, BufWriter::new(handle));
        // into_parts hands back the inner file without flushing the buffer
        let (file, _unwritten) = stale.into_parts();
        file.set_len(self.size)?;
        file.sync_data()?;
        self.file.seek(SeekFrom::Start(self.size))?;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Discard all entries
    pub fn truncate(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.get_ref().sync_all()?;
        self.size = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN the next appended entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Current file length in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the writer at `path` after its file was renamed there
    pub(crate) fn renamed_to(mut self, path: &Path) -> Self {
        self.path = path.to_path_buf();
        self
    }
}
