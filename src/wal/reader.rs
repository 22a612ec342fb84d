//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{KvError, Result};

use super::{WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset of the next unread frame
    position: u64,
    /// File length at open time
    len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file. A torn or corrupt frame
    /// yields [`KvError::WalCorruption`]; `position()` still points at its
    /// first byte.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let remaining = self.len - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Err(KvError::WalCorruption(format!(
                "torn header at offset {} ({} of {} bytes)",
                self.position, remaining, HEADER_SIZE
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        let lsn = u64::from_le_bytes(header[0..8].try_into().unwrap_or_default());
        let crc = u32::from_le_bytes(header[8..12].try_into().unwrap_or_default());
        let payload_len = u32::from_le_bytes(header[12..16].try_into().unwrap_or_default());

        if payload_len > MAX_ENTRY_SIZE {
            return Err(KvError::WalCorruption(format!(
                "entry at offset {} claims {} bytes (max {})",
                self.position, payload_len, MAX_ENTRY_SIZE
            )));
        }
        if remaining - (HEADER_SIZE as u64) < payload_len as u64 {
            return Err(KvError::WalCorruption(format!(
                "torn payload at offset {}: expected {} bytes",
                self.position, payload_len
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;

        if WalEntry::compute_crc(&payload) != crc {
            return Err(KvError::WalCorruption(format!(
                "checksum mismatch for LSN {} at offset {}",
                lsn, self.position
            )));
        }

        let entry = WalEntry::decode_payload(&payload).map_err(|e| {
            KvError::WalCorruption(format!("undecodable entry at offset {}: {}", self.position, e))
        })?;
        if entry.lsn != lsn {
            return Err(KvError::WalCorruption(format!(
                "header LSN {} does not match entry LSN {}",
                lsn, entry.lsn
            )));
        }

        self.position += (HEADER_SIZE + payload.len()) as u64;
        Ok(Some(entry))
    }

    /// Offset just past the last successfully read entry
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
