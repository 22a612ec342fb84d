//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::ValueEncoding;

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload accepted when reading a frame (256 MB)
pub const MAX_ENTRY_SIZE: u32 = 256 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// What was committed
    pub record: WalRecord,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Record kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    /// One committed transaction: its redo operations and the global version
    /// after it committed
    Commit { version: u64, ops: Vec<Operation> },

    /// Full table image; replaces everything replayed before it
    Snapshot { version: u64, rows: Vec<Operation> },
}

/// Row-level operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Write a row
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        encoding: ValueEncoding,
        version: u64,
    },

    /// Remove a row
    Delete { key: Vec<u8> },
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, record: WalRecord) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            record,
            timestamp,
        }
    }

    /// Encode as a complete frame (header + payload)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let crc = Self::compute_crc(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode the payload portion of a frame
    pub fn decode_payload(payload: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(payload)?)
    }

    /// CRC32 over a payload
    pub fn compute_crc(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }

    /// Global version reached once this entry is applied
    pub fn version(&self) -> u64 {
        match &self.record {
            WalRecord::Commit { version, .. } | WalRecord::Snapshot { version, .. } => *version,
        }
    }
}
