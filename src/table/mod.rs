//! Table Module
//!
//! The versioned, transactional table the engine runs on.
//!
//! ## Responsibilities
//! - Ordered rows keyed by opaque (already encoded) byte strings
//! - Transactions with point get/set/delete and bounded range scans
//! - Ownership of the single global version counter
//!
//! The engine only talks to the [`VersionedTable`] and [`TableTxn`] traits;
//! [`LocalTable`] is the bundled implementation (in-memory or WAL-backed).

mod local;

pub use local::LocalTable;

use crate::error::Result;
use crate::value::ValueEncoding;

/// A stored row as returned by scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub encoding: ValueEncoding,
    /// Global version of the write that last touched this row
    pub version: u64,
}

/// Read-mode hint passed through to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Observe every write committed before the read started
    #[default]
    Strong,

    /// A possibly stale but consistent snapshot is acceptable
    Eventual,
}

/// One bounded scan over `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// Inclusive lower bound
    pub start: Vec<u8>,
    /// Exclusive upper bound
    pub end: Vec<u8>,
    /// Maximum rows returned
    pub limit: usize,
    /// Return rows in descending key order (the highest `limit` rows)
    pub reverse: bool,
}

/// A transactional, ordered table with a global version counter
pub trait VersionedTable: Send + Sync {
    /// Start a transaction
    ///
    /// Nothing written inside it is visible to others until
    /// [`TableTxn::commit`]; dropping it without committing rolls back.
    fn begin(&self) -> Result<Box<dyn TableTxn + '_>>;

    /// Scan committed rows outside any transaction
    fn range_scan(&self, scan: &ScanRange, consistency: Consistency) -> Result<Vec<Row>>;
}

/// Operations available inside a transaction
pub trait TableTxn {
    /// Version of the row at `key`, `None` if absent
    fn get_version(&mut self, key: &[u8]) -> Result<Option<u64>>;

    fn point_get(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, ValueEncoding)>>;

    fn point_set(
        &mut self,
        key: &[u8],
        value: &[u8],
        encoding: ValueEncoding,
        version: u64,
    ) -> Result<()>;

    /// Remove the row at `key`, reporting whether it existed
    fn point_delete(&mut self, key: &[u8]) -> Result<bool>;

    fn range_scan(&mut self, scan: &ScanRange) -> Result<Vec<Row>>;

    /// Atomically increment the global version counter and return the new value
    fn next_global_version(&mut self) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}
