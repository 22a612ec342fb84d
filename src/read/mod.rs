//! Read Module
//!
//! Point reads, bounded snapshot reads, and resumable listing.
//!
//! ## Responsibilities
//! - Translate selectors into encoded `[start, end)` byte ranges
//! - Validate read limits before any scan
//! - Drive batched scans through [`ListIterator`]
//! - Produce and consume opaque resume cursors

mod cursor;
mod iterator;
mod selector;

pub use iterator::{ListIterator, ListOptions};
pub use selector::Selector;

pub(crate) use selector::SelectorBounds;

use crate::config::Limits;
use crate::entry::{Entry, Versionstamp};
use crate::error::{KvError, Result};
use crate::key::{decode_key, encode_key, Key};
use crate::table::{Consistency, Row, ScanRange, VersionedTable};
use crate::value::decode_value;

/// One bounded range of a snapshot read, over encoded keys `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub limit: usize,
    pub reverse: bool,
}

impl ReadRange {
    /// The range holding exactly `key`
    pub fn point(key: &Key) -> Result<Self> {
        let start = encode_key(key)?;
        let mut end = start.clone();
        end.push(0x00);
        Ok(Self {
            start,
            end,
            limit: 1,
            reverse: false,
        })
    }

    /// The range a selector covers
    pub fn from_selector(selector: &Selector, limit: usize, reverse: bool) -> Result<Self> {
        let bounds = selector.bounds()?;
        Ok(Self {
            start: bounds.start,
            end: bounds.end,
            limit,
            reverse,
        })
    }

    fn to_scan(&self) -> ScanRange {
        ScanRange {
            start: self.start.clone(),
            end: self.end.clone(),
            limit: self.limit,
            reverse: self.reverse,
        }
    }
}

/// Read several ranges, validating every range before the first scan
pub(crate) fn snapshot_read<T: VersionedTable + ?Sized>(
    table: &T,
    ranges: &[ReadRange],
    consistency: Consistency,
    limits: &Limits,
) -> Result<Vec<Vec<Entry>>> {
    if ranges.len() > limits.max_read_ranges {
        return Err(KvError::validation(format!(
            "too many ranges: {} (max {})",
            ranges.len(),
            limits.max_read_ranges
        )));
    }
    for range in ranges {
        if range.limit == 0 || range.limit > limits.max_read_entries {
            return Err(KvError::validation(format!(
                "range limit must be between 1 and {}, got {}",
                limits.max_read_entries, range.limit
            )));
        }
        check_read_key_size(&range.start, limits)?;
        check_read_key_size(&range.end, limits)?;
    }

    ranges
        .iter()
        .map(|range| {
            table
                .range_scan(&range.to_scan(), consistency)?
                .into_iter()
                .map(row_to_entry)
                .collect()
        })
        .collect()
}

pub(crate) fn check_read_key_size(key: &[u8], limits: &Limits) -> Result<()> {
    if key.len() > limits.max_read_key_size {
        return Err(KvError::validation(format!(
            "read key too large: {} bytes (max {})",
            key.len(),
            limits.max_read_key_size
        )));
    }
    Ok(())
}

/// Decode a stored row into a caller-visible entry
pub(crate) fn row_to_entry(row: Row) -> Result<Entry> {
    Ok(Entry {
        key: decode_key(&row.key)?,
        value: decode_value(row.encoding, &row.value)?,
        versionstamp: Versionstamp::from_version(row.version),
    })
}
