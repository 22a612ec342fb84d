//! List iterator
//!
//! Lazy, batched, resumable iteration over a selector.
//!
//! ## State Machine
//! ```text
//!            ┌────────────── pending non-empty ──────────────┐
//!            ▼                                               │
//!   next() ─► pending empty? ─ yes ─► last batch short? ─ yes ─► Done
//!            │                          │ no
//!            │                          ▼
//!            │                   scan next batch ─ empty / error ─► Done
//!            │                          │
//!            │                          ▼
//!            │                   advance bound past last row
//!            ▼
//!   pop front, remember key, count toward limit ─ limit hit ─► Done
//! ```
//! `Done` is terminal: no further scans are issued. A row that fails to
//! decode ends its batch; the rows before it are yielded first, then the
//! error.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use crate::config::Limits;
use crate::entry::Entry;
use crate::error::{KvError, Result};
use crate::table::{Consistency, ScanRange, VersionedTable};

use super::cursor::{apply_cursor, encode_cursor};
use super::{check_read_key_size, row_to_entry, Selector, SelectorBounds};

/// Options for [`Engine::list`](crate::Engine::list)
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum entries yielded in total
    pub limit: Option<usize>,
    /// Iterate in descending key order
    pub reverse: bool,
    pub consistency: Consistency,
    /// Rows fetched per scan; the configured default when unset
    pub batch_size: Option<usize>,
    /// Resume after the entry this cursor was taken at
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// Iterator over the entries of a selector
///
/// Yields `Result<Entry>`; a scan or decode error is yielded once and ends
/// the iteration.
pub struct ListIterator<'a, T: VersionedTable + ?Sized> {
    table: &'a T,
    /// Bounds of the next scan; narrowed after every batch
    bounds: SelectorBounds,
    reverse: bool,
    consistency: Consistency,
    batch_size: usize,
    /// Entries still allowed by the limit (`None`: unlimited)
    remaining: Option<usize>,

    /// Decoded rows of the current batch, paired with their encoded keys
    pending: VecDeque<(Vec<u8>, Entry)>,
    last_yielded_key: Option<Vec<u8>>,
    last_batch_short: bool,
    /// Decode failure to report once `pending` drains
    deferred_error: Option<KvError>,
    done: bool,
}

impl<'a, T: VersionedTable + ?Sized> ListIterator<'a, T> {
    /// Validate the request and position the iterator; no scan happens here
    pub(crate) fn new(
        table: &'a T,
        selector: &Selector,
        options: ListOptions,
        default_batch_size: usize,
        limits: &Limits,
    ) -> Result<Self> {
        let batch_size = options.batch_size.unwrap_or(default_batch_size);
        if batch_size == 0 || batch_size > limits.max_read_entries {
            return Err(KvError::validation(format!(
                "batch size must be between 1 and {}, got {}",
                limits.max_read_entries, batch_size
            )));
        }

        let mut bounds = selector.bounds()?;
        check_read_key_size(&bounds.start, limits)?;
        check_read_key_size(&bounds.end, limits)?;
        if let Some(cursor) = &options.cursor {
            apply_cursor(&mut bounds, cursor, options.reverse)?;
        }

        Ok(Self {
            table,
            bounds,
            reverse: options.reverse,
            consistency: options.consistency,
            batch_size,
            remaining: options.limit,
            pending: VecDeque::new(),
            last_yielded_key: None,
            last_batch_short: false,
            deferred_error: None,
            done: options.limit == Some(0),
        })
    }

    /// Cursor positioned after the most recently yielded entry
    ///
    /// Only valid once at least one entry has been yielded.
    pub fn cursor(&self) -> Result<String> {
        match &self.last_yielded_key {
            Some(key) => encode_cursor(&self.bounds, key),
            None => Err(KvError::IllegalState(
                "cursor requested before any entry was yielded".to_string(),
            )),
        }
    }

    /// Whether iteration has finished
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next batch into `pending`
    fn fetch_batch(&mut self) -> Result<()> {
        let limit = match self.remaining {
            Some(remaining) => remaining.min(self.batch_size),
            None => self.batch_size,
        };
        let scan = ScanRange {
            start: self.bounds.start.clone(),
            end: self.bounds.end.clone(),
            limit,
            reverse: self.reverse,
        };
        let rows = self.table.range_scan(&scan, self.consistency)?;

        self.last_batch_short = rows.len() < limit;

        for row in rows {
            let raw_key = row.key.clone();
            match row_to_entry(row) {
                Ok(entry) => {
                    self.advance_past(&raw_key);
                    self.pending.push_back((raw_key, entry));
                }
                Err(e) => {
                    // Rows decoded so far are still yielded before the error.
                    self.deferred_error = Some(e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Narrow the scan bounds to exclude `key` and everything before it
    fn advance_past(&mut self, key: &[u8]) {
        if self.reverse {
            self.bounds.end = key.to_vec();
        } else {
            let mut next_start = key.to_vec();
            next_start.push(0x00);
            self.bounds.start = next_start;
        }
    }
}

impl<T: VersionedTable + ?Sized> Iterator for ListIterator<'_, T> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.pending.is_empty() {
            if let Some(e) = self.deferred_error.take() {
                self.done = true;
                return Some(Err(e));
            }
            if self.last_batch_short {
                self.done = true;
                return None;
            }
            if let Err(e) = self.fetch_batch() {
                self.done = true;
                self.pending.clear();
                return Some(Err(e));
            }
            if self.pending.is_empty() {
                self.done = true;
                return None;
            }
        }

        let (raw_key, entry) = self.pending.pop_front()?;
        self.last_yielded_key = Some(raw_key);

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.done = true;
                self.pending.clear();
            }
        }

        Some(Ok(entry))
    }
}

impl<T: VersionedTable + ?Sized> FusedIterator for ListIterator<'_, T> {}
