//! Queue Module
//!
//! Best-effort message storage on top of the versioned table.
//!
//! ## Responsibilities
//! - Persist messages enqueued by atomic writes, in the same transaction
//! - Hand out the earliest ready message
//! - Reschedule failed deliveries along a backoff schedule, then fall back
//!   to writing the payload under the message's undelivered keys
//!
//! ## Row Layout
//! ```text
//! ┌──────────┬────────────────┬──────────────────┬───────────┐
//! │ 0xFF 'q' │ ready_at (8,BE)│ versionstamp (10)│ index (2) │
//! └──────────┴────────────────┴──────────────────┴───────────┘
//! ```
//! Encoded user keys never start with `0xFF`, so queue rows are invisible
//! to every selector.

mod message;

pub use message::{Enqueue, QueueMessage, DEFAULT_BACKOFF_SCHEDULE};

pub(crate) use message::{finish, peek_ready_at, prepare, stage, take_ready, PreparedEnqueue};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
