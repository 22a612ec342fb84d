//! # StampKV
//!
//! An embedded, transactional key-value store with:
//! - Order-preserving tuple keys
//! - Check-and-mutate atomic writes stamped with a global version
//! - Lazy, batched, cursor-resumable range listing
//! - Write-Ahead Logging (WAL) with torn-tail recovery
//! - Best-effort message queue stored alongside the data
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │        get / snapshot_read / list / atomic_write / queue    │
//! └───────┬──────────────────────┬──────────────────────┬───────┘
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!  ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//!  │    write    │        │    read     │        │    queue    │
//!  │ checks/muts │        │ selectors,  │        │ enqueue,    │
//!  │ versionstamp│        │ cursors     │        │ backoff     │
//!  └──────┬──────┘        └──────┬──────┘        └──────┬──────┘
//!         │      key codec (tuple ⇄ bytes)              │
//!         └──────────────────────┬──────────────────────┘
//!                                ▼
//!                    ┌───────────────────────┐
//!                    │   VersionedTable      │
//!                    │ (LocalTable: BTreeMap │
//!                    │  + global version)    │
//!                    └───────────┬───────────┘
//!                                ▼
//!                         ┌─────────────┐
//!                         │     WAL     │
//!                         └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod value;
pub mod entry;

pub mod wal;
pub mod table;

pub mod write;
pub mod read;
pub mod queue;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, Limits, WalSyncStrategy};
pub use key::{Key, KeyPart};
pub use value::{Value, ValueEncoding};
pub use entry::{Entry, Versionstamp};
pub use table::{Consistency, LocalTable, VersionedTable};
pub use write::{AtomicWrite, CheckFailure, CommitOutcome, CommitResult, MutationKind};
pub use read::{ListIterator, ListOptions, ReadRange, Selector};
pub use queue::{Enqueue, QueueMessage};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StampKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
