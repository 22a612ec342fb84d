//! Atomic Write Module
//!
//! Check-and-mutate batches applied as one transaction.
//!
//! ## Commit Algorithm
//! ```text
//!   validate (limits, key/value sizes)        ── no storage access
//!        │
//!   begin transaction
//!        │
//!   every check: observed versionstamp == expected?
//!        │ no ──► rollback ──► CheckFailed
//!        │ yes
//!   next_global_version()                     ── exactly once
//!        │
//!   mutations in order, enqueues              ── all stamped with that version
//!        │ error ──► rollback ──► Err
//!   commit ──► Committed { versionstamp }
//! ```

mod commit;
mod validate;

pub(crate) use commit::commit;
pub(crate) use validate::{encode_write_key, prepare, PreparedWrite};

use crate::entry::Versionstamp;
use crate::key::Key;
use crate::queue::Enqueue;
use crate::value::Value;

/// A batch of checks, mutations and enqueues committed together
#[derive(Debug, Clone, Default)]
pub struct AtomicWrite {
    pub checks: Vec<Check>,
    pub mutations: Vec<Mutation>,
    pub enqueues: Vec<Enqueue>,
}

/// Require `key` to currently carry `versionstamp` (`None`: be absent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub key: Key,
    pub versionstamp: Option<Versionstamp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub key: Key,
    pub kind: MutationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Set(Value),
    Delete,
    /// Wrapping add; the operand is stored as-is when the key is absent
    Sum(u64),
    Min(u64),
    Max(u64),
}

impl AtomicWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, key: Key, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn mutate(mut self, key: Key, kind: MutationKind) -> Self {
        self.mutations.push(Mutation { key, kind });
        self
    }

    pub fn set(self, key: Key, value: impl Into<Value>) -> Self {
        self.mutate(key, MutationKind::Set(value.into()))
    }

    pub fn delete(self, key: Key) -> Self {
        self.mutate(key, MutationKind::Delete)
    }

    pub fn sum(self, key: Key, operand: u64) -> Self {
        self.mutate(key, MutationKind::Sum(operand))
    }

    pub fn min(self, key: Key, operand: u64) -> Self {
        self.mutate(key, MutationKind::Min(operand))
    }

    pub fn max(self, key: Key, operand: u64) -> Self {
        self.mutate(key, MutationKind::Max(operand))
    }

    pub fn enqueue(mut self, enqueue: Enqueue) -> Self {
        self.enqueues.push(enqueue);
        self
    }
}

/// A successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    /// Shared by every row the write touched
    pub versionstamp: Versionstamp,
}

/// Checks that did not hold; nothing was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub failed_keys: Vec<Key>,
}

/// Outcome of [`Engine::atomic_write`](crate::Engine::atomic_write)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitResult),
    CheckFailed(CheckFailure),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }

    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitOutcome::Committed(result) => Some(result.versionstamp),
            CommitOutcome::CheckFailed(_) => None,
        }
    }
}
