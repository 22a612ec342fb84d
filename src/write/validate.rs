//! Write validation
//!
//! Enforces request limits and encodes keys before a transaction opens.

use crate::config::Limits;
use crate::entry::Versionstamp;
use crate::error::{KvError, Result};
use crate::key::{encode_key, Key};
use crate::queue::{self, PreparedEnqueue};
use crate::value::{encode_value, ValueEncoding};

use super::{AtomicWrite, MutationKind};

/// An [`AtomicWrite`] that passed validation, with keys already encoded
pub(crate) struct PreparedWrite {
    pub checks: Vec<PreparedCheck>,
    pub mutations: Vec<PreparedMutation>,
    pub enqueues: Vec<PreparedEnqueue>,
}

pub(crate) struct PreparedCheck {
    pub key: Key,
    pub raw_key: Vec<u8>,
    pub versionstamp: Option<Versionstamp>,
}

pub(crate) struct PreparedMutation {
    pub key: Key,
    pub raw_key: Vec<u8>,
    pub op: PreparedOp,
}

pub(crate) enum PreparedOp {
    Set {
        value: Vec<u8>,
        encoding: ValueEncoding,
    },
    Delete,
    Sum(u64),
    Min(u64),
    Max(u64),
}

/// Validate `write` against `limits`
pub(crate) fn prepare(write: &AtomicWrite, limits: &Limits) -> Result<PreparedWrite> {
    if write.checks.len() > limits.max_checks {
        return Err(KvError::validation(format!(
            "too many checks: {} (max {})",
            write.checks.len(),
            limits.max_checks
        )));
    }
    let mutation_count = write.mutations.len() + write.enqueues.len();
    if mutation_count > limits.max_mutations {
        return Err(KvError::validation(format!(
            "too many mutations: {} (max {})",
            mutation_count, limits.max_mutations
        )));
    }

    let mut total_size = 0usize;

    let mut checks = Vec::with_capacity(write.checks.len());
    for check in &write.checks {
        let raw_key = encode_key(&check.key)?;
        if raw_key.len() > limits.max_read_key_size {
            return Err(key_too_large("check", &check.key, raw_key.len(), limits.max_read_key_size));
        }
        total_size += raw_key.len();
        checks.push(PreparedCheck {
            key: check.key.clone(),
            raw_key,
            versionstamp: check.versionstamp,
        });
    }

    let mut mutations = Vec::with_capacity(write.mutations.len());
    for mutation in &write.mutations {
        let raw_key = encode_write_key(&mutation.key, limits)?;
        total_size += raw_key.len();

        let op = match &mutation.kind {
            MutationKind::Set(value) => {
                let (encoding, bytes) = encode_value(value);
                if bytes.len() > limits.max_value_size {
                    return Err(KvError::validation(format!(
                        "value for key {} too large: {} bytes (max {})",
                        mutation.key,
                        bytes.len(),
                        limits.max_value_size
                    )));
                }
                total_size += bytes.len();
                PreparedOp::Set {
                    value: bytes,
                    encoding,
                }
            }
            MutationKind::Delete => PreparedOp::Delete,
            MutationKind::Sum(n) => PreparedOp::Sum(*n),
            MutationKind::Min(n) => PreparedOp::Min(*n),
            MutationKind::Max(n) => PreparedOp::Max(*n),
        };

        mutations.push(PreparedMutation {
            key: mutation.key.clone(),
            raw_key,
            op,
        });
    }

    let mut enqueues = Vec::with_capacity(write.enqueues.len());
    for enqueue in &write.enqueues {
        let prepared = queue::prepare(enqueue, limits)?;
        total_size += prepared.size();
        enqueues.push(prepared);
    }

    if total_size > limits.max_total_mutation_size {
        return Err(KvError::validation(format!(
            "total mutation size too large: {} bytes (max {})",
            total_size, limits.max_total_mutation_size
        )));
    }

    Ok(PreparedWrite {
        checks,
        mutations,
        enqueues,
    })
}

/// Encode a key that will be written
pub(crate) fn encode_write_key(key: &Key, limits: &Limits) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(KvError::validation("key cannot be empty"));
    }
    let raw_key = encode_key(key)?;
    if raw_key.len() > limits.max_write_key_size {
        return Err(key_too_large("write", key, raw_key.len(), limits.max_write_key_size));
    }
    Ok(raw_key)
}

fn key_too_large(what: &str, key: &Key, size: usize, max: usize) -> KvError {
    KvError::validation(format!(
        "{} key {} too large: {} bytes (max {})",
        what, key, size, max
    ))
}
