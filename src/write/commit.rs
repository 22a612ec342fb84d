//! Atomic write execution
//!
//! Runs a validated write inside one table transaction.

use crate::entry::Versionstamp;
use crate::error::{KvError, Result};
use crate::key::Key;
use crate::queue;
use crate::table::{TableTxn, VersionedTable};
use crate::value::{decode_u64, encode_u64, ValueEncoding};

use super::validate::{PreparedMutation, PreparedOp, PreparedWrite};
use super::{CheckFailure, CommitOutcome, CommitResult};

enum Applied {
    Committed(Versionstamp),
    CheckFailed(Vec<Key>),
}

/// Execute `write` as a single transaction against `table`
///
/// Any error rolls the transaction back before it is returned; a failed
/// check is not an error.
pub(crate) fn commit<T: VersionedTable + ?Sized>(
    table: &T,
    write: &PreparedWrite,
    now_ms: u64,
) -> Result<CommitOutcome> {
    let mut txn = table.begin()?;

    match apply(txn.as_mut(), write, now_ms) {
        Ok(Applied::Committed(versionstamp)) => {
            txn.commit()?;
            tracing::debug!(
                "Committed {} at {} ({} checks, {} mutations, {} enqueues)",
                versionstamp,
                versionstamp.version(),
                write.checks.len(),
                write.mutations.len(),
                write.enqueues.len()
            );
            Ok(CommitOutcome::Committed(CommitResult { versionstamp }))
        }
        Ok(Applied::CheckFailed(failed_keys)) => {
            txn.rollback()?;
            tracing::debug!("Atomic write rejected: {} check(s) failed", failed_keys.len());
            Ok(CommitOutcome::CheckFailed(CheckFailure { failed_keys }))
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback() {
                tracing::warn!("Rollback after '{}' failed: {}", e, rollback_err);
            }
            Err(e)
        }
    }
}

fn apply(txn: &mut dyn TableTxn, write: &PreparedWrite, now_ms: u64) -> Result<Applied> {
    let mut failed_keys = Vec::new();
    for check in &write.checks {
        let observed = txn
            .get_version(&check.raw_key)?
            .map(Versionstamp::from_version);
        if observed != check.versionstamp {
            failed_keys.push(check.key.clone());
        }
    }
    if !failed_keys.is_empty() {
        return Ok(Applied::CheckFailed(failed_keys));
    }

    let version = txn.next_global_version()?;

    for mutation in &write.mutations {
        apply_mutation(txn, mutation, version)?;
    }
    for (index, enqueue) in write.enqueues.iter().enumerate() {
        queue::stage(txn, enqueue, version, index, now_ms)?;
    }

    Ok(Applied::Committed(Versionstamp::from_version(version)))
}

fn apply_mutation(txn: &mut dyn TableTxn, mutation: &PreparedMutation, version: u64) -> Result<()> {
    let key = mutation.raw_key.as_slice();
    match &mutation.op {
        PreparedOp::Set { value, encoding } => txn.point_set(key, value, *encoding, version),
        PreparedOp::Delete => txn.point_delete(key).map(|_| ()),
        PreparedOp::Sum(operand) => {
            let next = match read_u64(txn, mutation)? {
                Some(current) => current.wrapping_add(*operand),
                None => *operand,
            };
            txn.point_set(key, &encode_u64(next), ValueEncoding::U64, version)
        }
        PreparedOp::Min(operand) => {
            let next = match read_u64(txn, mutation)? {
                Some(current) => current.min(*operand),
                None => *operand,
            };
            txn.point_set(key, &encode_u64(next), ValueEncoding::U64, version)
        }
        PreparedOp::Max(operand) => {
            let next = match read_u64(txn, mutation)? {
                Some(current) => current.max(*operand),
                None => *operand,
            };
            txn.point_set(key, &encode_u64(next), ValueEncoding::U64, version)
        }
    }
}

/// Current numeric value of the mutated key, `None` if absent
fn read_u64(txn: &mut dyn TableTxn, mutation: &PreparedMutation) -> Result<Option<u64>> {
    match txn.point_get(&mutation.raw_key)? {
        None => Ok(None),
        Some((bytes, ValueEncoding::U64)) => decode_u64(&bytes).map(Some),
        Some((_, found)) => Err(KvError::TypeMismatch {
            key: mutation.key.to_string(),
            found,
        }),
    }
}
