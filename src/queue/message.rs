//! Queue messages
//!
//! Staging, dequeueing and rescheduling of stored messages.

use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::entry::{Versionstamp, VERSIONSTAMP_SIZE};
use crate::error::{KvError, Result};
use crate::key::Key;
use crate::table::{Consistency, ScanRange, TableTxn, VersionedTable};
use crate::value::{decode_value, encode_value, Value, ValueEncoding};
use crate::write::encode_write_key;

/// Retry delays (ms) used when an enqueue does not specify its own
pub const DEFAULT_BACKOFF_SCHEDULE: [u32; 5] = [100, 1000, 5000, 30000, 60000];

const QUEUE_PREFIX: [u8; 2] = [0xff, b'q'];

/// First byte string past every queue row
const QUEUE_END: [u8; 2] = [0xff, b'q' + 1];

/// Versionstamp of the enqueuing write + index within it
const ID_SIZE: usize = VERSIONSTAMP_SIZE + 2;

const ROW_KEY_SIZE: usize = QUEUE_PREFIX.len() + 8 + ID_SIZE;

/// A message to enqueue as part of an atomic write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueue {
    pub payload: Value,
    /// Delay before the message becomes ready
    pub delay_ms: u64,
    /// Keys that receive the payload if every delivery attempt fails
    pub keys_if_undelivered: Vec<Key>,
    /// Delays between failed attempts; `None` uses [`DEFAULT_BACKOFF_SCHEDULE`]
    pub backoff_schedule: Option<Vec<u32>>,
}

impl Enqueue {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            delay_ms: 0,
            keys_if_undelivered: Vec::new(),
            backoff_schedule: None,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_keys_if_undelivered(mut self, keys: Vec<Key>) -> Self {
        self.keys_if_undelivered = keys;
        self
    }

    pub fn with_backoff_schedule(mut self, schedule: Vec<u32>) -> Self {
        self.backoff_schedule = Some(schedule);
        self
    }
}

/// Stored form of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueRecord {
    encoding: ValueEncoding,
    payload: Vec<u8>,
    keys_if_undelivered: Vec<Vec<u8>>,
    backoff_schedule: Vec<u32>,
    /// Failed deliveries so far
    failures: u32,
}

/// A validated enqueue, serialized and ready to stage
pub(crate) struct PreparedEnqueue {
    delay_ms: u64,
    encoded: Vec<u8>,
}

impl PreparedEnqueue {
    /// Bytes this message contributes to a write's total size
    pub(crate) fn size(&self) -> usize {
        ROW_KEY_SIZE + self.encoded.len()
    }
}

/// A message handed out by [`Engine::dequeue`](crate::Engine::dequeue)
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub payload: Value,
    /// 1 on first delivery, incremented on every retry
    pub attempt: u32,
    id: [u8; ID_SIZE],
    record: QueueRecord,
}

impl QueueMessage {
    /// Versionstamp of the write that enqueued this message
    pub fn versionstamp(&self) -> Versionstamp {
        Versionstamp::from_bytes(version_bytes(&self.id))
    }

    /// Remaining retry delays
    pub fn backoff_remaining(&self) -> &[u32] {
        &self.record.backoff_schedule
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Validate an enqueue against `limits`
pub(crate) fn prepare(enqueue: &Enqueue, limits: &Limits) -> Result<PreparedEnqueue> {
    if enqueue.delay_ms > limits.max_queue_delay_ms {
        return Err(KvError::validation(format!(
            "queue delay too long: {} ms (max {})",
            enqueue.delay_ms, limits.max_queue_delay_ms
        )));
    }

    let backoff_schedule = match &enqueue.backoff_schedule {
        Some(schedule) => schedule.clone(),
        None => DEFAULT_BACKOFF_SCHEDULE.to_vec(),
    };
    if backoff_schedule.len() > limits.max_queue_backoff_intervals {
        return Err(KvError::validation(format!(
            "backoff schedule too long: {} intervals (max {})",
            backoff_schedule.len(),
            limits.max_queue_backoff_intervals
        )));
    }
    if let Some(interval) = backoff_schedule
        .iter()
        .find(|interval| **interval > limits.max_queue_backoff_interval_ms)
    {
        return Err(KvError::validation(format!(
            "backoff interval too long: {} ms (max {})",
            interval, limits.max_queue_backoff_interval_ms
        )));
    }

    let keys_if_undelivered = enqueue
        .keys_if_undelivered
        .iter()
        .map(|key| encode_write_key(key, limits))
        .collect::<Result<Vec<_>>>()?;

    let (encoding, payload) = encode_value(&enqueue.payload);
    if payload.len() > limits.max_value_size {
        return Err(KvError::validation(format!(
            "queue payload too large: {} bytes (max {})",
            payload.len(),
            limits.max_value_size
        )));
    }

    let record = QueueRecord {
        encoding,
        payload,
        keys_if_undelivered,
        backoff_schedule,
        failures: 0,
    };

    Ok(PreparedEnqueue {
        delay_ms: enqueue.delay_ms,
        encoded: bincode::serialize(&record)?,
    })
}

/// Write a prepared message inside the enqueuing transaction
pub(crate) fn stage(
    txn: &mut dyn TableTxn,
    enqueue: &PreparedEnqueue,
    version: u64,
    index: usize,
    now_ms: u64,
) -> Result<()> {
    let index = u16::try_from(index)
        .map_err(|_| KvError::validation(format!("too many enqueues in one write: {}", index)))?;

    let mut id = [0u8; ID_SIZE];
    id[..VERSIONSTAMP_SIZE].copy_from_slice(Versionstamp::from_version(version).as_bytes());
    id[VERSIONSTAMP_SIZE..].copy_from_slice(&index.to_be_bytes());

    let key = row_key(now_ms.saturating_add(enqueue.delay_ms), &id);
    txn.point_set(&key, &enqueue.encoded, ValueEncoding::Opaque, version)
}

/// Remove and return the earliest message ready at `now_ms`
pub(crate) fn take_ready(txn: &mut dyn TableTxn, now_ms: u64) -> Result<Option<QueueMessage>> {
    let scan = ScanRange {
        start: QUEUE_PREFIX.to_vec(),
        end: ready_bound(now_ms),
        limit: 1,
        reverse: false,
    };
    let Some(row) = txn.range_scan(&scan)?.pop() else {
        return Ok(None);
    };
    txn.point_delete(&row.key)?;

    let (_, id) = parse_row_key(&row.key)?;
    let record: QueueRecord = bincode::deserialize(&row.value)
        .map_err(|e| KvError::decode(format!("queue record: {}", e)))?;
    let payload = decode_value(record.encoding, &record.payload)?;

    Ok(Some(QueueMessage {
        payload,
        attempt: record.failures + 1,
        id,
        record,
    }))
}

/// Ready time of the earliest stored message
pub(crate) fn peek_ready_at<T: VersionedTable + ?Sized>(table: &T) -> Result<Option<u64>> {
    let scan = ScanRange {
        start: QUEUE_PREFIX.to_vec(),
        end: QUEUE_END.to_vec(),
        limit: 1,
        reverse: false,
    };
    match table.range_scan(&scan, Consistency::Strong)?.first() {
        Some(row) => parse_row_key(&row.key).map(|(ready_at, _)| Some(ready_at)),
        None => Ok(None),
    }
}

/// Settle a failed delivery: reschedule, or write the undelivered keys
pub(crate) fn finish(txn: &mut dyn TableTxn, message: QueueMessage, now_ms: u64) -> Result<()> {
    let QueueMessage {
        payload, id, record, ..
    } = message;
    let mut record = record;
    let stamp = Versionstamp::from_bytes(version_bytes(&id));

    if !record.backoff_schedule.is_empty() {
        let delay = record.backoff_schedule.remove(0);
        record.failures += 1;
        let key = row_key(now_ms.saturating_add(u64::from(delay)), &id);
        tracing::debug!(
            "Queue message {} failed attempt {}, retrying in {} ms",
            stamp,
            record.failures,
            delay
        );
        let encoded = bincode::serialize(&record)?;
        return txn.point_set(&key, &encoded, ValueEncoding::Opaque, stamp.version());
    }

    tracing::debug!(
        "Queue message {} undeliverable after {} attempts; writing {} fallback key(s)",
        stamp,
        record.failures + 1,
        record.keys_if_undelivered.len()
    );
    if record.keys_if_undelivered.is_empty() {
        return Ok(());
    }
    let version = txn.next_global_version()?;
    let (encoding, bytes) = encode_value(&payload);
    for key in &record.keys_if_undelivered {
        txn.point_set(key, &bytes, encoding, version)?;
    }
    Ok(())
}

// =============================================================================
// Row Keys
// =============================================================================

fn row_key(ready_at: u64, id: &[u8; ID_SIZE]) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROW_KEY_SIZE);
    key.extend_from_slice(&QUEUE_PREFIX);
    key.extend_from_slice(&ready_at.to_be_bytes());
    key.extend_from_slice(id);
    key
}

/// Exclusive upper bound covering every message ready at or before `now_ms`
fn ready_bound(now_ms: u64) -> Vec<u8> {
    match now_ms.checked_add(1) {
        Some(next) => {
            let mut bound = QUEUE_PREFIX.to_vec();
            bound.extend_from_slice(&next.to_be_bytes());
            bound
        }
        None => QUEUE_END.to_vec(),
    }
}

fn parse_row_key(key: &[u8]) -> Result<(u64, [u8; ID_SIZE])> {
    if key.len() != ROW_KEY_SIZE || !key.starts_with(&QUEUE_PREFIX) {
        return Err(KvError::decode(format!(
            "malformed queue row key of {} bytes",
            key.len()
        )));
    }
    let mut ready_at = [0u8; 8];
    ready_at.copy_from_slice(&key[2..10]);
    let mut id = [0u8; ID_SIZE];
    id.copy_from_slice(&key[10..]);
    Ok((u64::from_be_bytes(ready_at), id))
}

fn version_bytes(id: &[u8; ID_SIZE]) -> [u8; VERSIONSTAMP_SIZE] {
    let mut bytes = [0u8; VERSIONSTAMP_SIZE];
    bytes.copy_from_slice(&id[..VERSIONSTAMP_SIZE]);
    bytes
}
