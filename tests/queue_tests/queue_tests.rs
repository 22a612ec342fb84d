//! Tests for the Queue
//!
//! These tests verify:
//! - Messages are stored by the enqueuing write and dequeued in ready order
//! - Delays and backoff rescheduling
//! - Undelivered keys receive the payload once retries run out
//! - Enqueue validation
//! - Blocking dequeue wakes on new messages

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stampkv::config::{Config, WalSyncStrategy};
use stampkv::error::KvError;
use stampkv::queue::{now_millis, Enqueue, DEFAULT_BACKOFF_SCHEDULE};
use stampkv::read::{ListOptions, Selector};
use stampkv::value::Value;
use stampkv::write::{AtomicWrite, CommitOutcome};
use stampkv::{key, Engine, Key};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn enqueue(engine: &Engine, message: Enqueue) -> stampkv::Versionstamp {
    match engine.atomic_write(AtomicWrite::new().enqueue(message)).unwrap() {
        CommitOutcome::Committed(result) => result.versionstamp,
        other => panic!("unexpected outcome {:?}", other),
    }
}

fn assert_validation(engine: &Engine, message: Enqueue) {
    match engine.atomic_write(AtomicWrite::new().enqueue(message)) {
        Err(KvError::Validation(_)) => {}
        other => panic!("expected validation error, got {:?}", other),
    }
}

// =============================================================================
// Basic Queue Tests
// =============================================================================

#[test]
fn test_enqueue_then_dequeue() {
    let engine = Engine::in_memory();
    let stamp = enqueue(&engine, Enqueue::new(b"job-1".as_slice()));

    let message = engine.dequeue(now_millis()).unwrap().unwrap();
    assert_eq!(message.payload, Value::Bytes(b"job-1".to_vec()));
    assert_eq!(message.attempt, 1);
    assert_eq!(message.versionstamp(), stamp);
    assert_eq!(message.backoff_remaining(), DEFAULT_BACKOFF_SCHEDULE.as_slice());

    assert!(engine.dequeue(now_millis()).unwrap().is_none());
}

#[test]
fn test_enqueue_is_part_of_the_write() {
    let engine = Engine::in_memory();
    engine
        .atomic_write(AtomicWrite::new().set(key!["a"], 1u64))
        .unwrap();

    let outcome = engine
        .atomic_write(
            AtomicWrite::new()
                .check(key!["a"], None)
                .enqueue(Enqueue::new(1u64)),
        )
        .unwrap();
    assert!(!outcome.is_committed());
    assert!(engine.dequeue(u64::MAX).unwrap().is_none());
}

#[test]
fn test_messages_dequeue_in_ready_order() {
    let engine = Engine::in_memory();
    engine
        .atomic_write(
            AtomicWrite::new()
                .enqueue(Enqueue::new(1u64).with_delay(500))
                .enqueue(Enqueue::new(2u64))
                .enqueue(Enqueue::new(3u64)),
        )
        .unwrap();

    let far = now_millis() + 10_000;
    let order: Vec<u64> = std::iter::from_fn(|| engine.dequeue(far).unwrap())
        .map(|message| message.payload.as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![2, 3, 1]);
}

#[test]
fn test_delayed_message_not_ready_early() {
    let engine = Engine::in_memory();
    let before = now_millis();
    enqueue(&engine, Enqueue::new(7u64).with_delay(60_000));

    assert!(engine.dequeue(before).unwrap().is_none());
    assert!(engine.dequeue(before + 1_000).unwrap().is_none());
    assert!(engine.dequeue(now_millis() + 60_000).unwrap().is_some());
}

#[test]
fn test_queue_rows_are_invisible_to_lists() {
    let engine = Engine::in_memory();
    engine
        .atomic_write(
            AtomicWrite::new()
                .set(key!["user"], 1u64)
                .enqueue(Enqueue::new(2u64)),
        )
        .unwrap();

    let everything = Selector::prefix(Key::empty());
    let keys: Vec<Key> = engine
        .list(&everything, ListOptions::new())
        .unwrap()
        .map(|entry| entry.unwrap().key)
        .collect();
    assert_eq!(keys, vec![key!["user"]]);
}

// =============================================================================
// Retry Tests
// =============================================================================

#[test]
fn test_successful_delivery_removes_message() {
    let engine = Engine::in_memory();
    enqueue(&engine, Enqueue::new(1u64));

    let now = now_millis();
    let message = engine.dequeue(now).unwrap().unwrap();
    engine.finish(message, true, now).unwrap();

    assert!(engine.dequeue(u64::MAX).unwrap().is_none());
}

#[test]
fn test_failed_delivery_follows_backoff() {
    let engine = Engine::in_memory();
    enqueue(
        &engine,
        Enqueue::new(1u64).with_backoff_schedule(vec![100, 200]),
    );

    let t0 = now_millis() + 10;
    let message = engine.dequeue(t0).unwrap().unwrap();
    engine.finish(message, false, t0).unwrap();

    assert!(engine.dequeue(t0 + 99).unwrap().is_none());
    let retry = engine.dequeue(t0 + 100).unwrap().unwrap();
    assert_eq!(retry.attempt, 2);
    assert_eq!(retry.backoff_remaining(), &[200]);

    let t1 = t0 + 100;
    engine.finish(retry, false, t1).unwrap();
    assert!(engine.dequeue(t1 + 199).unwrap().is_none());
    let last = engine.dequeue(t1 + 200).unwrap().unwrap();
    assert_eq!(last.attempt, 3);
    assert!(last.backoff_remaining().is_empty());
}

#[test]
fn test_exhausted_message_writes_undelivered_keys() {
    let engine = Engine::in_memory();
    let stamp = enqueue(
        &engine,
        Enqueue::new(b"payload".as_slice())
            .with_backoff_schedule(vec![])
            .with_keys_if_undelivered(vec![key!["dead", 1], key!["dead", 2]]),
    );

    let now = now_millis();
    let message = engine.dequeue(now).unwrap().unwrap();
    engine.finish(message, false, now).unwrap();

    for k in [key!["dead", 1], key!["dead", 2]] {
        let entry = engine.get(&k).unwrap().unwrap();
        assert_eq!(entry.value, Value::Bytes(b"payload".to_vec()));
        assert!(entry.versionstamp > stamp);
    }
    assert!(engine.dequeue(u64::MAX).unwrap().is_none());
}

#[test]
fn test_exhausted_message_without_keys_is_dropped() {
    let engine = Engine::in_memory();
    enqueue(&engine, Enqueue::new(1u64).with_backoff_schedule(vec![]));

    let now = now_millis();
    let message = engine.dequeue(now).unwrap().unwrap();
    engine.finish(message, false, now).unwrap();

    assert!(engine.dequeue(u64::MAX).unwrap().is_none());
    assert_eq!(engine.table().version(), 1);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_enqueue_limits() {
    let engine = Engine::in_memory();
    let limits = engine.config().limits.clone();

    assert_validation(
        &engine,
        Enqueue::new(1u64).with_delay(limits.max_queue_delay_ms + 1),
    );
    assert_validation(
        &engine,
        Enqueue::new(1u64).with_backoff_schedule(vec![1; limits.max_queue_backoff_intervals + 1]),
    );
    assert_validation(
        &engine,
        Enqueue::new(1u64).with_backoff_schedule(vec![limits.max_queue_backoff_interval_ms + 1]),
    );
    assert_validation(
        &engine,
        Enqueue::new(1u64).with_keys_if_undelivered(vec![Key::empty()]),
    );
    assert_validation(
        &engine,
        Enqueue::new(vec![0u8; limits.max_value_size + 1]),
    );

    assert!(engine.dequeue(u64::MAX).unwrap().is_none());
}

// =============================================================================
// Blocking Dequeue Tests
// =============================================================================

#[test]
fn test_dequeue_wait_times_out() {
    let engine = Engine::in_memory();
    let message = engine.dequeue_wait(Duration::from_millis(50)).unwrap();
    assert!(message.is_none());
}

#[test]
fn test_dequeue_wait_returns_ready_message() {
    let engine = Engine::in_memory();
    enqueue(&engine, Enqueue::new(5u64));
    let message = engine.dequeue_wait(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(message.payload, Value::U64(5));
}

#[test]
fn test_dequeue_wait_wakes_on_enqueue() {
    let engine = Arc::new(Engine::in_memory());

    let producer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            engine
                .atomic_write(AtomicWrite::new().enqueue(Enqueue::new(9u64)))
                .unwrap();
        })
    };

    let message = engine.dequeue_wait(Duration::from_secs(10)).unwrap();
    producer.join().unwrap();
    assert_eq!(message.unwrap().payload, Value::U64(9));
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_messages_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build();

    {
        let engine = Engine::open(config.clone()).unwrap();
        enqueue(&engine, Enqueue::new(b"persisted".as_slice()));
    }

    let engine = Engine::open(config).unwrap();
    let message = engine.dequeue(now_millis()).unwrap().unwrap();
    assert_eq!(message.payload, Value::Bytes(b"persisted".to_vec()));
}
