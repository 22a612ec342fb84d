//! Tests for Atomic Writes
//!
//! These tests verify:
//! - Versionstamp checks (optimistic locking)
//! - All-or-nothing application with one shared versionstamp
//! - Sum/Min/Max semantics, including wraparound and absent keys
//! - Type mismatches abort the whole write
//! - Request limits are enforced before storage is touched
//! - Storage faults surface as errors and leave nothing behind

use std::sync::Mutex;

use stampkv::config::{Config, Limits};
use stampkv::error::KvError;
use stampkv::table::{Consistency, LocalTable, Row, ScanRange, TableTxn, VersionedTable};
use stampkv::value::{Value, ValueEncoding};
use stampkv::write::{AtomicWrite, CommitOutcome};
use stampkv::{key, Engine, Enqueue, Versionstamp};

// =============================================================================
// Helper Functions
// =============================================================================

fn committed(outcome: CommitOutcome) -> Versionstamp {
    match outcome {
        CommitOutcome::Committed(result) => result.versionstamp,
        CommitOutcome::CheckFailed(failure) => {
            panic!("unexpected check failure on {:?}", failure.failed_keys)
        }
    }
}

fn engine_with_limits(limits: Limits) -> Engine {
    let config = Config::builder().limits(limits).build();
    Engine::with_table(LocalTable::in_memory(), config).unwrap()
}

fn u64_at(engine: &Engine, k: stampkv::Key) -> Option<u64> {
    engine.get(&k).unwrap().and_then(|entry| entry.value.as_u64())
}

// =============================================================================
// Check Tests
// =============================================================================

#[test]
fn test_optimistic_lock_rejects_stale_write() {
    let engine = Engine::in_memory();
    let v1 = committed(
        engine
            .atomic_write(AtomicWrite::new().set(key!["a"], 1u64))
            .unwrap(),
    );
    assert_eq!(v1, Versionstamp::from_version(1));

    let outcome = engine
        .atomic_write(AtomicWrite::new().check(key!["a"], None).set(key!["a"], 2u64))
        .unwrap();
    match outcome {
        CommitOutcome::CheckFailed(failure) => assert_eq!(failure.failed_keys, vec![key!["a"]]),
        other => panic!("expected check failure, got {:?}", other),
    }

    let entry = engine.get(&key!["a"]).unwrap().unwrap();
    assert_eq!(entry.value, Value::U64(1));
    assert_eq!(entry.versionstamp, v1);
}

#[test]
fn test_matching_check_commits() {
    let engine = Engine::in_memory();
    let v1 = committed(
        engine
            .atomic_write(AtomicWrite::new().check(key!["a"], None).set(key!["a"], 1u64))
            .unwrap(),
    );

    let v2 = committed(
        engine
            .atomic_write(AtomicWrite::new().check(key!["a"], Some(v1)).set(key!["a"], 2u64))
            .unwrap(),
    );
    assert!(v2 > v1);
    assert_eq!(u64_at(&engine, key!["a"]), Some(2));
}

#[test]
fn test_every_failed_check_is_reported() {
    let engine = Engine::in_memory();
    committed(
        engine
            .atomic_write(AtomicWrite::new().set(key!["x"], 1u64).set(key!["y"], 1u64))
            .unwrap(),
    );

    let outcome = engine
        .atomic_write(
            AtomicWrite::new()
                .check(key!["x"], None)
                .check(key!["y"], Some(Versionstamp::from_version(1)))
                .check(key!["z"], Some(Versionstamp::from_version(1)))
                .set(key!["w"], 1u64),
        )
        .unwrap();

    match outcome {
        CommitOutcome::CheckFailed(failure) => {
            assert_eq!(failure.failed_keys, vec![key!["x"], key!["z"]])
        }
        other => panic!("expected check failure, got {:?}", other),
    }
    assert!(engine.get(&key!["w"]).unwrap().is_none());
}

// =============================================================================
// Atomicity Tests
// =============================================================================

#[test]
fn test_mutations_share_one_versionstamp() {
    let engine = Engine::in_memory();
    let stamp = committed(
        engine
            .atomic_write(
                AtomicWrite::new()
                    .set(key!["a"], b"1".as_slice())
                    .set(key!["b"], b"2".as_slice())
                    .sum(key!["c"], 3),
            )
            .unwrap(),
    );

    let entries = engine
        .get_many(&[key!["a"], key!["b"], key!["c"]])
        .unwrap();
    for entry in entries {
        assert_eq!(entry.unwrap().versionstamp, stamp);
    }
}

#[test]
fn test_failed_check_does_not_consume_a_version() {
    let engine = Engine::in_memory();
    committed(engine.atomic_write(AtomicWrite::new().set(key!["a"], 1u64)).unwrap());

    let outcome = engine
        .atomic_write(AtomicWrite::new().check(key!["a"], None).set(key!["b"], 1u64))
        .unwrap();
    assert!(!outcome.is_committed());
    assert_eq!(outcome.versionstamp(), None);

    let next = committed(engine.atomic_write(AtomicWrite::new().set(key!["c"], 1u64)).unwrap());
    assert_eq!(next, Versionstamp::from_version(2));
}

#[test]
fn test_mutations_apply_in_order() {
    let engine = Engine::in_memory();
    committed(
        engine
            .atomic_write(
                AtomicWrite::new()
                    .set(key!["k"], 5u64)
                    .sum(key!["k"], 10)
                    .delete(key!["gone"])
                    .set(key!["gone"], 1u64)
                    .delete(key!["gone"]),
            )
            .unwrap(),
    );

    assert_eq!(u64_at(&engine, key!["k"]), Some(15));
    assert!(engine.get(&key!["gone"]).unwrap().is_none());
}

#[test]
fn test_delete_absent_key_is_not_an_error() {
    let engine = Engine::in_memory();
    let outcome = engine
        .atomic_write(AtomicWrite::new().delete(key!["never", "written"]))
        .unwrap();
    assert!(outcome.is_committed());
}

#[test]
fn test_type_mismatch_aborts_whole_write() {
    let engine = Engine::in_memory();
    committed(
        engine
            .atomic_write(AtomicWrite::new().set(key!["k"], b"text".as_slice()))
            .unwrap(),
    );

    let err = engine
        .atomic_write(AtomicWrite::new().set(key!["other"], 1u64).sum(key!["k"], 1))
        .unwrap_err();
    assert!(!err.is_storage_fault());
    match err {
        KvError::TypeMismatch { key, found } => {
            assert_eq!(key, "[\"k\"]");
            assert_eq!(found, ValueEncoding::Bytes);
        }
        other => panic!("expected type mismatch, got {:?}", other),
    }

    assert!(engine.get(&key!["other"]).unwrap().is_none());
    let next = committed(engine.atomic_write(AtomicWrite::new().set(key!["z"], 1u64)).unwrap());
    assert_eq!(next, Versionstamp::from_version(2));
}

// =============================================================================
// Numeric Mutation Tests
// =============================================================================

#[test]
fn test_sum_wraps_around() {
    let engine = Engine::in_memory();
    committed(engine.atomic_write(AtomicWrite::new().sum(key!["n"], u64::MAX)).unwrap());
    assert_eq!(u64_at(&engine, key!["n"]), Some(u64::MAX));

    committed(engine.atomic_write(AtomicWrite::new().sum(key!["n"], 1)).unwrap());
    assert_eq!(u64_at(&engine, key!["n"]), Some(0));
}

#[test]
fn test_min_and_max() {
    let engine = Engine::in_memory();
    committed(
        engine
            .atomic_write(AtomicWrite::new().min(key!["lo"], 10).max(key!["hi"], 10))
            .unwrap(),
    );
    assert_eq!(u64_at(&engine, key!["lo"]), Some(10));
    assert_eq!(u64_at(&engine, key!["hi"]), Some(10));

    committed(
        engine
            .atomic_write(
                AtomicWrite::new()
                    .min(key!["lo"], 3)
                    .min(key!["lo"], 7)
                    .max(key!["hi"], 30)
                    .max(key!["hi"], 20),
            )
            .unwrap(),
    );
    assert_eq!(u64_at(&engine, key!["lo"]), Some(3));
    assert_eq!(u64_at(&engine, key!["hi"]), Some(30));
}

#[test]
fn test_numeric_result_is_u64_encoded() {
    let engine = Engine::in_memory();
    committed(engine.atomic_write(AtomicWrite::new().max(key!["m"], 4)).unwrap());
    let entry = engine.get(&key!["m"]).unwrap().unwrap();
    assert_eq!(entry.value.encoding(), ValueEncoding::U64);
}

// =============================================================================
// Limit Tests
// =============================================================================

fn assert_validation(result: stampkv::Result<CommitOutcome>) {
    match result {
        Err(KvError::Validation(_)) => {}
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_empty_key_rejected() {
    let engine = Engine::in_memory();
    assert_validation(engine.atomic_write(AtomicWrite::new().set(key![], 1u64)));
}

#[test]
fn test_too_many_checks_and_mutations() {
    let engine = engine_with_limits(Limits {
        max_checks: 2,
        max_mutations: 2,
        ..Limits::default()
    });

    let checks = (0..3).fold(AtomicWrite::new(), |w, i| w.check(key!["c", i], None));
    assert_validation(engine.atomic_write(checks));

    let mutations = (0..3).fold(AtomicWrite::new(), |w, i| w.set(key!["m", i], 1u64));
    assert_validation(engine.atomic_write(mutations));

    // Enqueues count toward the mutation limit
    let mixed = AtomicWrite::new()
        .set(key!["m"], 1u64)
        .enqueue(Enqueue::new(1u64))
        .enqueue(Enqueue::new(2u64));
    assert_validation(engine.atomic_write(mixed));

    assert_eq!(engine.table().version(), 0);
}

#[test]
fn test_key_and_value_size_limits() {
    let engine = engine_with_limits(Limits {
        max_write_key_size: 16,
        max_read_key_size: 17,
        max_value_size: 8,
        ..Limits::default()
    });

    let long = "x".repeat(32);
    assert_validation(engine.atomic_write(AtomicWrite::new().set(key![long.as_str()], 1u64)));
    assert_validation(engine.atomic_write(AtomicWrite::new().check(key![long.as_str()], None)));
    assert_validation(
        engine.atomic_write(AtomicWrite::new().set(key!["k"], vec![0u8; 9])),
    );

    // Exactly at the limits is fine: 16 bytes of key (tag, 14, terminator), 8 of value
    let at_limit = "y".repeat(14);
    let outcome = engine
        .atomic_write(AtomicWrite::new().set(key![at_limit.as_str()], vec![0u8; 8]))
        .unwrap();
    assert!(outcome.is_committed());
}

#[test]
fn test_total_mutation_size_limit() {
    let engine = engine_with_limits(Limits {
        max_total_mutation_size: 64,
        ..Limits::default()
    });

    let write = (0..4).fold(AtomicWrite::new(), |w, i| w.set(key!["k", i], vec![0u8; 16]));
    assert_validation(engine.atomic_write(write));
    assert!(engine.get(&key!["k", 0]).unwrap().is_none());
}

// =============================================================================
// Storage Fault Tests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    /// Fail reading a version during the check phase
    CheckRead,
    /// Fail every `point_set` after this many succeed
    SetAfter(usize),
    Commit,
}

/// LocalTable wrapper whose transactions fail at a chosen step
struct FaultyTable {
    inner: LocalTable,
    fault: Mutex<Fault>,
}

struct FaultyTxn<'a> {
    inner: Box<dyn TableTxn + 'a>,
    fault: Fault,
    sets: usize,
}

fn injected(step: &str) -> KvError {
    KvError::Storage(format!("injected {} failure", step))
}

impl VersionedTable for FaultyTable {
    fn begin(&self) -> stampkv::Result<Box<dyn TableTxn + '_>> {
        Ok(Box::new(FaultyTxn {
            inner: self.inner.begin()?,
            fault: *self.fault.lock().unwrap(),
            sets: 0,
        }))
    }

    fn range_scan(&self, scan: &ScanRange, consistency: Consistency) -> stampkv::Result<Vec<Row>> {
        self.inner.range_scan(scan, consistency)
    }
}

impl TableTxn for FaultyTxn<'_> {
    fn get_version(&mut self, key: &[u8]) -> stampkv::Result<Option<u64>> {
        if self.fault == Fault::CheckRead {
            return Err(injected("version read"));
        }
        self.inner.get_version(key)
    }

    fn point_get(&mut self, key: &[u8]) -> stampkv::Result<Option<(Vec<u8>, ValueEncoding)>> {
        self.inner.point_get(key)
    }

    fn point_set(
        &mut self,
        key: &[u8],
        value: &[u8],
        encoding: ValueEncoding,
        version: u64,
    ) -> stampkv::Result<()> {
        if let Fault::SetAfter(n) = self.fault {
            if self.sets >= n {
                return Err(injected("point set"));
            }
        }
        self.sets += 1;
        self.inner.point_set(key, value, encoding, version)
    }

    fn point_delete(&mut self, key: &[u8]) -> stampkv::Result<bool> {
        self.inner.point_delete(key)
    }

    fn range_scan(&mut self, scan: &ScanRange) -> stampkv::Result<Vec<Row>> {
        self.inner.range_scan(scan)
    }

    fn next_global_version(&mut self) -> stampkv::Result<u64> {
        self.inner.next_global_version()
    }

    fn commit(self: Box<Self>) -> stampkv::Result<()> {
        let this = *self;
        if this.fault == Fault::Commit {
            this.inner.rollback()?;
            return Err(injected("commit"));
        }
        this.inner.commit()
    }

    fn rollback(self: Box<Self>) -> stampkv::Result<()> {
        let this = *self;
        this.inner.rollback()
    }
}

/// Engine holding `a = 1` at version 1, failing at `fault` from then on
fn faulty(fault: Fault) -> (Engine<FaultyTable>, Versionstamp) {
    let table = FaultyTable {
        inner: LocalTable::in_memory(),
        fault: Mutex::new(Fault::None),
    };
    let engine = Engine::with_table(table, Config::default()).unwrap();
    let v1 = committed(
        engine
            .atomic_write(AtomicWrite::new().set(key!["a"], 1u64))
            .unwrap(),
    );
    *engine.table().fault.lock().unwrap() = fault;
    (engine, v1)
}

fn assert_untouched(engine: &Engine<FaultyTable>, v1: Versionstamp) {
    let a = engine.get(&key!["a"]).unwrap().unwrap();
    assert_eq!(a.value, Value::U64(1));
    assert_eq!(a.versionstamp, v1);
    assert!(engine.get(&key!["b"]).unwrap().is_none());
    assert!(engine.get(&key!["c"]).unwrap().is_none());
    assert_eq!(engine.table().inner.version(), 1);
}

fn expect_storage_fault(result: stampkv::Result<CommitOutcome>) {
    match result {
        Err(e) => assert!(e.is_storage_fault(), "not a storage fault: {}", e),
        Ok(outcome) => panic!("expected storage fault, got {:?}", outcome),
    }
}

#[test]
fn test_fault_during_checks_is_an_error_not_a_check_failure() {
    let (engine, v1) = faulty(Fault::CheckRead);

    // The check would fail, but the read error wins
    let write = AtomicWrite::new()
        .check(key!["a"], None)
        .set(key!["b"], 2u64);
    expect_storage_fault(engine.atomic_write(write));
    assert_untouched(&engine, v1);
}

#[test]
fn test_fault_mid_mutations_rolls_back_earlier_mutations() {
    let (engine, v1) = faulty(Fault::SetAfter(2));

    let write = AtomicWrite::new()
        .check(key!["a"], Some(v1))
        .set(key!["b"], 2u64)
        .sum(key!["a"], 10)
        .set(key!["c"], 3u64);
    expect_storage_fault(engine.atomic_write(write));
    assert_untouched(&engine, v1);
}

#[test]
fn test_fault_on_commit_rolls_back_everything() {
    let (engine, v1) = faulty(Fault::Commit);

    let write = AtomicWrite::new()
        .set(key!["a"], 5u64)
        .set(key!["b"], 2u64)
        .delete(key!["c"]);
    expect_storage_fault(engine.atomic_write(write));
    assert_untouched(&engine, v1);

    // The aborted write consumed no version
    *engine.table().fault.lock().unwrap() = Fault::None;
    let next = committed(
        engine
            .atomic_write(AtomicWrite::new().set(key!["b"], 2u64))
            .unwrap(),
    );
    assert_eq!(next, Versionstamp::from_version(2));
}
