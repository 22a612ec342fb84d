//! Tests for WAL Entry
//!
//! These tests verify:
//! - Frame layout (LSN, CRC, length, payload)
//! - Payload round trips for commit and snapshot records
//! - CRC consistency

use stampkv::value::ValueEncoding;
use stampkv::wal::{Operation, WalEntry, WalRecord, HEADER_SIZE};

fn set_op(key: &[u8], value: &[u8], version: u64) -> Operation {
    Operation::Set {
        key: key.to_vec(),
        value: value.to_vec(),
        encoding: ValueEncoding::Bytes,
        version,
    }
}

fn payload_of(frame: &[u8]) -> &[u8] {
    &frame[HEADER_SIZE..]
}

// =============================================================================
// Frame Layout Tests
// =============================================================================

#[test]
fn test_frame_header_layout() {
    let entry = WalEntry::new(
        7,
        WalRecord::Commit {
            version: 3,
            ops: vec![set_op(b"k", b"v", 3)],
        },
    );
    let frame = entry.encode().unwrap();

    let lsn = u64::from_le_bytes(frame[0..8].try_into().unwrap());
    let crc = u32::from_le_bytes(frame[8..12].try_into().unwrap());
    let len = u32::from_le_bytes(frame[12..16].try_into().unwrap());

    assert_eq!(lsn, 7);
    assert_eq!(len as usize, frame.len() - HEADER_SIZE);
    assert_eq!(crc, WalEntry::compute_crc(payload_of(&frame)));
}

#[test]
fn test_commit_round_trip() {
    let entry = WalEntry::new(
        1,
        WalRecord::Commit {
            version: 42,
            ops: vec![
                set_op(b"a", b"1", 42),
                Operation::Delete { key: b"b".to_vec() },
            ],
        },
    );
    let frame = entry.encode().unwrap();
    let decoded = WalEntry::decode_payload(payload_of(&frame)).unwrap();

    assert_eq!(decoded, entry);
    assert_eq!(decoded.version(), 42);
}

#[test]
fn test_snapshot_round_trip() {
    let entry = WalEntry::new(
        9,
        WalRecord::Snapshot {
            version: 100,
            rows: vec![set_op(b"x", &[0u8; 1024], 99), set_op(b"y", b"", 100)],
        },
    );
    let frame = entry.encode().unwrap();
    let decoded = WalEntry::decode_payload(payload_of(&frame)).unwrap();

    assert_eq!(decoded, entry);
    assert_eq!(decoded.version(), 100);
}

#[test]
fn test_empty_commit_round_trip() {
    let entry = WalEntry::new(2, WalRecord::Commit { version: 0, ops: vec![] });
    let frame = entry.encode().unwrap();
    assert_eq!(WalEntry::decode_payload(payload_of(&frame)).unwrap(), entry);
}

#[test]
fn test_decode_garbage_payload_fails() {
    assert!(WalEntry::decode_payload(&[0xff; 3]).is_err());
}

// =============================================================================
// CRC Tests
// =============================================================================

#[test]
fn test_compute_crc_consistency() {
    let data = b"stampkv wal payload";
    assert_eq!(WalEntry::compute_crc(data), WalEntry::compute_crc(data));
    assert_ne!(WalEntry::compute_crc(data), WalEntry::compute_crc(b"stampkv wal payloaD"));
}
