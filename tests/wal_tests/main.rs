//! WAL test suite
//!
//! One binary for the entry, writer, reader and recovery tests.

mod entry_tests;
