//! Entries and versionstamps
//!
//! What reads return: a decoded key, its value, and the versionstamp of the
//! write that last touched it.

use std::fmt;
use std::str::FromStr;

use crate::error::{KvError, Result};
use crate::key::Key;
use crate::value::Value;

/// Width of a versionstamp in bytes
pub const VERSIONSTAMP_SIZE: usize = 10;

/// Identifier of the committed write that last touched a key
///
/// ```text
/// ┌──────────────────────────────┬───────────┐
/// │ Global version (8, BE)       │ 0x00 0x00 │
/// └──────────────────────────────┴───────────┘
/// ```
/// Byte order is numeric order, so versionstamps compare like the versions
/// they were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Versionstamp([u8; VERSIONSTAMP_SIZE]);

impl Versionstamp {
    pub fn from_version(version: u64) -> Self {
        let mut bytes = [0u8; VERSIONSTAMP_SIZE];
        bytes[..8].copy_from_slice(&version.to_be_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; VERSIONSTAMP_SIZE]) -> Self {
        Self(bytes)
    }

    /// The global version this stamp was derived from
    pub fn version(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(raw)
    }

    pub fn as_bytes(&self) -> &[u8; VERSIONSTAMP_SIZE] {
        &self.0
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for Versionstamp {
    type Err = KvError;

    /// Parse the 20-character hex form produced by `Display`
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != VERSIONSTAMP_SIZE * 2 || !s.is_ascii() {
            return Err(KvError::validation(format!(
                "versionstamp must be {} hex characters, got {:?}",
                VERSIONSTAMP_SIZE * 2,
                s
            )));
        }
        let mut bytes = [0u8; VERSIONSTAMP_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| KvError::validation(format!("invalid versionstamp {:?}: {}", s, e)))?;
        }
        Ok(Self(bytes))
    }
}

/// A key/value pair read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
    pub versionstamp: Versionstamp,
}
