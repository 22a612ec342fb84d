//! Value Module
//!
//! Stored values and their byte encodings.
//!
//! ## Encodings
//! - `Opaque`: a serialized payload produced by a [`ValueCodec`]
//! - `Bytes`: raw bytes, stored as-is
//! - `U64`: 8-byte little-endian unsigned integer, the only encoding that
//!   supports sum/min/max mutations

mod codec;

pub use codec::{decode_u64, decode_value, encode_u64, encode_value, BincodeCodec, ValueCodec};

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// A value as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Codec-serialized payload, opaque to the store
    Opaque(Vec<u8>),

    /// Raw bytes
    Bytes(Vec<u8>),

    /// Unsigned 64-bit integer (numeric mutations operate on this)
    U64(u64),
}

impl Value {
    /// The encoding this value is stored under
    pub fn encoding(&self) -> ValueEncoding {
        match self {
            Value::Opaque(_) => ValueEncoding::Opaque,
            Value::Bytes(_) => ValueEncoding::Bytes,
            Value::U64(_) => ValueEncoding::U64,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::U64(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

/// Kind tag stored alongside every row's value bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueEncoding {
    Opaque = 1,
    Bytes = 2,
    U64 = 3,
}

impl TryFrom<u8> for ValueEncoding {
    type Error = KvError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(ValueEncoding::Opaque),
            2 => Ok(ValueEncoding::Bytes),
            3 => Ok(ValueEncoding::U64),
            _ => Err(KvError::decode(format!(
                "unknown value encoding: 0x{:02x}",
                tag
            ))),
        }
    }
}
