//! Value codec
//!
//! Conversions between [`Value`]s and stored `(encoding, bytes)` pairs, plus
//! the pluggable codec for arbitrary caller types.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KvError, Result};

use super::{Value, ValueEncoding};

/// Size of an encoded u64
const U64_SIZE: usize = 8;

/// Split a value into its stored form
pub fn encode_value(value: &Value) -> (ValueEncoding, Vec<u8>) {
    match value {
        Value::Opaque(b) => (ValueEncoding::Opaque, b.clone()),
        Value::Bytes(b) => (ValueEncoding::Bytes, b.clone()),
        Value::U64(n) => (ValueEncoding::U64, encode_u64(*n).to_vec()),
    }
}

/// Rebuild a value from its stored form
pub fn decode_value(encoding: ValueEncoding, bytes: &[u8]) -> Result<Value> {
    match encoding {
        ValueEncoding::Opaque => Ok(Value::Opaque(bytes.to_vec())),
        ValueEncoding::Bytes => Ok(Value::Bytes(bytes.to_vec())),
        ValueEncoding::U64 => decode_u64(bytes).map(Value::U64),
    }
}

pub fn encode_u64(n: u64) -> [u8; U64_SIZE] {
    n.to_le_bytes()
}

pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; U64_SIZE] = bytes.try_into().map_err(|_| {
        KvError::decode(format!(
            "u64 value must be {} bytes, got {}",
            U64_SIZE,
            bytes.len()
        ))
    })?;
    Ok(u64::from_le_bytes(raw))
}

/// Converts caller values into store values and back
///
/// Plain numbers should be stored as [`Value::U64`] directly when they are
/// meant to be mutated with sum/min/max; a codec only produces opaque blobs.
pub trait ValueCodec {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<Value>;

    fn decode(&self, value: &Value) -> Result<Self::Item>;
}

/// Codec serializing any serde type with bincode
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> ValueCodec for BincodeCodec<T> {
    type Item = T;

    fn encode(&self, item: &T) -> Result<Value> {
        Ok(Value::Opaque(bincode::serialize(item)?))
    }

    fn decode(&self, value: &Value) -> Result<T> {
        match value {
            Value::Opaque(bytes) => bincode::deserialize(bytes)
                .map_err(|e| KvError::decode(format!("opaque value: {}", e))),
            other => Err(KvError::decode(format!(
                "expected opaque value, found {:?}",
                other.encoding()
            ))),
        }
    }
}
