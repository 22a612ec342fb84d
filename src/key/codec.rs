//! Key codec
//!
//! Order-preserving encoding of [`Key`]s to bytes.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬───────────────────────────────────────────────┐
//! │ Tag (1)  │ Payload                                       │
//! └──────────┴───────────────────────────────────────────────┘
//!   0x01       bytes, 0x00 escaped as 0x00 0xFF, terminated by 0x00
//!   0x02       UTF-8, escaped and terminated like bytes
//!   0x0B       negative int > 8 bytes: (len ^ 0xFF) + !magnitude
//!   0x0C-0x13  negative int of (0x14 - tag) bytes: !magnitude
//!   0x14       zero
//!   0x15-0x1C  positive int of (tag - 0x14) bytes: magnitude
//!   0x1D       positive int > 8 bytes: len + magnitude
//!   0x21       float, 8 bytes of order-transformed bits
//!   0x26       false
//!   0x27       true
//! ```
//! Parts are concatenated with no separator; the empty key encodes to
//! zero bytes.

use bytes::{Buf, BufMut};
use num_bigint::{BigInt, Sign};

use crate::error::{KvError, Result};

use super::{canonicalize_f64, Key, KeyPart};

/// Type tags, ordered by part precedence
pub(crate) mod tag {
    pub const BYTES: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const NEG_INT_START: u8 = 0x0b;
    pub const INT_ZERO: u8 = 0x14;
    pub const POS_INT_END: u8 = 0x1d;
    pub const FLOAT: u8 = 0x21;
    pub const FALSE: u8 = 0x26;
    pub const TRUE: u8 = 0x27;
}

/// Ends a variable-length part
const TERMINATOR: u8 = 0x00;

/// Follows a literal 0x00 inside a variable-length part
const ESCAPE: u8 = 0xff;

/// Longest integer magnitude expressible with the one-byte length prefix
const MAX_INT_BYTES: usize = 255;

/// Magnitudes up to this many bytes carry their length in the tag
const SHORT_INT_BYTES: usize = 8;

const SIGN_BIT: u64 = 1 << 63;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a key to its ordered byte representation
///
/// Fails only for integer parts whose magnitude exceeds 255 bytes.
pub fn encode_key(key: &Key) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(key.len() * 8);
    encode_key_into(key, &mut buf)?;
    Ok(buf)
}

/// Encode a key, appending to `buf`
pub fn encode_key_into<B: BufMut>(key: &Key, buf: &mut B) -> Result<()> {
    for part in key.parts() {
        encode_part(part, buf)?;
    }
    Ok(())
}

fn encode_part<B: BufMut>(part: &KeyPart, buf: &mut B) -> Result<()> {
    match part {
        KeyPart::Bytes(b) => {
            buf.put_u8(tag::BYTES);
            put_escaped(b, buf);
        }
        KeyPart::String(s) => {
            buf.put_u8(tag::STRING);
            put_escaped(s.as_bytes(), buf);
        }
        KeyPart::Int(n) => encode_int(n, buf)?,
        KeyPart::Float(v) => {
            buf.put_u8(tag::FLOAT);
            buf.put_u64(float_to_sortable(*v));
        }
        KeyPart::False => buf.put_u8(tag::FALSE),
        KeyPart::True => buf.put_u8(tag::TRUE),
    }
    Ok(())
}

fn put_escaped<B: BufMut>(data: &[u8], buf: &mut B) {
    for &byte in data {
        buf.put_u8(byte);
        if byte == TERMINATOR {
            buf.put_u8(ESCAPE);
        }
    }
    buf.put_u8(TERMINATOR);
}

fn encode_int<B: BufMut>(n: &BigInt, buf: &mut B) -> Result<()> {
    let (sign, magnitude) = n.to_bytes_be();
    let len = magnitude.len();

    if len > MAX_INT_BYTES {
        return Err(KvError::validation(format!(
            "integer key part too large: {} bytes (max {})",
            len, MAX_INT_BYTES
        )));
    }

    match sign {
        Sign::NoSign => buf.put_u8(tag::INT_ZERO),
        Sign::Plus => {
            if len <= SHORT_INT_BYTES {
                buf.put_u8(tag::INT_ZERO + len as u8);
            } else {
                buf.put_u8(tag::POS_INT_END);
                buf.put_u8(len as u8);
            }
            buf.put_slice(&magnitude);
        }
        Sign::Minus => {
            if len <= SHORT_INT_BYTES {
                buf.put_u8(tag::INT_ZERO - len as u8);
            } else {
                buf.put_u8(tag::NEG_INT_START);
                buf.put_u8(len as u8 ^ 0xff);
            }
            for byte in magnitude {
                buf.put_u8(!byte);
            }
        }
    }
    Ok(())
}

/// Map a float onto a u64 whose unsigned order is the IEEE total order
fn float_to_sortable(value: f64) -> u64 {
    let bits = canonicalize_f64(value).to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits ^ SIGN_BIT
    }
}

fn sortable_to_float(sortable: u64) -> f64 {
    let bits = if sortable & SIGN_BIT != 0 {
        sortable ^ SIGN_BIT
    } else {
        !sortable
    };
    canonicalize_f64(f64::from_bits(bits))
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a key from its byte representation
///
/// Every byte must belong to a well-formed part; truncated or malformed
/// input yields [`KvError::Decode`].
pub fn decode_key(bytes: &[u8]) -> Result<Key> {
    let mut buf = bytes;
    let mut parts = Vec::new();
    while buf.has_remaining() {
        parts.push(decode_part(&mut buf)?);
    }
    Ok(Key(parts))
}

fn decode_part(buf: &mut &[u8]) -> Result<KeyPart> {
    let part_tag = buf.get_u8();
    match part_tag {
        tag::BYTES => Ok(KeyPart::Bytes(take_escaped(buf)?)),
        tag::STRING => {
            let raw = take_escaped(buf)?;
            String::from_utf8(raw)
                .map(KeyPart::String)
                .map_err(|e| KvError::decode(format!("string key part is not UTF-8: {}", e)))
        }
        tag::NEG_INT_START..=tag::POS_INT_END => decode_int(part_tag, buf),
        tag::FLOAT => {
            ensure_remaining(buf, 8, "float key part")?;
            Ok(KeyPart::Float(sortable_to_float(buf.get_u64())))
        }
        tag::FALSE => Ok(KeyPart::False),
        tag::TRUE => Ok(KeyPart::True),
        other => Err(KvError::decode(format!(
            "unknown key part tag: 0x{:02x}",
            other
        ))),
    }
}

fn take_escaped(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(KvError::decode(
                "unterminated key part (missing 0x00 terminator)",
            ));
        }
        let byte = buf.get_u8();
        if byte != TERMINATOR {
            out.push(byte);
            continue;
        }
        if buf.first() == Some(&ESCAPE) {
            buf.advance(1);
            out.push(TERMINATOR);
        } else {
            return Ok(out);
        }
    }
}

fn decode_int(part_tag: u8, buf: &mut &[u8]) -> Result<KeyPart> {
    if part_tag == tag::INT_ZERO {
        return Ok(KeyPart::Int(BigInt::from(0)));
    }

    let (negative, len) = match part_tag {
        tag::NEG_INT_START => {
            ensure_remaining(buf, 1, "integer length")?;
            (true, (buf.get_u8() ^ 0xff) as usize)
        }
        tag::POS_INT_END => {
            ensure_remaining(buf, 1, "integer length")?;
            (false, buf.get_u8() as usize)
        }
        t if t < tag::INT_ZERO => (true, (tag::INT_ZERO - t) as usize),
        t => (false, (t - tag::INT_ZERO) as usize),
    };

    let long_form = part_tag == tag::NEG_INT_START || part_tag == tag::POS_INT_END;
    if long_form && len <= SHORT_INT_BYTES {
        return Err(KvError::decode(format!(
            "non-canonical integer: {} byte magnitude in long form",
            len
        )));
    }

    ensure_remaining(buf, len, "integer magnitude")?;
    let mut magnitude = buf[..len].to_vec();
    buf.advance(len);
    if negative {
        for byte in magnitude.iter_mut() {
            *byte = !*byte;
        }
    }
    if magnitude.first() == Some(&0) {
        return Err(KvError::decode("non-canonical integer: leading zero byte"));
    }

    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(KeyPart::Int(BigInt::from_bytes_be(sign, &magnitude)))
}

fn ensure_remaining(buf: &&[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(KvError::decode(format!(
            "truncated {}: expected {} bytes, got {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}
