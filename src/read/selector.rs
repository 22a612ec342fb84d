//! Selectors
//!
//! Which keys a list covers, and the encoded byte range that implies.
//!
//! ```text
//!   Prefix { p }           [enc(p) 00, enc(p) FF)
//!   PrefixStart { p, s }   [enc(s),    enc(p) FF)
//!   PrefixEnd { p, e }     [enc(p) 00, enc(e))
//!   Range { s, e }         [enc(s),    enc(e))
//! ```
//! Prefix forms cover keys strictly longer than the prefix; the prefix key
//! itself is not listed.

use crate::error::{KvError, Result};
use crate::key::{encode_key, Key};

/// Key selection for a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Prefix { prefix: Key },
    PrefixStart { prefix: Key, start: Key },
    PrefixEnd { prefix: Key, end: Key },
    Range { start: Key, end: Key },
}

/// Encoded bounds of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorBounds {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    /// Bytes shared by every key in range; cursors are relative to it
    pub common_prefix: Vec<u8>,
}

impl Selector {
    /// Build a selector from optional parts
    ///
    /// Valid shapes: prefix alone, prefix with start, prefix with end, or
    /// start with end. Anything else is a [`KvError::Validation`].
    pub fn new(prefix: Option<Key>, start: Option<Key>, end: Option<Key>) -> Result<Self> {
        match (prefix, start, end) {
            (Some(_), Some(_), Some(_)) => Err(KvError::validation(
                "selector cannot combine a prefix with both start and end",
            )),
            (Some(prefix), None, None) => Ok(Selector::Prefix { prefix }),
            (Some(prefix), Some(start), None) => {
                ensure_within(&prefix, &start, "start")?;
                Ok(Selector::PrefixStart { prefix, start })
            }
            (Some(prefix), None, Some(end)) => {
                ensure_within(&prefix, &end, "end")?;
                Ok(Selector::PrefixEnd { prefix, end })
            }
            (None, Some(start), Some(end)) => {
                if start > end {
                    return Err(KvError::validation(format!(
                        "start key {} is greater than end key {}",
                        start, end
                    )));
                }
                Ok(Selector::Range { start, end })
            }
            (None, _, _) => Err(KvError::validation(
                "selector requires a prefix, or both start and end",
            )),
        }
    }

    pub fn prefix(prefix: Key) -> Self {
        Selector::Prefix { prefix }
    }

    pub fn prefix_start(prefix: Key, start: Key) -> Result<Self> {
        Self::new(Some(prefix), Some(start), None)
    }

    pub fn prefix_end(prefix: Key, end: Key) -> Result<Self> {
        Self::new(Some(prefix), None, Some(end))
    }

    pub fn range(start: Key, end: Key) -> Result<Self> {
        Self::new(None, Some(start), Some(end))
    }

    pub(crate) fn bounds(&self) -> Result<SelectorBounds> {
        match self {
            Selector::Prefix { prefix } => {
                let encoded = encode_key(prefix)?;
                Ok(SelectorBounds {
                    start: with_byte(&encoded, 0x00),
                    end: with_byte(&encoded, 0xff),
                    common_prefix: encoded,
                })
            }
            Selector::PrefixStart { prefix, start } => {
                let encoded = encode_key(prefix)?;
                Ok(SelectorBounds {
                    start: encode_key(start)?,
                    end: with_byte(&encoded, 0xff),
                    common_prefix: encoded,
                })
            }
            Selector::PrefixEnd { prefix, end } => {
                let encoded = encode_key(prefix)?;
                Ok(SelectorBounds {
                    start: with_byte(&encoded, 0x00),
                    end: encode_key(end)?,
                    common_prefix: encoded,
                })
            }
            Selector::Range { start, end } => {
                let start = encode_key(start)?;
                let end = encode_key(end)?;
                let shared = start
                    .iter()
                    .zip(end.iter())
                    .take_while(|(a, b)| a == b)
                    .count();
                Ok(SelectorBounds {
                    common_prefix: start[..shared].to_vec(),
                    start,
                    end,
                })
            }
        }
    }
}

fn ensure_within(prefix: &Key, key: &Key, which: &str) -> Result<()> {
    if key.len() > prefix.len() && key.starts_with(prefix) {
        Ok(())
    } else {
        Err(KvError::validation(format!(
            "{} key {} is not within prefix {}",
            which, key, prefix
        )))
    }
}

fn with_byte(bytes: &[u8], byte: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.extend_from_slice(bytes);
    out.push(byte);
    out
}
