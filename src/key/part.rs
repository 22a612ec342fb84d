//! Key part definitions
//!
//! The tagged union of key part types and its total order.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_bigint::BigInt;

/// Canonical positive NaN (quiet, empty payload)
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// Canonical negative NaN
const CANONICAL_NEG_NAN: u64 = 0xfff8_0000_0000_0000;

/// A single component of a key
#[derive(Debug, Clone)]
pub enum KeyPart {
    Bytes(Vec<u8>),
    String(String),
    Int(BigInt),
    Float(f64),
    False,
    True,
}

impl KeyPart {
    /// Position of this part's type in the cross-type order
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Float(_) => 3,
            KeyPart::False => 4,
            KeyPart::True => 5,
        }
    }
}

/// Collapse every NaN bit pattern onto one representative per sign.
pub fn canonicalize_f64(value: f64) -> f64 {
    if !value.is_nan() {
        return value;
    }
    if value.is_sign_negative() {
        f64::from_bits(CANONICAL_NEG_NAN)
    } else {
        f64::from_bits(CANONICAL_NAN)
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => {
                canonicalize_f64(*a).total_cmp(&canonicalize_f64(*b))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyPart::Bytes(b) => b.hash(state),
            KeyPart::String(s) => s.hash(state),
            KeyPart::Int(n) => n.hash(state),
            KeyPart::Float(f) => canonicalize_f64(*f).to_bits().hash(state),
            KeyPart::False | KeyPart::True => {}
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b {
                    write!(f, "{}", std::ascii::escape_default(*byte))?;
                }
                write!(f, "\"")
            }
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(n) => write!(f, "{}n", n),
            KeyPart::Float(v) => write!(f, "{:?}", v),
            KeyPart::False => write!(f, "false"),
            KeyPart::True => write!(f, "true"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(b: Vec<u8>) -> Self {
        KeyPart::Bytes(b)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(b: &[u8]) -> Self {
        KeyPart::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for KeyPart {
    fn from(b: &[u8; N]) -> Self {
        KeyPart::Bytes(b.to_vec())
    }
}

impl From<BigInt> for KeyPart {
    fn from(n: BigInt) -> Self {
        KeyPart::Int(n)
    }
}

macro_rules! int_key_part {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KeyPart {
                fn from(n: $t) -> Self {
                    KeyPart::Int(BigInt::from(n))
                }
            }
        )*
    };
}

int_key_part!(i32, i64, i128, u32, u64, u128, usize);

impl From<f64> for KeyPart {
    fn from(v: f64) -> Self {
        KeyPart::Float(v)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        if b {
            KeyPart::True
        } else {
            KeyPart::False
        }
    }
}
