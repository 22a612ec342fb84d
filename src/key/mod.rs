//! Key Module
//!
//! Typed tuple keys and their order-preserving binary encoding.
//!
//! ## Responsibilities
//! - Define the closed set of key part types and their total order
//! - Encode keys so unsigned byte comparison matches semantic comparison
//! - Decode stored keys back into typed parts
//!
//! ## Part Order
//! ```text
//! Bytes  <  String  <  Int  <  Float  <  False  <  True
//! ```
//! Within a type: bytes/strings compare lexicographically, integers
//! numerically, floats by IEEE-754 total order with NaNs canonicalized.
//! Keys compare part by part; a key sorts before every key it is a
//! proper prefix of.

mod codec;
mod part;

pub use codec::{decode_key, encode_key, encode_key_into};
pub use part::{canonicalize_f64, KeyPart};

use std::fmt;

/// An ordered sequence of key parts
///
/// The derived ordering is lexicographic over parts, which is exactly the
/// order of the encoded bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub Vec<KeyPart>);

impl Key {
    /// Create a key from its parts
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// The empty key (minimum of all keys)
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a part, returning the extended key
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    /// Whether `prefix`'s parts are a (not necessarily proper) prefix of this key
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl FromIterator<KeyPart> for Key {
    fn from_iter<I: IntoIterator<Item = KeyPart>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

/// Build a [`Key`] from values convertible into [`KeyPart`]
///
/// ```
/// use stampkv::key;
/// let k = key!["users", 42, true];
/// assert_eq!(k.len(), 3);
/// ```
#[macro_export]
macro_rules! key {
    ($($part:expr),* $(,)?) => {
        $crate::key::Key::new(vec![$($crate::key::KeyPart::from($part)),*])
    };
}
