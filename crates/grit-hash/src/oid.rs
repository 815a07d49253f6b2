use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::hex;
use crate::{HashError, HashFormat};

/// A git object identifier: the content hash of an encoded object.
///
/// Carries the raw digest inline, one variant per supported hash format.
/// Equality is constant-time over the digest bytes; ordering is
/// lexicographic (the order pack indexes and ref listings use).
#[derive(Clone, Copy, Eq, Hash)]
pub enum ObjectId {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl ObjectId {
    /// The SHA-1 zero id (the "null hash" sentinel).
    pub const ZERO_SHA1: Self = Self::Sha1([0u8; 20]);
    /// The SHA-256 zero id.
    pub const ZERO_SHA256: Self = Self::Sha256([0u8; 32]);

    /// Build an id from raw digest bytes of the given format.
    pub fn from_bytes(bytes: &[u8], format: HashFormat) -> Result<Self, HashError> {
        let expected = format.raw_len();
        if bytes.len() != expected {
            return Err(HashError::InvalidHashLength {
                expected,
                actual: bytes.len(),
            });
        }
        match format {
            HashFormat::Sha1 => {
                let mut raw = [0u8; 20];
                raw.copy_from_slice(bytes);
                Ok(Self::Sha1(raw))
            }
            HashFormat::Sha256 => {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(bytes);
                Ok(Self::Sha256(raw))
            }
        }
    }

    /// Parse from hex; the format is inferred from the length
    /// (40 chars → SHA-1, 64 chars → SHA-256).
    pub fn from_hex(hex_str: &str) -> Result<Self, HashError> {
        let format =
            HashFormat::from_hex_len(hex_str.len()).ok_or(HashError::InvalidHexLength {
                expected: 40,
                actual: hex_str.len(),
            })?;
        match format {
            HashFormat::Sha1 => {
                let mut raw = [0u8; 20];
                hex::decode_into(hex_str, &mut raw)?;
                Ok(Self::Sha1(raw))
            }
            HashFormat::Sha256 => {
                let mut raw = [0u8; 32];
                hex::decode_into(hex_str, &mut raw)?;
                Ok(Self::Sha256(raw))
            }
        }
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(raw) => raw,
            Self::Sha256(raw) => raw,
        }
    }

    /// The hash format this id belongs to.
    pub fn format(&self) -> HashFormat {
        match self {
            Self::Sha1(_) => HashFormat::Sha1,
            Self::Sha256(_) => HashFormat::Sha256,
        }
    }

    /// Is this the all-zeros sentinel?
    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// The first digest byte (fan-out table index).
    pub fn first_byte(&self) -> u8 {
        self.as_bytes()[0]
    }
}

// Object ids are routinely compared against attacker-supplied data during
// negotiation, so equality must not leak a matching prefix through timing.
impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.as_bytes(), other.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        let mut diff = 0u8;
        for (x, y) in a.iter().zip(b) {
            diff |= x ^ y;
        }
        diff == 0
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
