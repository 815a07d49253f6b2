//! Packfile reading, writing, delta codec, and pack index v2.
//!
//! Packfiles are both the on-disk storage optimization and the wire
//! format of fetch/push. A pack is `PACK` + version + object count,
//! followed by zlib-compressed records (full objects or OFS/REF deltas),
//! terminated by a hash of everything before it. The index (v2) maps ids
//! to pack offsets through a 256-entry fan-out plus binary search.

pub mod delta;
pub mod entry;
pub mod index;
pub mod index_write;
pub mod pack;
pub mod parse;
pub mod write;

use grit_hash::ObjectId;
use grit_object::ObjectKind;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta chain too deep (>{max_depth} levels) at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max_depth: usize },

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error("CRC mismatch for entry at offset {offset}")]
    CrcMismatch { offset: u64 },

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

impl From<grit_utils::UtilError> for PackError {
    fn from(e: grit_utils::UtilError) -> Self {
        match e {
            grit_utils::UtilError::Canceled => PackError::Canceled,
            grit_utils::UtilError::Io(e) => PackError::Io(e),
            other => PackError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Kind tag of a raw pack record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base lives earlier in the same pack, addressed by a
    /// backward offset.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is addressed by object id (possibly outside the
    /// pack, for thin packs).
    RefDelta { base_id: ObjectId },
}

impl RecordKind {
    /// The object kind, for non-delta records.
    pub fn object_kind(self) -> Option<ObjectKind> {
        match self {
            Self::Commit => Some(ObjectKind::Commit),
            Self::Tree => Some(ObjectKind::Tree),
            Self::Blob => Some(ObjectKind::Blob),
            Self::Tag => Some(ObjectKind::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// The record's wire type number (1..4, 6, 7).
    pub fn type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Self::OfsDelta { .. } | Self::RefDelta { .. })
    }
}

/// The wire type number of an object kind.
pub fn kind_type_number(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Commit => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Blob => 3,
        ObjectKind::Tag => 4,
    }
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_HEADER_SIZE: usize = 12;
/// Versions this reader accepts (v3 differs only in the declared hash).
pub const SUPPORTED_PACK_VERSIONS: &[u32] = &[2, 3];
/// The version this writer emits.
pub const DEFAULT_PACK_VERSION: u32 = 2;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Delta chains deeper than this indicate corruption.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;
