//! Git object model: blob, tree, commit, tag parsing and serialization.
//!
//! Decoded objects are a tagged sum ([`Object`]); the encoded form stays a
//! neutral `(kind, bytes)` tuple ([`EncodedObject`]) whose id is
//! `hash("{kind} {len}\0" || content)`. Encode/decode round-trips are
//! byte-exact, including commit signature blocks and mergetag headers.

mod blob;
pub mod cache;
mod commit;
pub mod header;
pub mod sign;
mod tag;
mod tree;

pub use blob::Blob;
pub use commit::{Commit, CommitSignature, SignatureFormat};
pub use tag::Tag;
pub use tree::{FileMode, Tree, TreeEntry};

use bstr::BString;
use grit_hash::{HashError, HashFormat, ObjectId};

/// Errors produced by object codec operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object kind: {0}")]
    InvalidKind(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("invalid commit: missing '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("invalid tag: missing '{field}' header")]
    MissingTagField { field: &'static str },

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four kinds of git objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Parse from the kind name in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidKind(BString::from(s))),
        }
    }

    /// The canonical byte representation.
    pub fn as_bytes(&self) -> &'static [u8] {
        self.name().as_bytes()
    }

    /// The canonical name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// An object in its storage form: a kind tag plus raw content bytes.
///
/// This is what the object store traffics in; decoding into [`Object`]
/// happens lazily at the call sites that need structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl EncodedObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Logical content size (excluding the storage header).
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Compute the content-addressed id of this object.
    pub fn id(&self, format: HashFormat) -> Result<ObjectId, HashError> {
        grit_hash::hasher::Hasher::object_id(format, self.kind.name(), &self.data)
    }

    /// Decode into the structured form.
    pub fn decode(&self, format: HashFormat) -> Result<Object, ObjectError> {
        Object::decode(self.kind, &self.data, format)
    }
}

/// A decoded git object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
    Tag(Tag),
}

impl Object {
    /// Decode from content bytes with a known kind (no storage header).
    ///
    /// `format` fixes the raw-id width inside binary payloads (tree
    /// entries are `mode name\0<raw id>`).
    pub fn decode(
        kind: ObjectKind,
        content: &[u8],
        format: HashFormat,
    ) -> Result<Self, ObjectError> {
        match kind {
            ObjectKind::Commit => Ok(Self::Commit(Commit::parse(content)?)),
            ObjectKind::Tree => Ok(Self::Tree(Tree::parse(content, format)?)),
            ObjectKind::Blob => Ok(Self::Blob(Blob::parse(content))),
            ObjectKind::Tag => Ok(Self::Tag(Tag::parse(content)?)),
        }
    }

    /// Decode from raw bytes carrying the `"{kind} {len}\0"` header.
    pub fn decode_with_header(data: &[u8], format: HashFormat) -> Result<Self, ObjectError> {
        let (kind, content_size, header_len) = header::parse_header(data)?;
        let content = &data[header_len..];
        if content.len() < content_size {
            return Err(ObjectError::Truncated {
                expected: content_size,
                actual: content.len(),
            });
        }
        Self::decode(kind, &content[..content_size], format)
    }

    /// Serialize just the content (no storage header).
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Commit(c) => c.serialize_content(),
            Self::Tree(t) => t.serialize_content(),
            Self::Blob(b) => b.serialize_content().to_vec(),
            Self::Tag(t) => t.serialize_content(),
        }
    }

    /// Encode into the neutral storage form.
    pub fn encode(&self) -> EncodedObject {
        EncodedObject::new(self.kind(), self.serialize_content())
    }

    /// The object kind.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Compute the id by hashing the encoded form.
    pub fn compute_id(&self, format: HashFormat) -> Result<ObjectId, HashError> {
        self.encode().id(format)
    }
}
