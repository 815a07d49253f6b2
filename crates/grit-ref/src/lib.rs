//! References for grit: the ref namespace, the files backend
//! (loose refs + packed-refs), and refspec matching.
//!
//! A reference is either a hash ref (name → object id) or a symbolic
//! ref (name → another ref name). `HEAD` pointing at a branch that does
//! not exist yet is the normal state of a fresh repository, not an
//! error. Mutations go through the store and are atomic against
//! concurrent readers; compare-and-set is the only safe way to advance
//! a ref under contention.

mod error;
pub mod files;
mod name;
mod refspec;
mod store;

pub use error::RefError;
pub use files::packed::{PackedRef, PackedRefs};
pub use files::FilesRefStore;
pub use name::RefName;
pub use refspec::RefSpec;
pub use store::RefStore;

use grit_hash::ObjectId;

/// A git reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Points directly at an object.
    Hash { name: RefName, target: ObjectId },
    /// Points at another ref by name.
    Symbolic { name: RefName, target: RefName },
}

impl Reference {
    pub fn hash(name: RefName, target: ObjectId) -> Self {
        Self::Hash { name, target }
    }

    pub fn symbolic(name: RefName, target: RefName) -> Self {
        Self::Symbolic { name, target }
    }

    pub fn name(&self) -> &RefName {
        match self {
            Reference::Hash { name, .. } => name,
            Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    /// The object id, for hash refs.
    pub fn target_id(&self) -> Option<ObjectId> {
        match self {
            Reference::Hash { target, .. } => Some(*target),
            Reference::Symbolic { .. } => None,
        }
    }

    /// The target name, for symbolic refs.
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Hash { .. } => None,
        }
    }

    /// Encode as the content of a loose ref file.
    pub fn to_file_content(&self) -> String {
        match self {
            Reference::Hash { target, .. } => format!("{}\n", target.to_hex()),
            Reference::Symbolic { target, .. } => format!("ref: {}\n", target),
        }
    }

    /// Decode from the content of a loose ref file.
    pub fn from_file_content(name: RefName, content: &[u8]) -> Result<Self, RefError> {
        let trimmed: &[u8] = {
            let mut s = content;
            while s.last().is_some_and(|b| b.is_ascii_whitespace()) {
                s = &s[..s.len() - 1];
            }
            while s.first().is_some_and(|b| b.is_ascii_whitespace()) {
                s = &s[1..];
            }
            s
        };

        if let Some(target) = trimmed.strip_prefix(b"ref: ") {
            let target_str = std::str::from_utf8(target)
                .map_err(|_| RefError::Parse("non-UTF8 symbolic target".into()))?;
            Ok(Reference::Symbolic {
                name,
                target: RefName::new(target_str.trim())?,
            })
        } else {
            let hex = std::str::from_utf8(trimmed)
                .map_err(|_| RefError::Parse("non-UTF8 ref content".into()))?;
            Ok(Reference::Hash {
                name,
                target: ObjectId::from_hex(hex)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_content_roundtrip_hash() {
        let name = RefName::new("refs/heads/main").unwrap();
        let id = ObjectId::from_hex("6ecf0ef2c2dffb796033e5a02219af86ec6584e5").unwrap();
        let reference = Reference::hash(name.clone(), id);

        let content = reference.to_file_content();
        assert_eq!(content, "6ecf0ef2c2dffb796033e5a02219af86ec6584e5\n");
        assert_eq!(
            Reference::from_file_content(name, content.as_bytes()).unwrap(),
            reference
        );
    }

    #[test]
    fn file_content_roundtrip_symbolic() {
        let head = RefName::new("HEAD").unwrap();
        let target = RefName::new("refs/heads/main").unwrap();
        let reference = Reference::symbolic(head.clone(), target);

        let content = reference.to_file_content();
        assert_eq!(content, "ref: refs/heads/main\n");
        assert_eq!(
            Reference::from_file_content(head, content.as_bytes()).unwrap(),
            reference
        );
    }

    #[test]
    fn accessors() {
        let name = RefName::new("refs/heads/dev").unwrap();
        let symbolic = Reference::symbolic(
            RefName::new("HEAD").unwrap(),
            name.clone(),
        );
        assert!(symbolic.is_symbolic());
        assert_eq!(symbolic.target_id(), None);
        assert_eq!(symbolic.symbolic_target(), Some(&name));
    }
}
