use grit_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

/// Depth bound for symbolic ref chains: a chain longer than this is
/// treated as a cycle.
pub const MAX_RESOLVE_DEPTH: usize = 10;

/// Pluggable reference storage.
///
/// All mutations are serialized by the implementation;
/// [`compare_and_set`](RefStore::compare_and_set) is the only safe way
/// to advance a ref under contention.
pub trait RefStore: Send + Sync {
    /// Read a ref without following symbolic targets.
    ///
    /// `Ok(None)` when the ref does not exist.
    fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError>;

    /// Write a ref (hash or symbolic), unconditionally.
    fn set(&self, reference: &Reference) -> Result<(), RefError>;

    /// Compare-and-set: write `new` only if the stored value equals
    /// `expected` (`None` = must not exist). Divergence fails with
    /// [`RefError::ReferenceHasChanged`].
    fn compare_and_set(
        &self,
        new: &Reference,
        expected: Option<&Reference>,
    ) -> Result<(), RefError>;

    /// Remove a ref. Removing a non-existent ref is not an error.
    fn remove(&self, name: &RefName) -> Result<(), RefError>;

    /// Enumerate all refs, sorted by name, loose entries shadowing
    /// packed ones.
    fn iter(&self) -> Result<Vec<Reference>, RefError>;

    /// Resolve a name to a hash ref, chasing symbolic chains up to
    /// [`MAX_RESOLVE_DEPTH`] hops.
    ///
    /// A symbolic ref pointing at a missing ref (an unborn branch) fails
    /// with [`RefError::NotFound`]; a chain longer than the bound fails
    /// with [`RefError::MaxRefDepth`].
    fn resolve(&self, name: &RefName) -> Result<ObjectId, RefError> {
        let mut current = name.clone();
        for _ in 0..=MAX_RESOLVE_DEPTH {
            match self.get(&current)? {
                Some(Reference::Hash { target, .. }) => return Ok(target),
                Some(Reference::Symbolic { target, .. }) => current = target,
                None => return Err(RefError::NotFound(current.to_string())),
            }
        }
        Err(RefError::MaxRefDepth(name.to_string()))
    }
}
