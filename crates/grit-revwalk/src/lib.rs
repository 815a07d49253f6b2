//! Commit history traversal.
//!
//! Iterators over the commit DAG reachable from one or more tips:
//! committer-time order (max-heap), topological order (Kahn's
//! algorithm), first-parent chains, and a path-filtered file log.
//! Walks stop at the shallow boundary, are resumable from a frontier
//! snapshot, and are closeable.

mod filelog;
mod walk;

pub use filelog::FileLog;
pub use walk::{RevWalk, WalkOrder, WalkSnapshot};

use grit_hash::ObjectId;

/// Errors from history traversal.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("not a commit: {0}")]
    NotACommit(ObjectId),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),
}

pub(crate) fn read_commit(
    odb: &grit_odb::Odb,
    id: &ObjectId,
) -> Result<grit_object::Commit, WalkError> {
    let encoded = odb
        .get(Some(grit_object::ObjectKind::Commit), id)
        .map_err(|e| match e {
            grit_odb::OdbError::KindMismatch { id, .. } => WalkError::NotACommit(id),
            other => WalkError::Odb(other),
        })?;
    Ok(grit_object::Commit::parse(&encoded.data)?)
}
