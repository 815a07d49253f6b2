//! Path-filtered history: the commits that changed one file.

use bstr::{BStr, ByteSlice};
use grit_hash::ObjectId;
use grit_object::{Commit, ObjectKind, Tree};
use grit_odb::Odb;

use crate::walk::{RevWalk, WalkOrder};
use crate::{read_commit, WalkError};

/// Iterator over the commits in which `path`'s resolved blob differs
/// from that of every parent.
///
/// A commit whose blob matches any parent's blob is suppressed — across
/// a merge, the side that carried the content unchanged wins. Rename
/// detection is out of scope: a renamed file logs as delete + add.
pub struct FileLog<'o> {
    odb: &'o Odb,
    walk: RevWalk<'o>,
    path: Vec<u8>,
}

impl<'o> FileLog<'o> {
    pub fn new(odb: &'o Odb, tip: ObjectId, path: &BStr) -> Result<Self, WalkError> {
        let mut walk = RevWalk::new(odb, WalkOrder::CommitterTime);
        walk.push(tip)?;
        Ok(Self {
            odb,
            walk,
            path: path.to_vec(),
        })
    }

    /// Release the underlying walk.
    pub fn close(&mut self) {
        self.walk.close();
    }

    /// The blob id `path` resolves to in `commit`'s tree, if present.
    fn blob_at(&self, commit: &Commit) -> Result<Option<ObjectId>, WalkError> {
        resolve_path(self.odb, &commit.tree, self.path.as_bstr())
    }

    fn changed_in(&self, commit: &Commit) -> Result<bool, WalkError> {
        let own = self.blob_at(commit)?;

        if commit.parents.is_empty() {
            // A root commit logs iff the path exists there.
            return Ok(own.is_some());
        }

        for parent_id in &commit.parents {
            if !self.odb.has(parent_id) {
                continue;
            }
            let parent = read_commit(self.odb, parent_id)?;
            let theirs = resolve_path(self.odb, &parent.tree, self.path.as_bstr())?;
            if own == theirs {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Walk a tree by `/`-separated path segments down to a leaf id.
pub fn resolve_path(
    odb: &Odb,
    tree_id: &ObjectId,
    path: &BStr,
) -> Result<Option<ObjectId>, WalkError> {
    let mut current = *tree_id;
    let mut segments = path.split(|&b| b == b'/').peekable();

    while let Some(segment) = segments.next() {
        let encoded = odb.get(Some(ObjectKind::Tree), &current)?;
        let tree = Tree::parse(&encoded.data, odb.format())?;
        let Some(entry) = tree.find(segment.as_bstr()) else {
            return Ok(None);
        };
        if segments.peek().is_none() {
            return Ok(Some(entry.id));
        }
        if !entry.mode.is_dir() {
            return Ok(None);
        }
        current = entry.id;
    }
    Ok(None)
}

impl Iterator for FileLog<'_> {
    type Item = Result<(ObjectId, Commit), WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, commit) = match self.walk.next()? {
                Ok(found) => found,
                Err(e) => return Some(Err(e)),
            };
            match self.changed_in(&commit) {
                Ok(true) => return Some(Ok((id, commit))),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
