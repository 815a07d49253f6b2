//! Noder over stored tree objects.

use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_object::{FileMode, ObjectKind, Tree};
use grit_odb::Odb;

use crate::{Noder, TrieError};

/// A tree-object-backed trie node.
///
/// The hash of a file entry is its blob id plus the file mode, so a
/// chmod shows up as a modification. Directory nodes carry their tree
/// id, which lets the engine prune identical subtrees.
pub struct TreeNoder<'o> {
    odb: &'o Odb,
    name: BString,
    id: ObjectId,
    mode: FileMode,
}

impl<'o> TreeNoder<'o> {
    /// The root noder for a tree id.
    pub fn new(odb: &'o Odb, tree_id: ObjectId) -> Self {
        Self {
            odb,
            name: BString::default(),
            id: tree_id,
            mode: FileMode::Dir,
        }
    }

    /// An empty root (the diff base of an unborn HEAD).
    pub fn empty(odb: &'o Odb) -> Self {
        Self::new(odb, odb.format().zero())
    }

    fn is_empty_root(&self) -> bool {
        self.id.is_zero()
    }
}

/// Hash a (id, mode) pair the way all trie sources do.
pub fn entry_hash(id: &ObjectId, mode: FileMode) -> Vec<u8> {
    let mut hash = id.as_bytes().to_vec();
    hash.extend_from_slice(&mode.raw().to_le_bytes());
    hash
}

impl Noder for TreeNoder<'_> {
    fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    fn hash(&self) -> Option<Vec<u8>> {
        if self.is_empty_root() {
            return None;
        }
        Some(entry_hash(&self.id, self.mode))
    }

    fn children(&self) -> Result<Vec<Box<dyn Noder + '_>>, TrieError> {
        if !self.mode.is_dir() || self.is_empty_root() {
            return Ok(Vec::new());
        }

        let encoded = self.odb.get(Some(ObjectKind::Tree), &self.id)?;
        let tree = Tree::parse(&encoded.data, self.odb.format())?;

        let mut children: Vec<Box<dyn Noder + '_>> = tree
            .entries
            .into_iter()
            .map(|entry| {
                Box::new(TreeNoder {
                    odb: self.odb,
                    name: entry.name,
                    id: entry.id,
                    mode: entry.mode,
                }) as Box<dyn Noder + '_>
            })
            .collect();
        // Trees arrive in canonical order (dirs with a virtual '/');
        // the merge in the engine wants plain byte order.
        children.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diff, hash_equals, Action};
    use grit_hash::HashFormat;
    use grit_object::TreeEntry;

    fn store() -> (tempfile::TempDir, Odb) {
        let dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(dir.path(), HashFormat::Sha1).unwrap();
        (dir, odb)
    }

    fn write_blob(odb: &Odb, data: &[u8]) -> ObjectId {
        odb.put_raw(ObjectKind::Blob, data).unwrap()
    }

    fn write_tree(odb: &Odb, entries: Vec<TreeEntry>) -> ObjectId {
        let tree = Tree { entries };
        odb.put_raw(ObjectKind::Tree, &tree.serialize_content())
            .unwrap()
    }

    #[test]
    fn diff_two_stored_trees() {
        let (_dir, odb) = store();

        let old_blob = write_blob(&odb, b"old");
        let new_blob = write_blob(&odb, b"new");
        let keep_blob = write_blob(&odb, b"keep");

        let old_tree = write_tree(
            &odb,
            vec![
                TreeEntry::new(FileMode::Regular, "changed.txt", old_blob).unwrap(),
                TreeEntry::new(FileMode::Regular, "kept.txt", keep_blob).unwrap(),
            ],
        );
        let new_tree = write_tree(
            &odb,
            vec![
                TreeEntry::new(FileMode::Regular, "changed.txt", new_blob).unwrap(),
                TreeEntry::new(FileMode::Regular, "kept.txt", keep_blob).unwrap(),
                TreeEntry::new(FileMode::Regular, "added.txt", new_blob).unwrap(),
            ],
        );

        let left = TreeNoder::new(&odb, old_tree);
        let right = TreeNoder::new(&odb, new_tree);
        let changes = diff(&left, &right, &hash_equals).unwrap();

        let summary: Vec<(Action, String)> = changes
            .iter()
            .map(|c| (c.action, c.path.to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Action::Insert, "added.txt".into()),
                (Action::Modify, "changed.txt".into()),
            ]
        );
    }

    #[test]
    fn mode_change_is_a_modification() {
        let (_dir, odb) = store();
        let blob = write_blob(&odb, b"#!/bin/sh\n");

        let plain = write_tree(
            &odb,
            vec![TreeEntry::new(FileMode::Regular, "run.sh", blob).unwrap()],
        );
        let exec = write_tree(
            &odb,
            vec![TreeEntry::new(FileMode::Executable, "run.sh", blob).unwrap()],
        );

        let changes = diff(
            &TreeNoder::new(&odb, plain),
            &TreeNoder::new(&odb, exec),
            &hash_equals,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, Action::Modify);
    }

    #[test]
    fn empty_root_diffs_as_all_inserts() {
        let (_dir, odb) = store();
        let blob = write_blob(&odb, b"content");
        let tree = write_tree(
            &odb,
            vec![TreeEntry::new(FileMode::Regular, "f.txt", blob).unwrap()],
        );

        let changes = diff(
            &TreeNoder::empty(&odb),
            &TreeNoder::new(&odb, tree),
            &hash_equals,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, Action::Insert);
    }

    #[test]
    fn identical_subtrees_are_pruned() {
        let (_dir, odb) = store();
        let blob = write_blob(&odb, b"deep");
        let sub = write_tree(
            &odb,
            vec![TreeEntry::new(FileMode::Regular, "inner.txt", blob).unwrap()],
        );
        let a = write_tree(
            &odb,
            vec![TreeEntry::new(FileMode::Dir, "sub", sub).unwrap()],
        );
        let b = write_tree(
            &odb,
            vec![TreeEntry::new(FileMode::Dir, "sub", sub).unwrap()],
        );

        let changes = diff(
            &TreeNoder::new(&odb, a),
            &TreeNoder::new(&odb, b),
            &hash_equals,
        )
        .unwrap();
        assert!(changes.is_empty());
    }
}
