//! Noder over the staging index.
//!
//! The index is a flat sorted list of paths; directories are synthetic,
//! rebuilt from the `/` segments. A directory node reports the
//! empty-hash sentinel (the index records no tree ids), so the engine
//! always descends into it.

use bstr::{BStr, BString, ByteSlice};
use grit_index::{Index, Stage};
use grit_object::FileMode;

use crate::tree_node::entry_hash;
use crate::{Noder, TrieError};

/// One node of the synthetic index trie.
pub struct IndexNoder {
    name: BString,
    kind: NodeKind,
}

enum NodeKind {
    File { hash: Vec<u8> },
    Dir { children: Vec<IndexNoder> },
}

impl IndexNoder {
    /// Build the trie for the stage-0 entries of an index.
    pub fn new(index: &Index) -> Self {
        let entries: Vec<(&BStr, Vec<u8>)> = index
            .entries()
            .iter()
            .filter(|e| e.stage == Stage::Normal)
            .map(|e| {
                let mode = normalize_mode(e.mode);
                (e.path.as_bstr(), entry_hash(&e.id, mode))
            })
            .collect();
        Self {
            name: BString::default(),
            kind: NodeKind::Dir {
                children: build_level(&entries),
            },
        }
    }
}

fn normalize_mode(mode: FileMode) -> FileMode {
    // Unknown modes in old indexes collapse onto the regular file mode.
    match mode {
        FileMode::Unknown(_) => FileMode::Regular,
        other => other,
    }
}

/// Group one path level of already-sorted entries into nodes.
fn build_level(entries: &[(&BStr, Vec<u8>)]) -> Vec<IndexNoder> {
    let mut nodes = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        let (path, hash) = &entries[i];
        match path.find_byte(b'/') {
            None => {
                nodes.push(IndexNoder {
                    name: BString::from(*path),
                    kind: NodeKind::File { hash: hash.clone() },
                });
                i += 1;
            }
            Some(slash) => {
                let dir_name = &path[..slash];
                // Collect the run of entries under this directory.
                let run_end = entries[i..]
                    .iter()
                    .position(|(p, _)| {
                        !(p.starts_with(dir_name) && p.get(slash) == Some(&b'/'))
                    })
                    .map(|pos| i + pos)
                    .unwrap_or(entries.len());

                let stripped: Vec<(&BStr, Vec<u8>)> = entries[i..run_end]
                    .iter()
                    .map(|(p, h)| (p[slash + 1..].as_bstr(), h.clone()))
                    .collect();

                nodes.push(IndexNoder {
                    name: BString::from(dir_name),
                    kind: NodeKind::Dir {
                        children: build_level(&stripped),
                    },
                });
                i = run_end;
            }
        }
    }

    // Full-path order is not per-level name order ("a.txt" sorts before
    // the directory "a" as paths, after it as names); re-sort for the
    // engine's merge.
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}

impl Noder for IndexNoder {
    fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir { .. })
    }

    fn hash(&self) -> Option<Vec<u8>> {
        match &self.kind {
            NodeKind::File { hash } => Some(hash.clone()),
            NodeKind::Dir { .. } => None,
        }
    }

    fn children(&self) -> Result<Vec<Box<dyn Noder + '_>>, TrieError> {
        match &self.kind {
            NodeKind::File { .. } => Ok(Vec::new()),
            NodeKind::Dir { children } => Ok(children
                .iter()
                .map(|c| Box::new(NoderRef(c)) as Box<dyn Noder + '_>)
                .collect()),
        }
    }
}

struct NoderRef<'a>(&'a IndexNoder);

impl Noder for NoderRef<'_> {
    fn name(&self) -> &BStr {
        self.0.name()
    }
    fn is_dir(&self) -> bool {
        self.0.is_dir()
    }
    fn hash(&self) -> Option<Vec<u8>> {
        self.0.hash()
    }
    fn children(&self) -> Result<Vec<Box<dyn Noder + '_>>, TrieError> {
        self.0.children()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diff, hash_equals, Action, TreeNoder};
    use grit_hash::{HashFormat, ObjectId};
    use grit_index::{EntryFlags, IndexEntry, StatData};
    use grit_object::{ObjectKind, Tree, TreeEntry};
    use grit_odb::Odb;

    fn index_with(paths: &[(&str, ObjectId)]) -> Index {
        let mut index = Index::new(HashFormat::Sha1);
        for (path, id) in paths {
            index.upsert(IndexEntry {
                path: BString::from(*path),
                id: *id,
                mode: FileMode::Regular,
                stage: Stage::Normal,
                stat: StatData::default(),
                flags: EntryFlags::default(),
            });
        }
        index
    }

    #[test]
    fn index_matching_tree_diffs_empty() {
        let dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(dir.path(), HashFormat::Sha1).unwrap();

        let blob = odb.put_raw(ObjectKind::Blob, b"content").unwrap();
        let sub = Tree {
            entries: vec![TreeEntry::new(FileMode::Regular, "inner.txt", blob).unwrap()],
        };
        let sub_id = odb
            .put_raw(ObjectKind::Tree, &sub.serialize_content())
            .unwrap();
        let root = Tree {
            entries: vec![
                TreeEntry::new(FileMode::Regular, "top.txt", blob).unwrap(),
                TreeEntry::new(FileMode::Dir, "sub", sub_id).unwrap(),
            ],
        };
        let root_id = odb
            .put_raw(ObjectKind::Tree, &root.serialize_content())
            .unwrap();

        let index = index_with(&[("sub/inner.txt", blob), ("top.txt", blob)]);

        let changes = diff(
            &TreeNoder::new(&odb, root_id),
            &IndexNoder::new(&index),
            &hash_equals,
        )
        .unwrap();
        assert!(changes.is_empty(), "unexpected changes: {changes:?}");
    }

    #[test]
    fn staged_change_shows_as_modify() {
        let dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(dir.path(), HashFormat::Sha1).unwrap();

        let old_blob = odb.put_raw(ObjectKind::Blob, b"old").unwrap();
        let new_blob = odb.put_raw(ObjectKind::Blob, b"new").unwrap();
        let root = Tree {
            entries: vec![TreeEntry::new(FileMode::Regular, "f.txt", old_blob).unwrap()],
        };
        let root_id = odb
            .put_raw(ObjectKind::Tree, &root.serialize_content())
            .unwrap();

        let index = index_with(&[("f.txt", new_blob)]);
        let changes = diff(
            &TreeNoder::new(&odb, root_id),
            &IndexNoder::new(&index),
            &hash_equals,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, Action::Modify);
        assert_eq!(changes[0].path, "f.txt");
    }

    #[test]
    fn conflict_stages_are_excluded() {
        let mut index = index_with(&[("clean.txt", ObjectId::ZERO_SHA1)]);
        index.upsert(IndexEntry {
            path: BString::from("conflicted.txt"),
            id: ObjectId::ZERO_SHA1,
            mode: FileMode::Regular,
            stage: Stage::Ours,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        });

        let noder = IndexNoder::new(&index);
        let children = noder.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), "clean.txt");
    }
}
