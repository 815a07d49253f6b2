//! Worktree status: the three-way comparison of HEAD, index, and
//! filesystem.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bstr::{BStr, BString, ByteSlice};
use grit_index::Stage;
use grit_object::FileMode;
use grit_trie::tree_node::entry_hash;
use grit_trie::{diff, hash_equals, Action, FsNoder, IndexNoder, TreeNoder};

use crate::worktree::Worktree;
use crate::RepoError;

/// The state of one path in one column of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStatus {
    #[default]
    Unmodified,
    Added,
    Deleted,
    Modified,
    Untracked,
    /// A recorded submodule with no checkout yet.
    Uninitialized,
}

/// One changed path: its staging-area state and its worktree state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: BString,
    pub staging: PathStatus,
    pub worktree: PathStatus,
}

/// The full status, sorted by path. Paths with no change in either
/// column are not listed.
#[derive(Debug, Default)]
pub struct Status {
    entries: Vec<StatusEntry>,
}

impl Status {
    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn entry(&self, path: &BStr) -> Option<&StatusEntry> {
        self.entries.iter().find(|e| e.path.as_bstr() == path)
    }

    /// No changes staged or unstaged anywhere?
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Worktree<'_> {
    /// Compute status from the two canonical diffs:
    /// HEAD tree ↔ index (staging column) and index ↔ filesystem
    /// (worktree column).
    pub fn status(&self) -> Result<Status, RepoError> {
        let repo = self.repo;
        let odb = repo.odb();
        let index = repo.index()?;

        // Staging column.
        let head_tree = match repo.head_id()? {
            Some(commit_id) => {
                let encoded = odb.get(Some(grit_object::ObjectKind::Commit), &commit_id)?;
                Some(grit_object::Commit::parse(&encoded.data)?.tree)
            }
            None => None,
        };
        let head_noder = match head_tree {
            Some(tree) => TreeNoder::new(odb, tree),
            None => TreeNoder::empty(odb),
        };
        let staged = diff(&head_noder, &IndexNoder::new(&index), &hash_equals)?;

        // Worktree column, with the stat cache feeding known hashes so
        // unchanged files are never re-read.
        let mut known: HashMap<std::path::PathBuf, Vec<u8>> = HashMap::new();
        for entry in index.entries() {
            if entry.stage != Stage::Normal || entry.mode.is_submodule() {
                continue;
            }
            let path = self.file_path(entry.path.as_bstr());
            if let Ok(meta) = std::fs::symlink_metadata(&path) {
                if entry.flags.assume_valid || entry.stat.matches(&meta) {
                    known.insert(path, entry_hash(&entry.id, entry.mode));
                }
            }
        }

        let fs_noder = FsNoder::new(&self.root, repo.format())
            .with_filemode(repo.config().filemode)
            .with_known_hashes(Arc::new(known));
        let unstaged = diff(&IndexNoder::new(&index), &fs_noder, &hash_equals)?;

        // Merge the two columns.
        let mut merged: BTreeMap<BString, StatusEntry> = BTreeMap::new();
        for change in staged {
            let entry = merged
                .entry(change.path.clone())
                .or_insert_with(|| StatusEntry {
                    path: change.path.clone(),
                    staging: PathStatus::Unmodified,
                    worktree: PathStatus::Unmodified,
                });
            entry.staging = match change.action {
                Action::Insert => PathStatus::Added,
                Action::Delete => PathStatus::Deleted,
                Action::Modify => PathStatus::Modified,
            };
        }
        for change in unstaged {
            let entry = merged
                .entry(change.path.clone())
                .or_insert_with(|| StatusEntry {
                    path: change.path.clone(),
                    staging: PathStatus::Unmodified,
                    worktree: PathStatus::Unmodified,
                });
            entry.worktree = match change.action {
                Action::Insert => PathStatus::Untracked,
                Action::Delete => PathStatus::Deleted,
                Action::Modify => PathStatus::Modified,
            };
        }

        // Submodule rows: a recorded gitlink with no checkout reports
        // Uninitialized rather than Deleted.
        for entry in index.entries() {
            if entry.stage != Stage::Normal || entry.mode != FileMode::Submodule {
                continue;
            }
            let checkout = self.file_path(entry.path.as_bstr());
            if !checkout.join(".git").exists() {
                let row = merged
                    .entry(entry.path.clone())
                    .or_insert_with(|| StatusEntry {
                        path: entry.path.clone(),
                        staging: PathStatus::Unmodified,
                        worktree: PathStatus::Unmodified,
                    });
                row.worktree = PathStatus::Uninitialized;
            }
        }

        Ok(Status {
            entries: merged.into_values().collect(),
        })
    }
}
