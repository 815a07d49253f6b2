//! Worktree materialization: checkout and reset.

use std::fs;
use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice, ByteVec};
use grit_hash::ObjectId;
use grit_index::{EntryFlags, Index, IndexEntry, Stage, StatData};
use grit_object::{Commit, FileMode, ObjectKind, Tree};
use grit_ref::{RefName, RefStore, Reference};

use crate::{RepoError, Repository};

/// How checkout treats local modifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutMode {
    /// Refuse when the worktree differs from HEAD and the index.
    #[default]
    Safe,
    /// Overwrite whatever is there.
    Force,
}

/// What reset touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move HEAD only.
    Soft,
    /// Move HEAD and rewrite the index from the target tree.
    Mixed,
    /// Additionally materialize the worktree.
    Hard,
}

/// Handle for filesystem-facing operations of a non-bare repository.
pub struct Worktree<'r> {
    pub(crate) repo: &'r Repository,
    pub(crate) root: PathBuf,
}

impl<'r> Worktree<'r> {
    pub(crate) fn new(repo: &'r Repository, root: PathBuf) -> Self {
        Self { repo, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materialize `commit_id`'s tree into the worktree and rewrite the
    /// index to match.
    ///
    /// In [`CheckoutMode::Safe`], any local modification aborts with
    /// [`RepoError::DirtyWorktree`] before a single file is written.
    pub fn checkout(&self, commit_id: &ObjectId, mode: CheckoutMode) -> Result<(), RepoError> {
        if mode == CheckoutMode::Safe && !self.status()?.is_clean() {
            return Err(RepoError::DirtyWorktree);
        }

        let tree_id = self.commit_tree(commit_id)?;
        let old_index = self.repo.index()?;
        let mut entries = Vec::new();
        self.materialize_tree(&tree_id, &self.root, &BString::default(), &mut entries)?;

        // Tracked files that the target tree no longer has go away.
        let kept: std::collections::HashSet<&[u8]> =
            entries.iter().map(|e: &IndexEntry| e.path.as_slice()).collect();
        for old in old_index.entries() {
            if !kept.contains(old.path.as_slice()) {
                let path = self.file_path(old.path.as_bstr());
                match fs::remove_file(&path) {
                    Ok(()) => remove_empty_parents(&path, &self.root),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let mut index = Index::new(self.repo.format());
        index.set_entries(entries);
        index.write_to(self.repo.index_path())?;
        Ok(())
    }

    /// Reset HEAD's branch to `commit_id`, optionally the index and the
    /// worktree too.
    pub fn reset(&self, commit_id: &ObjectId, mode: ResetMode) -> Result<(), RepoError> {
        // Verify the target exists and is a commit before moving refs.
        let tree_id = self.commit_tree(commit_id)?;

        let head_name = RefName::new("HEAD")?;
        match self.repo.refs().get(&head_name)? {
            Some(Reference::Symbolic { target, .. }) => {
                self.repo
                    .refs()
                    .set(&Reference::hash(target, *commit_id))?;
            }
            _ => {
                // Detached (or missing) HEAD moves directly.
                self.repo
                    .refs()
                    .set(&Reference::hash(head_name, *commit_id))?;
            }
        }

        match mode {
            ResetMode::Soft => Ok(()),
            ResetMode::Mixed => {
                let mut entries = Vec::new();
                self.index_from_tree(&tree_id, &BString::default(), &mut entries)?;
                let mut index = Index::new(self.repo.format());
                index.set_entries(entries);
                index.write_to(self.repo.index_path())?;
                Ok(())
            }
            ResetMode::Hard => self.checkout(commit_id, CheckoutMode::Force),
        }
    }

    /// The absolute path of a tracked file.
    pub(crate) fn file_path(&self, rel: &bstr::BStr) -> PathBuf {
        let mut path = self.root.clone();
        for segment in rel.split(|&b| b == b'/') {
            path.push(segment.to_str_lossy().as_ref());
        }
        path
    }

    fn commit_tree(&self, commit_id: &ObjectId) -> Result<ObjectId, RepoError> {
        let encoded = self
            .repo
            .odb()
            .get(Some(ObjectKind::Commit), commit_id)?;
        Ok(Commit::parse(&encoded.data)?.tree)
    }

    /// Write one tree level to disk, accumulating new index entries.
    fn materialize_tree(
        &self,
        tree_id: &ObjectId,
        dir: &Path,
        prefix: &BString,
        entries: &mut Vec<IndexEntry>,
    ) -> Result<(), RepoError> {
        let encoded = self.repo.odb().get(Some(ObjectKind::Tree), tree_id)?;
        let tree = Tree::parse(&encoded.data, self.repo.format())?;

        fs::create_dir_all(dir)?;

        for entry in &tree.entries {
            let mut rel = prefix.clone();
            if !rel.is_empty() {
                rel.push_byte(b'/');
            }
            rel.push_str(&entry.name);
            let path = dir.join(entry.name.to_str_lossy().as_ref());

            match entry.mode {
                FileMode::Dir => {
                    self.materialize_tree(&entry.id, &path, &rel, entries)?;
                }
                FileMode::Regular | FileMode::Executable | FileMode::Unknown(_) => {
                    let blob = self.repo.odb().get(Some(ObjectKind::Blob), &entry.id)?;
                    write_file(&path, &blob.data, entry.mode, self.repo.config().filemode)?;
                    entries.push(self.entry_for(&path, rel, entry.mode, entry.id)?);
                }
                FileMode::Symlink => {
                    let blob = self.repo.odb().get(Some(ObjectKind::Blob), &entry.id)?;
                    write_symlink(&path, &blob.data)?;
                    entries.push(self.entry_for(&path, rel, FileMode::Symlink, entry.id)?);
                }
                FileMode::Submodule => {
                    // A stub directory plus an index record; nothing is
                    // fetched.
                    fs::create_dir_all(&path)?;
                    entries.push(IndexEntry {
                        path: rel,
                        id: entry.id,
                        mode: FileMode::Submodule,
                        stage: Stage::Normal,
                        stat: StatData::default(),
                        flags: EntryFlags::default(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Index entries for a tree without touching the filesystem
    /// (mixed reset): stat data is zeroed, forcing rehash on status.
    fn index_from_tree(
        &self,
        tree_id: &ObjectId,
        prefix: &BString,
        entries: &mut Vec<IndexEntry>,
    ) -> Result<(), RepoError> {
        let encoded = self.repo.odb().get(Some(ObjectKind::Tree), tree_id)?;
        let tree = Tree::parse(&encoded.data, self.repo.format())?;

        for entry in &tree.entries {
            let mut rel = prefix.clone();
            if !rel.is_empty() {
                rel.push_byte(b'/');
            }
            rel.push_str(&entry.name);

            if entry.mode.is_dir() {
                self.index_from_tree(&entry.id, &rel, entries)?;
            } else {
                entries.push(IndexEntry {
                    path: rel,
                    id: entry.id,
                    mode: entry.mode,
                    stage: Stage::Normal,
                    stat: StatData::default(),
                    flags: EntryFlags::default(),
                });
            }
        }
        Ok(())
    }

    fn entry_for(
        &self,
        path: &Path,
        rel: BString,
        mode: FileMode,
        id: ObjectId,
    ) -> Result<IndexEntry, RepoError> {
        let stat = fs::symlink_metadata(path)
            .map(|meta| StatData::from_metadata(&meta))
            .unwrap_or_default();
        Ok(IndexEntry {
            path: rel,
            id,
            mode,
            stage: Stage::Normal,
            stat,
            flags: EntryFlags::default(),
        })
    }
}

fn write_file(
    path: &Path,
    data: &[u8],
    mode: FileMode,
    honor_filemode: bool,
) -> Result<(), RepoError> {
    if fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
    {
        fs::remove_file(path)?;
    }
    fs::write(path, data)?;

    #[cfg(unix)]
    if honor_filemode {
        use std::os::unix::fs::PermissionsExt;
        let bits = if mode == FileMode::Executable {
            0o755
        } else {
            0o644
        };
        fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (mode, honor_filemode);
    }
    Ok(())
}

fn write_symlink(path: &Path, target: &[u8]) -> Result<(), RepoError> {
    match fs::symlink_metadata(path) {
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        let target = std::ffi::OsStr::from_bytes(target);
        std::os::unix::fs::symlink(target, path)?;
    }
    #[cfg(not(unix))]
    {
        // No symlink support: store the link target as file content.
        fs::write(path, target)?;
    }
    Ok(())
}

fn remove_empty_parents(path: &Path, root: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root {
            break;
        }
        if fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}
