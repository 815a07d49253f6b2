//! Staging (`add`) and committing.

use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;
use grit_index::{EntryFlags, Index, IndexEntry, Stage, StatData};
use grit_object::sign::Signer;
use grit_object::{
    Commit, CommitSignature, FileMode, Object, ObjectKind, SignatureFormat, Tree, TreeEntry,
};
use grit_odb::Odb;
use grit_ref::{RefName, RefStore, Reference};
use grit_utils::Identity;

use crate::worktree::Worktree;
use crate::RepoError;

/// Options for creating a commit.
#[derive(Debug, Clone)]
pub struct CommitOptions {
    pub author: Identity,
    pub committer: Identity,
    /// Accept a commit whose tree equals its parent's.
    pub allow_empty: bool,
    /// Additional parents beyond HEAD (merge commits).
    pub extra_parents: Vec<ObjectId>,
}

impl CommitOptions {
    pub fn new(author: Identity) -> Self {
        Self {
            committer: author.clone(),
            author,
            allow_empty: false,
            extra_parents: Vec::new(),
        }
    }
}

/// Placeholder signer for unsigned commits.
pub struct NoSigner;

impl Signer for NoSigner {
    type Error = std::convert::Infallible;
    fn sign(&self, _payload: &[u8]) -> Result<Vec<u8>, Self::Error> {
        unreachable!("NoSigner is never invoked")
    }
}

impl Worktree<'_> {
    /// Stage one file: hash its content into a blob and upsert the
    /// index entry with fresh stat data.
    ///
    /// A symlink stages the link target string, not the referent's
    /// bytes. A path that no longer exists on disk is removed from the
    /// index (`add` of a deletion).
    pub fn add(&self, rel_path: &BStr) -> Result<Option<ObjectId>, RepoError> {
        let path = self.file_path(rel_path);
        let mut index = self.repo.index()?;

        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                index.remove(rel_path);
                index.write_to(self.repo.index_path())?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let (content, mode) = if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path)?;
            (
                Vec::from(target.to_string_lossy().as_bytes()),
                FileMode::Symlink,
            )
        } else {
            let mode = file_mode_of(&meta, self.repo.config().filemode);
            (std::fs::read(&path)?, mode)
        };

        let id = self.repo.odb().put_raw(ObjectKind::Blob, &content)?;
        index.upsert(IndexEntry {
            path: BString::from(rel_path),
            id,
            mode,
            stage: Stage::Normal,
            stat: StatData::from_metadata(&meta),
            flags: EntryFlags::default(),
        });
        index.write_to(self.repo.index_path())?;
        Ok(Some(id))
    }

    /// Commit the index: snapshot it into trees, write the commit with
    /// HEAD as first parent, and advance HEAD's branch.
    pub fn commit(&self, message: &str, options: &CommitOptions) -> Result<ObjectId, RepoError> {
        self.commit_signed::<NoSigner>(message, options, None)
    }

    /// As [`commit`](Worktree::commit), signing the payload when a
    /// signer is given; the signature embeds under `gpgsig` and the id
    /// covers it.
    pub fn commit_signed<S: Signer>(
        &self,
        message: &str,
        options: &CommitOptions,
        signer: Option<&S>,
    ) -> Result<ObjectId, RepoError> {
        let index = self.repo.index()?;
        let tree = write_tree(&index, self.repo.odb())?;

        let head_id = self.repo.head_id()?;
        let mut parents = Vec::new();
        if let Some(head) = head_id {
            parents.push(head);
        }
        parents.extend(options.extra_parents.iter().copied());

        if !options.allow_empty {
            let parent_tree = match head_id {
                Some(head) => {
                    let encoded = self.repo.odb().get(Some(ObjectKind::Commit), &head)?;
                    Some(Commit::parse(&encoded.data)?.tree)
                }
                None => None,
            };
            if parent_tree == Some(tree) || (parent_tree.is_none() && index.is_empty()) {
                return Err(RepoError::EmptyCommit);
            }
        }

        let mut commit = Commit {
            tree,
            parents,
            author: options.author.clone(),
            committer: options.committer.clone(),
            encoding: None,
            extra_headers: Vec::new(),
            signature: None,
            message: BString::from(message),
        };

        if let Some(signer) = signer {
            let payload = commit.serialize_unsigned();
            let signature = signer
                .sign(&payload)
                .map_err(|e| RepoError::Signing(e.to_string()))?;
            commit.signature = Some(CommitSignature {
                format: SignatureFormat::Gpg,
                data: BString::from(signature),
            });
        }

        let commit_id = self.repo.odb().put(&Object::Commit(commit).encode())?;
        self.advance_head(head_id, commit_id)?;
        Ok(commit_id)
    }

    /// Fast-forward HEAD's underlying branch (or detached HEAD) to the
    /// new commit, guarded by compare-and-set.
    fn advance_head(
        &self,
        old: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<(), RepoError> {
        let head_name = RefName::new("HEAD")?;
        let target = match self.repo.refs().get(&head_name)? {
            Some(Reference::Symbolic { target, .. }) => target,
            _ => head_name,
        };

        let expected = old.map(|id| Reference::hash(target.clone(), id));
        self.repo
            .refs()
            .compare_and_set(&Reference::hash(target, new), expected.as_ref())?;
        Ok(())
    }
}

#[cfg(unix)]
fn file_mode_of(meta: &std::fs::Metadata, honor_filemode: bool) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    if honor_filemode && meta.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

#[cfg(not(unix))]
fn file_mode_of(_meta: &std::fs::Metadata, _honor_filemode: bool) -> FileMode {
    FileMode::Regular
}

/// Snapshot the index's stage-0 entries into tree objects, bottom-up,
/// returning the root tree id.
pub fn write_tree(index: &Index, odb: &Odb) -> Result<ObjectId, RepoError> {
    let entries: Vec<&IndexEntry> = index
        .entries()
        .iter()
        .filter(|e| e.stage == Stage::Normal)
        .collect();
    build_tree(&entries, b"", odb)
}

fn build_tree(entries: &[&IndexEntry], prefix: &[u8], odb: &Odb) -> Result<ObjectId, RepoError> {
    let mut tree_entries: Vec<TreeEntry> = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        let entry = entries[i];
        let rest = &entry.path[prefix.len()..];

        match rest.find_byte(b'/') {
            Some(slash) => {
                let dir_name = &rest[..slash];
                // The run of entries under this directory.
                let run_end = entries[i..]
                    .iter()
                    .position(|e| {
                        let p = &e.path[prefix.len()..];
                        !(p.starts_with(dir_name) && p.get(slash) == Some(&b'/'))
                    })
                    .map(|pos| i + pos)
                    .unwrap_or(entries.len());

                let mut sub_prefix = prefix.to_vec();
                sub_prefix.extend_from_slice(dir_name);
                sub_prefix.push(b'/');

                let sub_id = build_tree(&entries[i..run_end], &sub_prefix, odb)?;
                tree_entries.push(TreeEntry::new(FileMode::Dir, dir_name, sub_id)?);
                i = run_end;
            }
            None => {
                tree_entries.push(TreeEntry::new(entry.mode, rest, entry.id)?);
                i += 1;
            }
        }
    }

    let tree = Tree {
        entries: tree_entries,
    };
    Ok(odb.put_raw(ObjectKind::Tree, &tree.serialize_content())?)
}
