//! Noder over the working directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bstr::{BStr, BString};
use grit_hash::hasher::Hasher;
use grit_hash::HashFormat;
use grit_object::FileMode;

use crate::{Noder, TrieError};

/// Paths the walk must not enter or report (`.gitignore` decisions are
/// made by the caller and handed in as this predicate).
pub type PathFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Pre-computed hashes for files the caller knows are unchanged (the
/// index stat-cache fast path): absolute path → trie hash.
pub type KnownHashes = Arc<HashMap<PathBuf, Vec<u8>>>;

/// A filesystem-backed trie node.
///
/// File hashes are computed on demand by reading content (for symlinks:
/// the link target, not the referent) and blob-hashing it; directories
/// report the empty-hash sentinel. An unreadable file also reports the
/// sentinel, so it can never falsely compare equal.
pub struct FsNoder {
    /// Absolute path of this node.
    path: PathBuf,
    name: BString,
    is_dir: bool,
    format: HashFormat,
    /// Honor the executable bit (`core.filemode`).
    filemode: bool,
    filter: Option<PathFilter>,
    known: Option<KnownHashes>,
    /// A checked-out submodule: a leaf whose hash is the subrepository's
    /// HEAD commit.
    gitlink: bool,
}

impl FsNoder {
    /// The root noder of a worktree.
    pub fn new(root: impl AsRef<Path>, format: HashFormat) -> Self {
        Self {
            path: root.as_ref().to_path_buf(),
            name: BString::default(),
            is_dir: true,
            format,
            filemode: true,
            filter: None,
            known: None,
            gitlink: false,
        }
    }

    /// Set whether the executable bit is recorded (`core.filemode`).
    pub fn with_filemode(mut self, filemode: bool) -> Self {
        self.filemode = filemode;
        self
    }

    /// Exclude paths (ignored files, typically) from the walk.
    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Trust caller-provided hashes for stat-unchanged files, skipping
    /// the content read for them.
    pub fn with_known_hashes(mut self, known: KnownHashes) -> Self {
        self.known = Some(known);
        self
    }

    fn mode(&self) -> FileMode {
        let meta = match std::fs::symlink_metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => return FileMode::Regular,
        };
        if meta.file_type().is_symlink() {
            return FileMode::Symlink;
        }
        #[cfg(unix)]
        if self.filemode {
            use std::os::unix::fs::PermissionsExt;
            if meta.permissions().mode() & 0o111 != 0 {
                return FileMode::Executable;
            }
        }
        FileMode::Regular
    }
}

/// The trie hash of a checked-out submodule: its HEAD commit id at
/// mode 160000, or the sentinel when HEAD cannot be read.
fn gitlink_hash(path: &Path) -> Option<Vec<u8>> {
    let git_dir = path.join(".git");
    // Worktree-style submodules store "gitdir: <path>" in a .git file.
    let git_dir = if git_dir.is_file() {
        let content = std::fs::read_to_string(&git_dir).ok()?;
        let target = content.strip_prefix("gitdir:")?.trim();
        path.join(target)
    } else {
        git_dir
    };

    let mut head = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    for _ in 0..10 {
        let trimmed = head.trim();
        match trimmed.strip_prefix("ref: ") {
            Some(target) => {
                head = std::fs::read_to_string(git_dir.join(target.trim())).ok()?;
            }
            None => {
                let id = grit_hash::ObjectId::from_hex(trimmed).ok()?;
                return Some(crate::tree_node::entry_hash(&id, FileMode::Submodule));
            }
        }
    }
    None
}

impl Noder for FsNoder {
    fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn hash(&self) -> Option<Vec<u8>> {
        if self.is_dir {
            return None;
        }
        if let Some(known) = self.known.as_ref().and_then(|k| k.get(&self.path)) {
            return Some(known.clone());
        }
        if self.gitlink {
            return gitlink_hash(&self.path);
        }
        let mode = self.mode();
        let content = if mode.is_symlink() {
            let target = std::fs::read_link(&self.path).ok()?;
            Vec::from(target.to_string_lossy().as_bytes())
        } else {
            std::fs::read(&self.path).ok()?
        };
        let id = Hasher::object_id(self.format, "blob", &content).ok()?;
        Some(crate::tree_node::entry_hash(&id, mode))
    }

    fn children(&self) -> Result<Vec<Box<dyn Noder + '_>>, TrieError> {
        if !self.is_dir {
            return Ok(Vec::new());
        }

        let mut children: Vec<FsNoder> = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();

            if name == ".git" {
                continue;
            }
            if let Some(filter) = &self.filter {
                if !filter(&path) {
                    continue;
                }
            }

            let file_type = entry.file_type()?;
            // A directory with its own .git is a checked-out submodule:
            // it diffs as a single gitlink leaf, not a subtree.
            let gitlink = file_type.is_dir() && path.join(".git").exists();
            children.push(FsNoder {
                path,
                name: BString::from(name.to_string_lossy().as_bytes()),
                // A symlink to a directory is a file-like leaf.
                is_dir: file_type.is_dir() && !gitlink,
                format: self.format,
                filemode: self.filemode,
                filter: self.filter.clone(),
                known: self.known.clone(),
                gitlink,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(children
            .into_iter()
            .map(|c| Box::new(c) as Box<dyn Noder>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diff, hash_equals, Action, TreeNoder};
    use grit_object::{ObjectKind, Tree, TreeEntry};
    use grit_odb::Odb;

    #[test]
    fn worktree_matching_tree_diffs_empty() {
        let work = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(store_dir.path(), HashFormat::Sha1).unwrap();

        std::fs::write(work.path().join("a.txt"), b"alpha\n").unwrap();
        std::fs::create_dir(work.path().join("sub")).unwrap();
        std::fs::write(work.path().join("sub/b.txt"), b"beta\n").unwrap();

        let a = odb.put_raw(ObjectKind::Blob, b"alpha\n").unwrap();
        let b = odb.put_raw(ObjectKind::Blob, b"beta\n").unwrap();
        let sub = Tree {
            entries: vec![TreeEntry::new(FileMode::Regular, "b.txt", b).unwrap()],
        };
        let sub_id = odb
            .put_raw(ObjectKind::Tree, &sub.serialize_content())
            .unwrap();
        let root = Tree {
            entries: vec![
                TreeEntry::new(FileMode::Regular, "a.txt", a).unwrap(),
                TreeEntry::new(FileMode::Dir, "sub", sub_id).unwrap(),
            ],
        };
        let root_id = odb
            .put_raw(ObjectKind::Tree, &root.serialize_content())
            .unwrap();

        let changes = diff(
            &TreeNoder::new(&odb, root_id),
            &FsNoder::new(work.path(), HashFormat::Sha1),
            &hash_equals,
        )
        .unwrap();
        assert!(changes.is_empty(), "unexpected changes: {changes:?}");
    }

    #[test]
    fn edited_file_is_modified() {
        let work = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(store_dir.path(), HashFormat::Sha1).unwrap();

        std::fs::write(work.path().join("f.txt"), b"edited").unwrap();
        let blob = odb.put_raw(ObjectKind::Blob, b"original").unwrap();
        let root = Tree {
            entries: vec![TreeEntry::new(FileMode::Regular, "f.txt", blob).unwrap()],
        };
        let root_id = odb
            .put_raw(ObjectKind::Tree, &root.serialize_content())
            .unwrap();

        let changes = diff(
            &TreeNoder::new(&odb, root_id),
            &FsNoder::new(work.path(), HashFormat::Sha1),
            &hash_equals,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, Action::Modify);
        assert_eq!(changes[0].path, "f.txt");
    }

    #[test]
    fn git_dir_is_skipped_and_filter_applies() {
        let work = tempfile::tempdir().unwrap();
        std::fs::create_dir(work.path().join(".git")).unwrap();
        std::fs::write(work.path().join(".git/HEAD"), b"ref: x").unwrap();
        std::fs::write(work.path().join("seen.txt"), b"1").unwrap();
        std::fs::write(work.path().join("ignored.log"), b"2").unwrap();

        let filter: PathFilter = Arc::new(|path: &Path| {
            path.extension().map(|e| e != "log").unwrap_or(true)
        });
        let root = FsNoder::new(work.path(), HashFormat::Sha1).with_filter(filter);
        let names: Vec<String> = root
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["seen.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_hashes_its_target_path() {
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("real.txt"), b"actual content").unwrap();
        std::os::unix::fs::symlink("real.txt", work.path().join("link")).unwrap();

        let root = FsNoder::new(work.path(), HashFormat::Sha1);
        let children = root.children().unwrap();
        let link = children.iter().find(|c| c.name() == "link").unwrap();

        // The hash covers the target path string "real.txt", not the
        // referent's bytes.
        let expected_id =
            Hasher::object_id(HashFormat::Sha1, "blob", b"real.txt").unwrap();
        let hash = link.hash().unwrap();
        assert_eq!(&hash[..20], expected_id.as_bytes());
    }
}
