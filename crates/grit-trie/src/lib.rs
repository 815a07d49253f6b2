//! Merkletrie diff: recursive structural comparison of hash-identified
//! trees from three sources — stored tree objects, the staging index,
//! and the working directory.
//!
//! All three sources present the same [`Noder`] contract: a name, a
//! directory flag, a content hash (or the empty-hash sentinel when the
//! hash is unknown without reading content), and lazily produced
//! children sorted by name. [`diff`] descends two noders in lock-step
//! and reports per-file [`Change`]s sorted by path.
//!
//! The three canonical pairings drive the worktree:
//! HEAD tree ↔ index (staged), index ↔ filesystem (unstaged),
//! HEAD tree ↔ filesystem (all working-tree changes).

pub mod fs_node;
pub mod index_node;
pub mod tree_node;

pub use fs_node::FsNoder;
pub use index_node::IndexNoder;
pub use tree_node::TreeNoder;

use bstr::{BStr, BString, ByteVec};

/// Errors from trie traversal.
#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A node in a hash-identified tree.
pub trait Noder {
    /// The node's name within its parent.
    fn name(&self) -> &BStr;

    /// Is this a directory (something with children)?
    fn is_dir(&self) -> bool;

    /// The content hash, or `None` — the empty-hash sentinel — when the
    /// hash is not known without further work. The sentinel always
    /// compares unequal, which forces descent/content comparison.
    fn hash(&self) -> Option<Vec<u8>>;

    /// Children sorted by name. Empty for non-directories.
    fn children(&self) -> Result<Vec<Box<dyn Noder + '_>>, TrieError>;
}

/// What happened to a path between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Present only on the right.
    Insert,
    /// Present only on the left.
    Delete,
    /// Present on both with different content.
    Modify,
}

impl Action {
    /// The mirrored action for `diff(B, A)` given `diff(A, B)`.
    pub fn reversed(self) -> Self {
        match self {
            Action::Insert => Action::Delete,
            Action::Delete => Action::Insert,
            Action::Modify => Action::Modify,
        }
    }
}

/// One file-level difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: Action,
    /// Full `/`-separated path from the diff root.
    pub path: BString,
}

/// Equality callback: decides whether two same-named file nodes hold the
/// same content. The engine never consults it when either side reports
/// the empty-hash sentinel — those always compare unequal.
pub type Equals<'a> = &'a dyn Fn(&dyn Noder, &dyn Noder) -> bool;

/// The default equality: hash comparison.
pub fn hash_equals(a: &dyn Noder, b: &dyn Noder) -> bool {
    match (a.hash(), b.hash()) {
        (Some(ha), Some(hb)) => ha == hb,
        _ => false,
    }
}

/// Diff two tries, reporting per-file changes sorted by path.
pub fn diff(
    left: &dyn Noder,
    right: &dyn Noder,
    equals: Equals<'_>,
) -> Result<Vec<Change>, TrieError> {
    let mut changes = Vec::new();
    diff_dir(left, right, BStr::new(""), equals, &mut changes)?;
    Ok(changes)
}

fn join(prefix: &BStr, name: &BStr) -> BString {
    let mut path = BString::from(prefix);
    if !path.is_empty() {
        path.push_byte(b'/');
    }
    path.push_str(name);
    path
}

/// Compare two same-named nodes that both exist.
fn diff_node(
    left: &dyn Noder,
    right: &dyn Noder,
    path: &BStr,
    equals: Equals<'_>,
    out: &mut Vec<Change>,
) -> Result<(), TrieError> {
    match (left.is_dir(), right.is_dir()) {
        (true, true) => {
            // Equal non-sentinel hashes prune whole subtrees.
            if let (Some(lh), Some(rh)) = (left.hash(), right.hash()) {
                if lh == rh {
                    return Ok(());
                }
            }
            diff_dir(left, right, path, equals, out)
        }
        (false, false) => {
            if !equals(left, right) {
                out.push(Change {
                    action: Action::Modify,
                    path: BString::from(path),
                });
            }
            Ok(())
        }
        // File replaced by directory or vice versa.
        (true, false) => {
            emit_all(left, path, Action::Delete, out)?;
            out.push(Change {
                action: Action::Insert,
                path: BString::from(path),
            });
            Ok(())
        }
        (false, true) => {
            out.push(Change {
                action: Action::Delete,
                path: BString::from(path),
            });
            emit_all(right, path, Action::Insert, out)
        }
    }
}

fn diff_dir(
    left: &dyn Noder,
    right: &dyn Noder,
    prefix: &BStr,
    equals: Equals<'_>,
    out: &mut Vec<Change>,
) -> Result<(), TrieError> {
    let left_children = left.children()?;
    let right_children = right.children()?;

    let (mut li, mut ri) = (0, 0);
    while li < left_children.len() || ri < right_children.len() {
        let lnode = left_children.get(li);
        let rnode = right_children.get(ri);

        match (lnode, rnode) {
            (Some(l), Some(r)) => match l.name().cmp(r.name()) {
                std::cmp::Ordering::Equal => {
                    let path = join(prefix, l.name());
                    diff_node(l.as_ref(), r.as_ref(), path.as_ref(), equals, out)?;
                    li += 1;
                    ri += 1;
                }
                std::cmp::Ordering::Less => {
                    emit_all(l.as_ref(), join(prefix, l.name()).as_ref(), Action::Delete, out)?;
                    li += 1;
                }
                std::cmp::Ordering::Greater => {
                    emit_all(r.as_ref(), join(prefix, r.name()).as_ref(), Action::Insert, out)?;
                    ri += 1;
                }
            },
            (Some(l), None) => {
                emit_all(l.as_ref(), join(prefix, l.name()).as_ref(), Action::Delete, out)?;
                li += 1;
            }
            (None, Some(r)) => {
                emit_all(r.as_ref(), join(prefix, r.name()).as_ref(), Action::Insert, out)?;
                ri += 1;
            }
            (None, None) => unreachable!(),
        }
    }
    Ok(())
}

/// Report every file under a one-sided subtree.
fn emit_all(
    node: &dyn Noder,
    path: &BStr,
    action: Action,
    out: &mut Vec<Change>,
) -> Result<(), TrieError> {
    if !node.is_dir() {
        out.push(Change {
            action,
            path: BString::from(path),
        });
        return Ok(());
    }
    for child in node.children()? {
        emit_all(child.as_ref(), join(path, child.name()).as_ref(), action, out)?;
    }
    Ok(())
}
