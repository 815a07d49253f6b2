//! The staging index (`.git/index`).
//!
//! The index is the intermediate state between the working tree and the
//! next commit: a sorted list of entries carrying the blob id plus a
//! stat cache that lets status run in O(entries) without rehashing
//! unchanged files. On disk it is the binary `DIRC` format, versions 2,
//! 3 (extended flags), and 4 (path prefix compression) for reading;
//! writes emit v2, or v3 when an entry needs extended flags.

pub mod entry;
mod read;
mod write;

use std::path::Path;

use bstr::{BStr, ByteSlice};
use grit_hash::{HashFormat, ObjectId};

pub use entry::{EntryFlags, IndexEntry, StatData};

/// Errors from index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("invalid extension '{sig}': {reason}")]
    InvalidExtension { sig: String, reason: String },

    #[error("index is locked: {path}")]
    Locked { path: std::path::PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Merge stage of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    /// Regular staged entry (stage 0).
    #[default]
    Normal,
    /// Common ancestor in a conflict (stage 1).
    Base,
    /// Our side of a conflict (stage 2).
    Ours,
    /// Their side of a conflict (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Result<Self, IndexError> {
        match n {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(IndexError::InvalidEntry {
                offset: 0,
                reason: format!("invalid stage: {n}"),
            }),
        }
    }
}

/// An extension this code has no structure for, carried through
/// read/write byte-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

/// The staging index.
#[derive(Debug, Clone)]
pub struct Index {
    version: u32,
    /// Entries sorted by (path, stage).
    entries: Vec<IndexEntry>,
    /// Extensions preserved for round-trip.
    extensions: Vec<RawExtension>,
    format: HashFormat,
}

impl Index {
    /// A fresh empty index.
    pub fn new(format: HashFormat) -> Self {
        Self {
            version: 2,
            entries: Vec::new(),
            extensions: Vec::new(),
            format,
        }
    }

    /// Read an index file (memory-mapped).
    pub fn read_from(path: impl AsRef<Path>, format: HashFormat) -> Result<Self, IndexError> {
        let file = std::fs::File::open(path.as_ref())?;
        let data = unsafe { memmap2::Mmap::map(&file) }?;
        read::parse_index(&data, format)
    }

    /// Read an index file, or return an empty index when absent
    /// (a fresh repository has no index yet).
    pub fn read_or_empty(
        path: impl AsRef<Path>,
        format: HashFormat,
    ) -> Result<Self, IndexError> {
        match std::fs::metadata(path.as_ref()) {
            Ok(_) => Self::read_from(path, format),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(format)),
            Err(e) => Err(e.into()),
        }
    }

    /// Write atomically through `index.lock`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        write::write_index(self, path.as_ref())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn format(&self) -> HashFormat {
        self.format
    }

    /// Entries in (path, stage) order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extensions(&self) -> &[RawExtension] {
        &self.extensions
    }

    /// Look up the stage-0 entry for a path.
    pub fn entry(&self, path: &BStr) -> Option<&IndexEntry> {
        self.entry_at(path, Stage::Normal)
    }

    /// Look up the entry for (path, stage).
    pub fn entry_at(&self, path: &BStr, stage: Stage) -> Option<&IndexEntry> {
        self.position(path, stage).ok().map(|i| &self.entries[i])
    }

    /// Insert or replace the entry for (path, stage), keeping order.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.position(entry.path.as_ref(), entry.stage) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Remove every stage of a path. Returns whether anything went.
    pub fn remove(&mut self, path: &BStr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path.as_bstr() != path);
        before != self.entries.len()
    }

    /// Drop all entries (and stale extensions).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.extensions.clear();
    }

    /// Replace the whole entry set; the input is re-sorted.
    pub fn set_entries(&mut self, mut entries: Vec<IndexEntry>) {
        entries.sort_by(IndexEntry::storage_cmp);
        self.entries = entries;
        // A wholesale replacement invalidates cached extension data
        // (cache-tree and friends describe the old entries).
        self.extensions.clear();
    }

    /// Any stage-1/2/3 entries?
    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != Stage::Normal)
    }

    fn position(&self, path: &BStr, stage: Stage) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| match e.path.as_bstr().cmp(path) {
                std::cmp::Ordering::Equal => e.stage.cmp(&stage),
                other => other,
            })
    }

    pub(crate) fn from_parts(
        version: u32,
        entries: Vec<IndexEntry>,
        extensions: Vec<RawExtension>,
        format: HashFormat,
    ) -> Self {
        Self {
            version,
            entries,
            extensions,
            format,
        }
    }
}

/// Convenience: the ids of all stage-0 blobs, for reachability sets.
pub fn staged_ids(index: &Index) -> Vec<ObjectId> {
    index
        .entries()
        .iter()
        .filter(|e| e.stage == Stage::Normal)
        .map(|e| e.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::{BString, ByteSlice};
    use grit_object::FileMode;

    fn entry(path: &str, stage: Stage) -> IndexEntry {
        IndexEntry {
            path: BString::from(path),
            id: ObjectId::ZERO_SHA1,
            mode: FileMode::Regular,
            stage,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }

    #[test]
    fn upsert_keeps_path_stage_order() {
        let mut index = Index::new(HashFormat::Sha1);
        index.upsert(entry("b.txt", Stage::Normal));
        index.upsert(entry("a.txt", Stage::Normal));
        index.upsert(entry("a.txt", Stage::Theirs));
        index.upsert(entry("a.txt", Stage::Ours));

        let order: Vec<(String, u8)> = index
            .entries()
            .iter()
            .map(|e| (e.path.to_string(), e.stage.as_u8()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.txt".into(), 0),
                ("a.txt".into(), 2),
                ("a.txt".into(), 3),
                ("b.txt".into(), 0)
            ]
        );
    }

    #[test]
    fn upsert_replaces_same_slot() {
        let mut index = Index::new(HashFormat::Sha1);
        index.upsert(entry("f", Stage::Normal));
        let mut updated = entry("f", Stage::Normal);
        updated.stat.size = 42;
        index.upsert(updated);
        assert_eq!(index.len(), 1);
        assert_eq!(index.entry(b"f".as_bstr()).unwrap().stat.size, 42);
    }

    #[test]
    fn remove_drops_all_stages() {
        let mut index = Index::new(HashFormat::Sha1);
        index.upsert(entry("conflicted", Stage::Base));
        index.upsert(entry("conflicted", Stage::Ours));
        index.upsert(entry("other", Stage::Normal));
        assert!(index.has_conflicts());

        assert!(index.remove(b"conflicted".as_bstr()));
        assert_eq!(index.len(), 1);
        assert!(!index.has_conflicts());
        assert!(!index.remove(b"conflicted".as_bstr()));
    }

    #[test]
    fn lookup_by_stage() {
        let mut index = Index::new(HashFormat::Sha1);
        index.upsert(entry("x", Stage::Ours));
        assert!(index.entry(b"x".as_bstr()).is_none());
        assert!(index.entry_at(b"x".as_bstr(), Stage::Ours).is_some());
    }
}
