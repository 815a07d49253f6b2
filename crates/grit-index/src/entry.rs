//! Index entry types: the entry proper, its stat cache, and flags.

use std::cmp::Ordering;

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::FileMode;

use crate::Stage;

/// A single index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the worktree root, `/`-separated.
    pub path: BString,
    /// Blob id of the staged content.
    pub id: ObjectId,
    pub mode: FileMode,
    pub stage: Stage,
    /// Filesystem metadata from when the entry was staged.
    pub stat: StatData,
    pub flags: EntryFlags,
}

impl IndexEntry {
    /// The on-disk sort order: path bytes, then stage.
    pub fn storage_cmp(a: &IndexEntry, b: &IndexEntry) -> Ordering {
        a.path.cmp(&b.path).then(a.stage.cmp(&b.stage))
    }
}

/// Cached filesystem stat data, the heart of fast status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            size: meta.len() as u32,
        }
    }

    /// Does the cached stat still describe this file?
    ///
    /// A `false` answer does not mean the content changed, only that it
    /// must be re-hashed to find out.
    pub fn matches(&self, meta: &std::fs::Metadata) -> bool {
        let other = Self::from_metadata(meta);

        if self.size != other.size {
            return false;
        }
        if self.mtime_secs != other.mtime_secs || self.mtime_nsecs != other.mtime_nsecs {
            return false;
        }
        if self.ctime_secs != other.ctime_secs || self.ctime_nsecs != other.ctime_nsecs {
            return false;
        }
        // Zero fields mean "unknown" on this platform; only compare when
        // both sides have real values.
        if self.ino != 0 && other.ino != 0 && self.ino != other.ino {
            return false;
        }
        if self.dev != 0 && other.dev != 0 && self.dev != other.dev {
            return false;
        }
        if self.uid != 0 && other.uid != 0 && self.uid != other.uid {
            return false;
        }
        if self.gid != 0 && other.gid != 0 && self.gid != other.gid {
            return false;
        }
        true
    }
}

/// Per-entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// CE_VALID: assume the entry unchanged, skip stat comparison.
    pub assume_valid: bool,
    /// CE_INTENT_TO_ADD: placeholder from `add -N`.
    pub intent_to_add: bool,
    /// CE_SKIP_WORKTREE: do not materialize this entry.
    pub skip_worktree: bool,
}

impl EntryFlags {
    /// Extended flags force the v3 on-disk format.
    pub fn has_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}
