//! Index file writing (v2, or v3 when extended flags are present).

use std::io::Write;
use std::path::Path;

use grit_hash::hasher::Hasher;
use grit_utils::lockfile::LockFile;
use grit_utils::{LockError, UtilError};

use crate::entry::IndexEntry;
use crate::{Index, IndexError};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Write the index atomically through `<path>.lock`.
pub fn write_index(index: &Index, path: &Path) -> Result<(), IndexError> {
    let mut lock = LockFile::acquire(path).map_err(|e| match e {
        UtilError::Lock(LockError::AlreadyLocked { path }) => IndexError::Locked { path },
        other => IndexError::Io(std::io::Error::other(other.to_string())),
    })?;

    let data = serialize_index(index)?;
    lock.write_all(&data)?;
    lock.commit()
        .map_err(|e| IndexError::Io(std::io::Error::other(e.to_string())))?;
    Ok(())
}

/// Serialize the index to bytes, trailing hash included.
pub fn serialize_index(index: &Index) -> Result<Vec<u8>, IndexError> {
    // v3 only when some entry actually needs extended flags.
    let needs_v3 = index.entries().iter().any(|e| e.flags.has_extended());
    let version: u32 = if needs_v3 { 3 } else { 2 };

    let mut buf = Vec::new();
    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(&(index.len() as u32).to_be_bytes());

    for entry in index.entries() {
        write_entry(&mut buf, entry, index.format().raw_len());
    }

    for ext in index.extensions() {
        buf.extend_from_slice(&ext.signature);
        buf.extend_from_slice(&(ext.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&ext.data);
    }

    let checksum = Hasher::digest(index.format(), &buf)
        .map_err(|_| IndexError::InvalidHeader("checksum computation failed".into()))?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

fn write_entry(buf: &mut Vec<u8>, entry: &IndexEntry, id_len: usize) {
    let entry_start = buf.len();

    buf.extend_from_slice(&entry.stat.ctime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ctime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.dev.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ino.to_be_bytes());
    buf.extend_from_slice(&entry.mode.raw().to_be_bytes());
    buf.extend_from_slice(&entry.stat.uid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.gid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.size.to_be_bytes());

    buf.extend_from_slice(entry.id.as_bytes());

    let extended = entry.flags.has_extended();
    let name_len = entry.path.len().min(0xfff) as u16;
    let mut flags: u16 = name_len;
    flags |= (entry.stage.as_u8() as u16) << 12;
    if entry.flags.assume_valid {
        flags |= 0x8000;
    }
    if extended {
        flags |= 0x4000;
    }
    buf.extend_from_slice(&flags.to_be_bytes());

    if extended {
        let mut ext_flags: u16 = 0;
        if entry.flags.intent_to_add {
            ext_flags |= 0x2000;
        }
        if entry.flags.skip_worktree {
            ext_flags |= 0x4000;
        }
        buf.extend_from_slice(&ext_flags.to_be_bytes());
    }

    buf.extend_from_slice(&entry.path);

    // NUL-pad to the 8-byte boundary (at least one NUL).
    let flags_size = if extended { 4 } else { 2 };
    let entry_size = (40 + id_len + flags_size + entry.path.len() + 8) & !7;
    buf.resize(entry_start + entry_size, 0);
}
