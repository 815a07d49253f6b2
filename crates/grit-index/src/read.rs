//! Index file parsing (v2/v3/v4).

use bstr::BString;
use grit_hash::hasher::Hasher;
use grit_hash::{HashFormat, ObjectId};
use grit_object::FileMode;

use crate::entry::{EntryFlags, IndexEntry, StatData};
use crate::{Index, IndexError, RawExtension, Stage};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Fixed-width stat prefix of an on-disk entry:
/// ctime(8) + mtime(8) + dev(4) + ino(4) + mode(4) + uid(4) + gid(4) + size(4).
const STAT_PREFIX: usize = 40;

/// Parse a complete index file.
pub fn parse_index(data: &[u8], format: HashFormat) -> Result<Index, IndexError> {
    let id_len = format.raw_len();
    if data.len() < 12 + id_len {
        return Err(IndexError::InvalidHeader("index file too short".into()));
    }

    verify_checksum(data, format)?;

    if &data[0..4] != INDEX_SIGNATURE {
        return Err(IndexError::InvalidHeader(format!(
            "bad signature: {:?}",
            &data[0..4]
        )));
    }
    let version = read_u32(&data[4..]);
    if !(2..=4).contains(&version) {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(&data[8..]) as usize;

    let content_end = data.len() - id_len;
    let mut cursor = 12;
    let mut entries = Vec::with_capacity(entry_count);
    let mut prev_path = BString::default();

    for _ in 0..entry_count {
        let (entry, next) =
            parse_entry(data, cursor, version, &prev_path, content_end, format)?;
        prev_path = entry.path.clone();
        entries.push(entry);
        cursor = next;
    }

    // Extensions: 4-byte signature + u32 length + payload, preserved raw.
    let mut extensions = Vec::new();
    while cursor + 8 <= content_end {
        let sig = &data[cursor..cursor + 4];
        let ext_size = read_u32(&data[cursor + 4..]) as usize;
        cursor += 8;

        if cursor + ext_size > content_end {
            return Err(IndexError::InvalidExtension {
                sig: String::from_utf8_lossy(sig).into_owned(),
                reason: "extension data exceeds index bounds".into(),
            });
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(sig);
        extensions.push(RawExtension {
            signature,
            data: data[cursor..cursor + ext_size].to_vec(),
        });
        cursor += ext_size;
    }

    Ok(Index::from_parts(version, entries, extensions, format))
}

/// On-disk entry size for v2/v3: the C formula
/// `(STAT_PREFIX + id + flags + name + 8) & ~7`.
fn ondisk_entry_size(name_len: usize, extended: bool, id_len: usize) -> usize {
    let flags_size = if extended { 4 } else { 2 };
    (STAT_PREFIX + id_len + flags_size + name_len + 8) & !7
}

fn parse_entry(
    data: &[u8],
    start: usize,
    version: u32,
    prev_path: &BString,
    content_end: usize,
    format: HashFormat,
) -> Result<(IndexEntry, usize), IndexError> {
    let id_len = format.raw_len();
    let mut cursor = start;

    if cursor + STAT_PREFIX + id_len + 2 > content_end {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "entry too short".into(),
        });
    }

    let stat = StatData {
        ctime_secs: read_u32(&data[cursor..]),
        ctime_nsecs: read_u32(&data[cursor + 4..]),
        mtime_secs: read_u32(&data[cursor + 8..]),
        mtime_nsecs: read_u32(&data[cursor + 12..]),
        dev: read_u32(&data[cursor + 16..]),
        ino: read_u32(&data[cursor + 20..]),
        uid: read_u32(&data[cursor + 28..]),
        gid: read_u32(&data[cursor + 32..]),
        size: read_u32(&data[cursor + 36..]),
    };
    let mode_raw = read_u32(&data[cursor + 24..]);
    cursor += STAT_PREFIX;

    let id = ObjectId::from_bytes(&data[cursor..cursor + id_len], format).map_err(|_| {
        IndexError::InvalidEntry {
            offset: start,
            reason: "invalid object id".into(),
        }
    })?;
    cursor += id_len;

    let flags_raw = read_u16(&data[cursor..]);
    cursor += 2;

    let assume_valid = (flags_raw & 0x8000) != 0;
    let extended = (flags_raw & 0x4000) != 0;
    let stage = Stage::from_u8(((flags_raw >> 12) & 0x03) as u8)?;

    let mut intent_to_add = false;
    let mut skip_worktree = false;
    if extended {
        if version < 3 {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "extended flags in a v2 index".into(),
            });
        }
        if cursor + 2 > content_end {
            return Err(IndexError::InvalidEntry {
                offset: start,
                reason: "truncated extended flags".into(),
            });
        }
        let ext_flags = read_u16(&data[cursor..]);
        cursor += 2;
        intent_to_add = (ext_flags & 0x2000) != 0;
        skip_worktree = (ext_flags & 0x4000) != 0;
    }

    let path = if version == 4 {
        parse_v4_path(data, &mut cursor, prev_path, content_end)?
    } else {
        let nul_pos = data[cursor..content_end]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| IndexError::InvalidEntry {
                offset: start,
                reason: "missing NUL in path".into(),
            })?;
        let path = BString::from(&data[cursor..cursor + nul_pos]);

        // v2/v3 entries are NUL-padded to 8-byte boundaries.
        cursor = (start + ondisk_entry_size(nul_pos, extended, id_len)).min(content_end);
        path
    };

    Ok((
        IndexEntry {
            path,
            id,
            mode: FileMode::from_raw(mode_raw),
            stage,
            stat,
            flags: EntryFlags {
                assume_valid,
                intent_to_add,
                skip_worktree,
            },
        },
        cursor,
    ))
}

/// v4 paths: strip-length varint, then a NUL-terminated suffix appended
/// to the previous entry's path; no padding.
fn parse_v4_path(
    data: &[u8],
    cursor: &mut usize,
    prev_path: &BString,
    content_end: usize,
) -> Result<BString, IndexError> {
    let (strip_len, consumed) = read_varint(&data[*cursor..content_end]);
    *cursor += consumed;

    let suffix_start = *cursor;
    let nul_pos = data[suffix_start..content_end]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| IndexError::InvalidEntry {
            offset: suffix_start,
            reason: "missing NUL in v4 path suffix".into(),
        })?;
    let suffix = &data[suffix_start..suffix_start + nul_pos];
    *cursor = suffix_start + nul_pos + 1;

    let keep = prev_path.len().saturating_sub(strip_len);
    let mut path = BString::from(&prev_path[..keep]);
    path.extend_from_slice(suffix);
    Ok(path)
}

fn read_varint(data: &[u8]) -> (usize, usize) {
    let mut value: usize = 0;
    let mut shift = 0;
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        i += 1;
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    (value, i)
}

fn verify_checksum(data: &[u8], format: HashFormat) -> Result<(), IndexError> {
    let id_len = format.raw_len();
    if data.len() < id_len {
        return Err(IndexError::ChecksumMismatch);
    }
    let computed = Hasher::digest(format, &data[..data.len() - id_len])
        .map_err(|_| IndexError::ChecksumMismatch)?;
    if computed.as_bytes() != &data[data.len() - id_len..] {
        return Err(IndexError::ChecksumMismatch);
    }
    Ok(())
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes(data[..4].try_into().unwrap())
}

fn read_u16(data: &[u8]) -> u16 {
    u16::from_be_bytes(data[..2].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tampered_checksum() {
        let index = Index::new(HashFormat::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        index.write_to(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[5] ^= 0x01; // flip a version byte
        assert!(matches!(
            parse_index(&bytes, HashFormat::Sha1),
            Err(IndexError::ChecksumMismatch)
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        // Build a v7 header with a valid checksum.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DIRC");
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let sum = Hasher::digest(HashFormat::Sha1, &bytes).unwrap();
        bytes.extend_from_slice(sum.as_bytes());

        assert!(matches!(
            parse_index(&bytes, HashFormat::Sha1),
            Err(IndexError::UnsupportedVersion(7))
        ));
    }
}
