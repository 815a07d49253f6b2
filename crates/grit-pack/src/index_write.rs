//! Pack index (v2) construction.

use std::io::Write;
use std::path::Path;

use grit_hash::hasher::Hasher;
use grit_hash::{HashFormat, ObjectId};

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

/// One object's row in the index under construction.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: ObjectId,
    pub offset: u64,
    /// CRC32 of the entry's raw pack bytes (header + compressed payload).
    pub crc: u32,
}

/// Build the bytes of a v2 index for the given entries.
///
/// `pack_checksum` is the trailing hash of the pack this index covers;
/// the index's own tail hash is computed here. Offsets above 2^31-1 are
/// routed through the 64-bit table.
pub fn build_index(
    entries: &[IndexEntry],
    pack_checksum: &ObjectId,
    format: HashFormat,
) -> Result<Vec<u8>, PackError> {
    let mut sorted: Vec<&IndexEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = Vec::new();
    out.extend_from_slice(&IDX_SIGNATURE);
    out.extend_from_slice(&IDX_VERSION.to_be_bytes());

    // Fan-out: cumulative counts per first byte.
    let mut fanout = [0u32; 256];
    for entry in &sorted {
        fanout[entry.id.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        out.extend_from_slice(&count.to_be_bytes());
    }

    for entry in &sorted {
        out.extend_from_slice(entry.id.as_bytes());
    }
    for entry in &sorted {
        out.extend_from_slice(&entry.crc.to_be_bytes());
    }

    // 32-bit offsets, with the high bit routing into the 64-bit table.
    let mut large_offsets: Vec<u64> = Vec::new();
    for entry in &sorted {
        if entry.offset <= 0x7fff_ffff {
            out.extend_from_slice(&(entry.offset as u32).to_be_bytes());
        } else {
            let idx = large_offsets.len() as u32;
            large_offsets.push(entry.offset);
            out.extend_from_slice(&(idx | 0x8000_0000).to_be_bytes());
        }
    }
    for offset in large_offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    out.extend_from_slice(pack_checksum.as_bytes());

    let tail = Hasher::digest(format, &out)?;
    out.extend_from_slice(tail.as_bytes());

    Ok(out)
}

/// Build and write a `.idx` file next to a pack.
pub fn write_index(
    path: impl AsRef<Path>,
    entries: &[IndexEntry],
    pack_checksum: &ObjectId,
    format: HashFormat,
) -> Result<(), PackError> {
    let bytes = build_index(entries, pack_checksum, format)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackIndex;

    #[test]
    fn built_index_validates_and_answers_lookups() {
        let id_a = ObjectId::from_hex("aa39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let id_b = ObjectId::from_hex("0b39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let entries = vec![
            IndexEntry {
                id: id_a,
                offset: 12,
                crc: 0xdead,
            },
            IndexEntry {
                id: id_b,
                offset: 200,
                crc: 0xbeef,
            },
        ];
        let pack_checksum =
            ObjectId::from_hex("a3fed42da1e8189a077c0e6846c040dcf73fc9dd").unwrap();

        let bytes = build_index(&entries, &pack_checksum, HashFormat::Sha1).unwrap();
        let index = PackIndex::from_bytes(bytes, HashFormat::Sha1).unwrap();

        assert_eq!(index.object_count(), 2);
        assert_eq!(index.find(&id_a), Some(12));
        assert_eq!(index.find(&id_b), Some(200));
        assert_eq!(index.pack_checksum(), pack_checksum);
        // Sorted by id: id_b (0b..) first.
        assert_eq!(index.id_at(0), id_b);
        assert_eq!(index.crc_at(0), 0xbeef);
    }

    #[test]
    fn tail_hash_covers_content() {
        let entries = vec![IndexEntry {
            id: ObjectId::ZERO_SHA1,
            offset: 12,
            crc: 1,
        }];
        let mut bytes =
            build_index(&entries, &ObjectId::ZERO_SHA1, HashFormat::Sha1).unwrap();
        // Flip a fan-out byte; the recorded tail hash no longer matches.
        bytes[100] ^= 0xff;
        let tampered_tail = &bytes[bytes.len() - 20..];
        let recomputed = grit_hash::hasher::Hasher::digest(
            HashFormat::Sha1,
            &bytes[..bytes.len() - 20],
        )
        .unwrap();
        assert_ne!(recomputed.as_bytes(), tampered_tail);
    }
}
