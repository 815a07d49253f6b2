//! Random-access reading of an on-disk `.pack` + `.idx` pair.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::bufread::ZlibDecoder;
use grit_hash::{HashFormat, ObjectId};
use grit_object::{EncodedObject, ObjectKind};
use lru::LruCache;
use memmap2::Mmap;
use std::io::Read;

use crate::entry::parse_record_header;
use crate::index::PackIndex;
use crate::{
    PackError, RecordKind, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE, PACK_SIGNATURE,
    SUPPORTED_PACK_VERSIONS,
};

/// Default capacity of the per-pack materialized-base cache.
const DEFAULT_DELTA_CACHE: usize = 128;

/// The raw (possibly deltified) form of a packed object, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    /// A full object.
    Full { kind: ObjectKind, data: Vec<u8> },
    /// A delta script against another object in this pack.
    OfsDelta { base_offset: u64, script: Vec<u8> },
    /// A delta script against an object addressed by id.
    RefDelta { base_id: ObjectId, script: Vec<u8> },
}

/// A memory-mapped packfile with its index.
///
/// Reads resolve delta chains through a mutex-shared LRU of materialized
/// bases keyed by offset, so concurrent readers of the same pack share
/// reconstruction work.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    object_count: u32,
    format: HashFormat,
    delta_cache: Mutex<LruCache<u64, (ObjectKind, Vec<u8>)>>,
}

impl PackFile {
    /// Open a `.pack` file and its sibling `.idx`.
    pub fn open(pack_path: impl AsRef<Path>, format: HashFormat) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if !SUPPORTED_PACK_VERSIONS.contains(&version) {
            return Err(PackError::UnsupportedVersion(version));
        }
        let object_count = u32::from_be_bytes(data[8..12].try_into().unwrap());

        let index = PackIndex::open(&idx_path, format)?;
        if index.object_count() != object_count {
            return Err(PackError::InvalidHeader(format!(
                "pack has {} objects but index has {}",
                object_count,
                index.object_count()
            )));
        }

        Ok(Self {
            data,
            index,
            pack_path,
            object_count,
            format,
            delta_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_DELTA_CACHE).unwrap(),
            )),
        })
    }

    /// Resize the materialized-base cache.
    pub fn set_delta_cache_size(&self, size: usize) {
        let mut cache = self.delta_cache.lock().unwrap();
        cache.resize(NonZeroUsize::new(size.max(1)).unwrap());
    }

    /// Read a fully resolved object by id. `None` when not in this pack.
    pub fn read(&self, id: &ObjectId) -> Result<Option<EncodedObject>, PackError> {
        self.read_with_resolver(id, |_| None)
    }

    /// Read by id, resolving out-of-pack REF bases through `resolver`
    /// (thin packs that were installed with external bases).
    pub fn read_with_resolver(
        &self,
        id: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
    ) -> Result<Option<EncodedObject>, PackError> {
        match self.index.find(id) {
            Some(offset) => self.read_at(offset, &resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Read the fully resolved object at a known offset.
    pub fn read_at(
        &self,
        offset: u64,
        resolver: &impl Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
    ) -> Result<EncodedObject, PackError> {
        let (kind, data) = self.materialize(offset, resolver)?;
        Ok(EncodedObject::new(kind, data))
    }

    /// The kind and inflated size of the object at `id` without
    /// materializing delta chains' payloads beyond the chain heads.
    pub fn kind_of(&self, id: &ObjectId) -> Result<Option<(ObjectKind, usize)>, PackError> {
        let Some(offset) = self.index.find(id) else {
            return Ok(None);
        };
        // The ultimate kind requires walking to the chain's base; the
        // size of the object itself is in its own header.
        let header = parse_record_header(&self.data[offset as usize..], offset, self.format)?;
        let size = header.inflated_size;
        let kind = self.chain_kind(offset)?;
        Ok(Some((kind, size)))
    }

    /// The raw stored form of `id`: the delta script when deltified, the
    /// full bytes otherwise.
    pub fn raw_record(&self, id: &ObjectId) -> Result<Option<RawRecord>, PackError> {
        let Some(offset) = self.index.find(id) else {
            return Ok(None);
        };
        let header = parse_record_header(&self.data[offset as usize..], offset, self.format)?;
        let payload = self.inflate(header.data_offset, header.inflated_size)?;
        Ok(Some(match header.kind {
            RecordKind::OfsDelta { base_offset } => RawRecord::OfsDelta {
                base_offset,
                script: payload,
            },
            RecordKind::RefDelta { base_id } => RawRecord::RefDelta {
                base_id,
                script: payload,
            },
            kind => RawRecord::Full {
                kind: kind.object_kind().expect("non-delta record"),
                data: payload,
            },
        }))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// Is this pack pinned against repacking by a `.keep` marker?
    pub fn has_keep_marker(&self) -> bool {
        self.pack_path.with_extension("keep").exists()
    }

    /// Walk a delta chain to its base and return the base's kind.
    fn chain_kind(&self, mut offset: u64) -> Result<ObjectKind, PackError> {
        for _ in 0..MAX_DELTA_CHAIN_DEPTH {
            let header =
                parse_record_header(&self.data[offset as usize..], offset, self.format)?;
            match header.kind {
                RecordKind::OfsDelta { base_offset } => offset = base_offset,
                RecordKind::RefDelta { base_id } => match self.index.find(&base_id) {
                    Some(base_offset) => offset = base_offset,
                    // External base (installed thin pack): the caller
                    // falls back to a resolver-backed full read.
                    None => return Err(PackError::MissingBase(base_id)),
                },
                kind => return Ok(kind.object_kind().expect("non-delta record")),
            }
        }
        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Materialize the object at `offset`, resolving its delta chain
    /// iteratively with the shared base cache.
    fn materialize(
        &self,
        offset: u64,
        resolver: &impl Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
    ) -> Result<(ObjectKind, Vec<u8>), PackError> {
        let mut scripts: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut current = offset;

        let (kind, mut data) = loop {
            if scripts.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max_depth: MAX_DELTA_CHAIN_DEPTH,
                });
            }
            {
                let mut cache = self.delta_cache.lock().unwrap();
                if let Some((kind, bytes)) = cache.get(&current) {
                    break (*kind, bytes.clone());
                }
            }

            let header =
                parse_record_header(&self.data[current as usize..], current, self.format)?;
            let payload = self.inflate(header.data_offset, header.inflated_size)?;

            match header.kind {
                RecordKind::OfsDelta { base_offset } => {
                    scripts.push((current, payload));
                    current = base_offset;
                }
                RecordKind::RefDelta { base_id } => {
                    scripts.push((current, payload));
                    if let Some(base_offset) = self.index.find(&base_id) {
                        current = base_offset;
                    } else if let Some((kind, bytes)) = resolver(&base_id) {
                        break (kind, bytes);
                    } else {
                        return Err(PackError::MissingBase(base_id));
                    }
                }
                kind => break (kind.object_kind().expect("non-delta record"), payload),
            }
        };

        let mut cache = self.delta_cache.lock().unwrap();
        for (script_offset, script) in scripts.iter().rev() {
            data = crate::delta::apply(&data, script)?;
            cache.put(*script_offset, (kind, data.clone()));
        }
        if scripts.is_empty() {
            cache.put(offset, (kind, data.clone()));
        }

        Ok((kind, data))
    }

    fn inflate(&self, data_offset: u64, expected: usize) -> Result<Vec<u8>, PackError> {
        let mut decoder = ZlibDecoder::new(&self.data[data_offset as usize..]);
        let mut payload = Vec::with_capacity(expected);
        decoder
            .read_to_end(&mut payload)
            .map_err(|_| PackError::CorruptEntry(data_offset))?;
        if payload.len() != expected {
            return Err(PackError::CorruptEntry(data_offset));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_write::write_index;
    use crate::write::PackBytesWriter;
    use grit_hash::hasher::Hasher;

    /// Write a pack + idx pair into `dir` and open it.
    fn install_pack(
        dir: &Path,
        build: impl FnOnce(&mut PackBytesWriter),
    ) -> (PackFile, Vec<ObjectId>) {
        let mut writer = PackBytesWriter::new(HashFormat::Sha1);
        build(&mut writer);
        let (bytes, checksum) = writer.finish().unwrap();

        // Index through the parser, which resolves deltas for ids.
        let parser = crate::parse::PackParser::new(&bytes, HashFormat::Sha1).unwrap();
        let mut ids = Vec::new();
        let entries = parser
            .parse(&|_| None, &grit_utils::CancelToken::new(), |obj| {
                ids.push(obj.id);
                Ok(())
            })
            .unwrap();

        let pack_path = dir.join("pack-test.pack");
        std::fs::write(&pack_path, &bytes).unwrap();
        write_index(
            pack_path.with_extension("idx"),
            &entries,
            &checksum,
            HashFormat::Sha1,
        )
        .unwrap();

        (PackFile::open(&pack_path, HashFormat::Sha1).unwrap(), ids)
    }

    #[test]
    fn read_full_objects() {
        let dir = tempfile::tempdir().unwrap();
        let (pack, ids) = install_pack(dir.path(), |w| {
            w.add_object(ObjectKind::Blob, b"alpha").unwrap();
            w.add_object(ObjectKind::Blob, b"beta").unwrap();
        });

        assert_eq!(pack.object_count(), 2);
        for id in &ids {
            assert!(pack.contains(id));
            let obj = pack.read(id).unwrap().unwrap();
            assert_eq!(obj.id(HashFormat::Sha1).unwrap(), *id);
        }

        let absent =
            ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        assert!(!pack.contains(&absent));
        assert!(pack.read(&absent).unwrap().is_none());
    }

    #[test]
    fn read_resolves_delta_chain() {
        let base = b"the quick brown fox jumps over the lazy dog, twice over";
        let edit1 = b"the quick brown fox leaps over the lazy dog, twice over";
        let edit2 = b"the quick brown fox leaps over the lazy cat, twice over";

        let dir = tempfile::tempdir().unwrap();
        let (pack, ids) = install_pack(dir.path(), |w| {
            let base_off = w.add_object(ObjectKind::Blob, base).unwrap();
            let d1_off = w
                .add_ofs_delta(base_off, &crate::delta::compute(base, edit1))
                .unwrap();
            w.add_ofs_delta(d1_off, &crate::delta::compute(edit1, edit2))
                .unwrap();
        });

        let obj = pack.read(&ids[2]).unwrap().unwrap();
        assert_eq!(obj.kind, ObjectKind::Blob);
        assert_eq!(obj.data, edit2);

        // Second read comes from the shared cache.
        let again = pack.read(&ids[2]).unwrap().unwrap();
        assert_eq!(again.data, edit2);
    }

    #[test]
    fn kind_of_walks_to_chain_base() {
        let base = b"commit-ish base payload that is long enough to delta";
        let target = b"commit-ish base payload that is long enough to munge";
        let dir = tempfile::tempdir().unwrap();
        let (pack, ids) = install_pack(dir.path(), |w| {
            let off = w.add_object(ObjectKind::Blob, base).unwrap();
            w.add_ofs_delta(off, &crate::delta::compute(base, target))
                .unwrap();
        });

        let (kind, size) = pack.kind_of(&ids[1]).unwrap().unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        // The record's own header size is the delta script size.
        assert!(size > 0);
    }

    #[test]
    fn raw_record_exposes_delta_form() {
        let base: &[u8] = b"raw record base, long enough to be delta material";
        let target: &[u8] = b"raw record base, long enough to be delta material!";
        let base_id = Hasher::object_id(HashFormat::Sha1, "blob", base).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (pack, ids) = install_pack(dir.path(), |w| {
            w.add_object(ObjectKind::Blob, base).unwrap();
            w.add_ref_delta(&base_id, &crate::delta::compute(base, target))
                .unwrap();
        });

        match pack.raw_record(&ids[0]).unwrap().unwrap() {
            RawRecord::Full { kind, data } => {
                assert_eq!(kind, ObjectKind::Blob);
                assert_eq!(data, base);
            }
            other => panic!("expected full record, got {other:?}"),
        }
        match pack.raw_record(&ids[1]).unwrap().unwrap() {
            RawRecord::RefDelta { base_id: b, script } => {
                assert_eq!(b, base_id);
                assert!(!script.is_empty());
            }
            other => panic!("expected ref delta, got {other:?}"),
        }
    }

    #[test]
    fn keep_marker_detected() {
        let dir = tempfile::tempdir().unwrap();
        let (pack, _) = install_pack(dir.path(), |w| {
            w.add_object(ObjectKind::Blob, b"kept").unwrap();
        });
        assert!(!pack.has_keep_marker());
        std::fs::write(pack.path().with_extension("keep"), b"").unwrap();
        assert!(pack.has_keep_marker());
    }
}
