//! Two-pass pack parsing: header walk, then delta resolution.
//!
//! The parser operates on the complete pack bytes (a mapped file, or a
//! network stream spooled to a temporary file by the store). Pass one
//! walks the record headers, recording offsets, spans, and per-record
//! CRCs, and verifies the trailing pack hash — a mismatch is fatal before
//! any object is surfaced. Pass two materializes every record in
//! dependency order: full objects inflate directly, OFS deltas chase
//! their base backwards, REF deltas resolve through objects seen so far,
//! then through the caller's external resolver (thin-pack fixup), and
//! anything still unresolved is retried until fixpoint.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use flate2::bufread::ZlibDecoder;
use grit_hash::hasher::Hasher;
use grit_hash::{HashFormat, ObjectId};
use grit_object::ObjectKind;
use grit_utils::CancelToken;
use lru::LruCache;
use std::io::Read;

use crate::entry::parse_record_header;
use crate::index_write::IndexEntry;
use crate::{
    PackError, RecordKind, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE, PACK_SIGNATURE,
    SUPPORTED_PACK_VERSIONS,
};

/// Default number of materialized delta bases kept hot.
const DEFAULT_BASE_CACHE: usize = 64;

/// A fully reconstructed object surfaced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    /// Offset of the record's first byte in the pack.
    pub offset: u64,
    /// CRC32 of the record's raw bytes.
    pub crc: u32,
}

struct RecordInfo {
    offset: u64,
    /// Offset one past the record's last byte.
    end: u64,
    crc: u32,
}

/// Pack parser over complete pack bytes.
pub struct PackParser<'a> {
    data: &'a [u8],
    format: HashFormat,
    version: u32,
    object_count: u32,
    base_cache_size: usize,
}

impl<'a> PackParser<'a> {
    /// Validate the header and trailer, without touching any record.
    ///
    /// Versions 2 and 3 are accepted; v3 merely declares the hash the
    /// repository already fixed. The trailing hash is recomputed and a
    /// mismatch rejects the whole pack.
    pub fn new(data: &'a [u8], format: HashFormat) -> Result<Self, PackError> {
        let id_len = format.raw_len();
        if data.len() < PACK_HEADER_SIZE + id_len {
            return Err(PackError::InvalidHeader("pack too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if !SUPPORTED_PACK_VERSIONS.contains(&version) {
            return Err(PackError::UnsupportedVersion(version));
        }
        let object_count = u32::from_be_bytes(data[8..12].try_into().unwrap());

        let expected = ObjectId::from_bytes(&data[data.len() - id_len..], format)
            .expect("trailer length checked above");
        let actual = Hasher::digest(format, &data[..data.len() - id_len])?;
        if actual != expected {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            data,
            format,
            version,
            object_count,
            base_cache_size: DEFAULT_BASE_CACHE,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    /// The verified trailing hash.
    pub fn checksum(&self) -> ObjectId {
        let id_len = self.format.raw_len();
        ObjectId::from_bytes(&self.data[self.data.len() - id_len..], self.format)
            .expect("validated in new()")
    }

    /// Set how many materialized delta bases stay cached.
    pub fn set_base_cache_size(&mut self, size: usize) {
        self.base_cache_size = size.max(1);
    }

    /// Parse the pack, emitting every object exactly once through `sink`
    /// in delta-dependency order. Returns the rows for index building.
    ///
    /// `resolve_base` supplies bases absent from the pack (thin packs);
    /// return `None` to reject them. Cancellation is honored between
    /// records.
    pub fn parse(
        &self,
        resolve_base: &dyn Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
        cancel: &CancelToken,
        mut sink: impl FnMut(ParsedObject) -> Result<(), PackError>,
    ) -> Result<Vec<IndexEntry>, PackError> {
        let records = self.scan_records(cancel)?;

        let mut cache: LruCache<u64, (ObjectKind, Vec<u8>)> = LruCache::new(
            NonZeroUsize::new(self.base_cache_size).unwrap_or(NonZeroUsize::MIN),
        );
        let mut by_id: HashMap<ObjectId, u64> = HashMap::new();
        let mut entries = Vec::with_capacity(records.len());
        let mut deferred: Vec<&RecordInfo> = Vec::new();

        for record in &records {
            cancel.check()?;
            if !self.try_emit(
                record,
                resolve_base,
                &mut cache,
                &mut by_id,
                &mut entries,
                &mut sink,
            )? {
                deferred.push(record);
            }
        }

        // REF deltas whose bases appear later in the pack settle here.
        loop {
            cancel.check()?;
            let before = deferred.len();
            let mut still_deferred = Vec::new();
            for record in deferred {
                if !self.try_emit(
                    record,
                    resolve_base,
                    &mut cache,
                    &mut by_id,
                    &mut entries,
                    &mut sink,
                )? {
                    still_deferred.push(record);
                }
            }
            if still_deferred.is_empty() {
                break;
            }
            if still_deferred.len() == before {
                // No progress: the remaining bases exist nowhere.
                let offset = still_deferred[0].offset;
                let header = parse_record_header(
                    &self.data[offset as usize..],
                    offset,
                    self.format,
                )?;
                return match header.kind {
                    RecordKind::RefDelta { base_id } => Err(PackError::MissingBase(base_id)),
                    _ => Err(PackError::CorruptEntry(offset)),
                };
            }
            deferred = still_deferred;
        }

        Ok(entries)
    }

    /// Pass one: record spans and CRCs, count validation.
    fn scan_records(&self, cancel: &CancelToken) -> Result<Vec<RecordInfo>, PackError> {
        let id_len = self.format.raw_len();
        let content_end = (self.data.len() - id_len) as u64;
        let mut records = Vec::with_capacity(self.object_count as usize);
        let mut offset = PACK_HEADER_SIZE as u64;

        while offset < content_end {
            cancel.check()?;
            let header =
                parse_record_header(&self.data[offset as usize..], offset, self.format)?;
            let consumed =
                self.inflate_at(header.data_offset, Some(header.inflated_size))?.1;
            let end = header.data_offset + consumed as u64;
            if end > content_end {
                return Err(PackError::CorruptEntry(offset));
            }

            let mut crc = crc32fast::Hasher::new();
            crc.update(&self.data[offset as usize..end as usize]);

            records.push(RecordInfo {
                offset,
                end,
                crc: crc.finalize(),
            });
            offset = end;
        }

        if records.len() != self.object_count as usize {
            return Err(PackError::InvalidHeader(format!(
                "header promises {} objects, pack holds {}",
                self.object_count,
                records.len()
            )));
        }
        Ok(records)
    }

    /// Try to materialize and emit one record. Returns `Ok(false)` when a
    /// REF base is not available yet.
    #[allow(clippy::too_many_arguments)]
    fn try_emit(
        &self,
        record: &RecordInfo,
        resolve_base: &dyn Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
        cache: &mut LruCache<u64, (ObjectKind, Vec<u8>)>,
        by_id: &mut HashMap<ObjectId, u64>,
        entries: &mut Vec<IndexEntry>,
        sink: &mut impl FnMut(ParsedObject) -> Result<(), PackError>,
    ) -> Result<bool, PackError> {
        let Some((kind, data)) =
            self.materialize(record.offset, resolve_base, cache, by_id)?
        else {
            return Ok(false);
        };

        let id = Hasher::object_id(self.format, kind.name(), &data)?;
        by_id.insert(id, record.offset);
        entries.push(IndexEntry {
            id,
            offset: record.offset,
            crc: record.crc,
        });
        sink(ParsedObject {
            id,
            kind,
            data,
            offset: record.offset,
            crc: record.crc,
        })?;
        Ok(true)
    }

    /// Materialize the object at `offset`, resolving its delta chain.
    ///
    /// Returns `None` when a REF base is not yet resolvable (the caller
    /// defers the record).
    fn materialize(
        &self,
        offset: u64,
        resolve_base: &dyn Fn(&ObjectId) -> Option<(ObjectKind, Vec<u8>)>,
        cache: &mut LruCache<u64, (ObjectKind, Vec<u8>)>,
        by_id: &HashMap<ObjectId, u64>,
    ) -> Result<Option<(ObjectKind, Vec<u8>)>, PackError> {
        // Chase the chain down to a full object (or an external base),
        // then apply the collected delta scripts back up.
        let mut scripts: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut current = offset;

        let (kind, mut data) = loop {
            if scripts.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max_depth: MAX_DELTA_CHAIN_DEPTH,
                });
            }
            if let Some((kind, bytes)) = cache.get(&current) {
                break (*kind, bytes.clone());
            }

            let header =
                parse_record_header(&self.data[current as usize..], current, self.format)?;
            let (payload, _) = self.inflate_at(header.data_offset, Some(header.inflated_size))?;

            match header.kind {
                RecordKind::Commit | RecordKind::Tree | RecordKind::Blob | RecordKind::Tag => {
                    let kind = header.kind.object_kind().expect("non-delta record");
                    break (kind, payload);
                }
                RecordKind::OfsDelta { base_offset } => {
                    scripts.push((current, payload));
                    current = base_offset;
                }
                RecordKind::RefDelta { base_id } => {
                    scripts.push((current, payload));
                    if let Some(&base_offset) = by_id.get(&base_id) {
                        current = base_offset;
                    } else if let Some((kind, bytes)) = resolve_base(&base_id) {
                        break (kind, bytes);
                    } else {
                        return Ok(None);
                    }
                }
            }
        };

        // Apply scripts innermost-base first, caching each intermediate.
        for (script_offset, script) in scripts.iter().rev() {
            data = crate::delta::apply(&data, script)?;
            cache.put(*script_offset, (kind, data.clone()));
        }
        if scripts.is_empty() {
            cache.put(offset, (kind, data.clone()));
        }

        Ok(Some((kind, data)))
    }

    /// Inflate the zlib stream at `data_offset`. Returns the payload and
    /// the number of compressed bytes consumed.
    fn inflate_at(
        &self,
        data_offset: u64,
        expected_size: Option<usize>,
    ) -> Result<(Vec<u8>, usize), PackError> {
        let compressed = &self.data[data_offset as usize..];
        let mut decoder = ZlibDecoder::new(compressed);
        let mut payload = Vec::with_capacity(expected_size.unwrap_or(0));
        decoder
            .read_to_end(&mut payload)
            .map_err(|_| PackError::CorruptEntry(data_offset))?;
        if let Some(expected) = expected_size {
            if payload.len() != expected {
                return Err(PackError::CorruptEntry(data_offset));
            }
        }
        Ok((payload, decoder.total_in() as usize))
    }
}
