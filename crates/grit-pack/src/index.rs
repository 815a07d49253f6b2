//! Pack index (v2) reading and lookup.
//!
//! Layout:
//!
//! ```text
//! Header:  \xff tOc | version (=2)
//! Fanout:  256 × u32 BE cumulative counts of ids whose first byte ≤ i
//! Ids:     N × raw-id-width sorted ids
//! CRC32:   N × u32 BE
//! Offsets: N × u32 BE (high bit set → index into the 64-bit table)
//! 64-bit:  M × u64 BE offsets (packs > 2 GiB)
//! Trailer: pack checksum | index checksum
//! ```
//!
//! Lookup is a binary search bounded by the fan-out bucket of the id's
//! first byte.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use grit_hash::{HashFormat, ObjectId};
use memmap2::Mmap;

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

#[derive(Debug)]
enum IndexBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for IndexBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m,
            Self::Owned(v) => v,
        }
    }
}

/// A pack index, mapping ids to pack offsets.
#[derive(Debug)]
pub struct PackIndex {
    data: IndexBytes,
    object_count: u32,
    id_table: usize,
    crc_table: usize,
    offset32_table: usize,
    offset64_table: usize,
    path: Option<PathBuf>,
    format: HashFormat,
}

impl PackIndex {
    /// Open and validate a `.idx` file.
    pub fn open(path: impl AsRef<Path>, format: HashFormat) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };
        Self::from_data(IndexBytes::Mapped(data), Some(path), format)
    }

    /// Parse an index held in memory.
    pub fn from_bytes(bytes: Vec<u8>, format: HashFormat) -> Result<Self, PackError> {
        Self::from_data(IndexBytes::Owned(bytes), None, format)
    }

    fn from_data(
        data: IndexBytes,
        path: Option<PathBuf>,
        format: HashFormat,
    ) -> Result<Self, PackError> {
        let id_len = format.raw_len();

        if data.len() < 8 + 1024 + 2 * id_len {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = read_u32(&data[4..]);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout = 8;
        let object_count = read_u32(&data[fanout + 255 * 4..]);

        let n = object_count as usize;
        let id_table = fanout + 1024;
        let crc_table = id_table + n * id_len;
        let offset32_table = crc_table + n * 4;
        let offset64_table = offset32_table + n * 4;

        // The 64-bit table is variable; everything before it plus the
        // trailer must fit.
        if data.len() < offset64_table + 2 * id_len {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} bytes for {} objects",
                data.len(),
                n
            )));
        }

        Ok(Self {
            data,
            object_count,
            id_table,
            crc_table,
            offset32_table,
            offset64_table,
            path,
            format,
        })
    }

    /// Look up an id, returning its pack offset, or `None` when absent.
    pub fn find(&self, id: &ObjectId) -> Option<u64> {
        let (mut low, mut high) = self.fanout_range(id.first_byte());
        let target = id.as_bytes();

        while low < high {
            let mid = low + (high - low) / 2;
            match self.id_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid as u32)),
            }
        }
        None
    }

    /// Does this index contain the id?
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.find(id).is_some()
    }

    /// The id at a sorted position.
    pub fn id_at(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.id_bytes_at(index as usize), self.format)
            .expect("index position validated by caller")
    }

    /// The pack offset at a sorted position, promoting through the 64-bit
    /// table when the high bit is set.
    pub fn offset_at(&self, index: u32) -> u64 {
        let pos = self.offset32_table + index as usize * 4;
        let val = read_u32(&self.data[pos..]);

        if val & 0x8000_0000 != 0 {
            let idx64 = (val & 0x7fff_ffff) as usize;
            let pos64 = self.offset64_table + idx64 * 8;
            u64::from_be_bytes(self.data[pos64..pos64 + 8].try_into().unwrap())
        } else {
            val as u64
        }
    }

    /// The recorded CRC32 of the entry at a sorted position.
    pub fn crc_at(&self, index: u32) -> u32 {
        read_u32(&self.data[self.crc_table + index as usize * 4..])
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The pack checksum recorded in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let id_len = self.format.raw_len();
        let start = self.data.len() - 2 * id_len;
        ObjectId::from_bytes(&self.data[start..start + id_len], self.format)
            .expect("trailer length validated on open")
    }

    /// Iterate `(id, offset)` pairs in sorted id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.object_count).map(|i| (self.id_at(i), self.offset_at(i)))
    }

    fn id_bytes_at(&self, index: usize) -> &[u8] {
        let id_len = self.format.raw_len();
        let start = self.id_table + index * id_len;
        &self.data[start..start + id_len]
    }

    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let entry = |i: usize| read_u32(&self.data[8 + i * 4..]) as usize;
        let end = entry(first_byte as usize);
        let start = if first_byte == 0 {
            0
        } else {
            entry(first_byte as usize - 1)
        };
        (start, end)
    }
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes(data[..4].try_into().unwrap())
}
