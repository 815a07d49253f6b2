//! Pack generation: building the byte stream a push sends.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_hash::hasher::Hasher;
use grit_hash::{HashFormat, ObjectId};
use grit_object::ObjectKind;

use crate::entry::{encode_ofs_distance, encode_record_header};
use crate::{kind_type_number, PackError, DEFAULT_PACK_VERSION, PACK_SIGNATURE};

/// Builds a packfile in memory.
///
/// Records are appended in the order given (the caller topologically
/// sorts so delta bases precede their deltas); `finish` patches the
/// object count and appends the trailing hash. REF deltas against
/// objects the receiver is known to hold make the result a thin pack.
pub struct PackBytesWriter {
    buf: Vec<u8>,
    object_count: u32,
    format: HashFormat,
    compression: Compression,
}

impl PackBytesWriter {
    pub fn new(format: HashFormat) -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(PACK_SIGNATURE);
        buf.extend_from_slice(&DEFAULT_PACK_VERSION.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // patched in finish()
        Self {
            buf,
            object_count: 0,
            format,
            compression: Compression::default(),
        }
    }

    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = Compression::new(level);
    }

    /// Append a full object record. Returns the record's offset, usable
    /// as an OFS delta base.
    pub fn add_object(&mut self, kind: ObjectKind, data: &[u8]) -> Result<u64, PackError> {
        let offset = self.buf.len() as u64;
        let header = encode_record_header(kind_type_number(kind), data.len() as u64);
        self.buf.extend_from_slice(&header);
        self.deflate(data)?;
        self.object_count += 1;
        Ok(offset)
    }

    /// Append an OFS delta record against the record at `base_offset`.
    pub fn add_ofs_delta(&mut self, base_offset: u64, script: &[u8]) -> Result<u64, PackError> {
        let offset = self.buf.len() as u64;
        debug_assert!(base_offset < offset);
        let header = encode_record_header(6, script.len() as u64);
        self.buf.extend_from_slice(&header);
        self.buf
            .extend_from_slice(&encode_ofs_distance(offset - base_offset));
        self.deflate(script)?;
        self.object_count += 1;
        Ok(offset)
    }

    /// Append a REF delta record against `base_id`.
    pub fn add_ref_delta(&mut self, base_id: &ObjectId, script: &[u8]) -> Result<u64, PackError> {
        let offset = self.buf.len() as u64;
        let header = encode_record_header(7, script.len() as u64);
        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(base_id.as_bytes());
        self.deflate(script)?;
        self.object_count += 1;
        Ok(offset)
    }

    /// Patch the object count, append the trailing hash, and return
    /// `(bytes, checksum)`.
    pub fn finish(mut self) -> Result<(Vec<u8>, ObjectId), PackError> {
        self.buf[8..12].copy_from_slice(&self.object_count.to_be_bytes());
        let checksum = Hasher::digest(self.format, &self.buf)?;
        self.buf.extend_from_slice(checksum.as_bytes());
        Ok((self.buf, checksum))
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    fn deflate(&mut self, data: &[u8]) -> Result<(), PackError> {
        let mut encoder = ZlibEncoder::new(&mut self.buf, self.compression);
        encoder.write_all(data)?;
        encoder.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::PackParser;
    use grit_utils::CancelToken;

    #[test]
    fn empty_pack_roundtrips() {
        let writer = PackBytesWriter::new(HashFormat::Sha1);
        let (bytes, checksum) = writer.finish().unwrap();
        let parser = PackParser::new(&bytes, HashFormat::Sha1).unwrap();
        assert_eq!(parser.object_count(), 0);
        assert_eq!(parser.checksum(), checksum);
    }

    #[test]
    fn written_pack_parses_back() {
        let mut writer = PackBytesWriter::new(HashFormat::Sha1);
        writer.add_object(ObjectKind::Blob, b"one").unwrap();
        writer.add_object(ObjectKind::Blob, b"two").unwrap();
        assert_eq!(writer.object_count(), 2);
        let (bytes, _) = writer.finish().unwrap();

        let parser = PackParser::new(&bytes, HashFormat::Sha1).unwrap();
        let mut contents = Vec::new();
        parser
            .parse(&|_| None, &CancelToken::new(), |obj| {
                contents.push(obj.data);
                Ok(())
            })
            .unwrap();
        assert_eq!(contents, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn header_records_count_and_version() {
        let mut writer = PackBytesWriter::new(HashFormat::Sha1);
        writer.add_object(ObjectKind::Blob, b"x").unwrap();
        let (bytes, _) = writer.finish().unwrap();
        assert_eq!(&bytes[0..4], b"PACK");
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_be_bytes(bytes[8..12].try_into().unwrap()), 1);
    }
}
