use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use grit_hash::hasher::Hasher;
use grit_hash::ObjectId;
use grit_object::{header, EncodedObject, ObjectKind};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Does a loose object with this id exist?
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Read a loose object by id.
    ///
    /// Returns `Ok(None)` when absent, `Err` when present but corrupt.
    pub fn read(&self, id: &ObjectId) -> Result<Option<EncodedObject>, LooseError> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let raw = inflate_all(&compressed, id)?;
        let (kind, content_size, header_len) = header::parse_header(&raw)?;
        let content = &raw[header_len..];
        if content.len() != content_size {
            return Err(LooseError::Corrupt {
                id: id.to_hex(),
                reason: format!(
                    "size mismatch: header says {content_size}, file holds {}",
                    content.len()
                ),
            });
        }
        Ok(Some(EncodedObject::new(kind, content.to_vec())))
    }

    /// Read just `(kind, size)` by inflating only the header bytes.
    ///
    /// This is what makes kind-mismatch detection cheap: the body is
    /// never decompressed.
    pub fn read_header(
        &self,
        id: &ObjectId,
    ) -> Result<Option<(ObjectKind, usize)>, LooseError> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        // Headers are < 32 bytes; 64 gives slack for absurd sizes.
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut buf = [0u8; 64];
        let mut filled = 0;

        loop {
            if filled >= buf.len() {
                return Err(LooseError::Corrupt {
                    id: id.to_hex(),
                    reason: "header exceeds 64 bytes".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|e| LooseError::Decompress {
                    id: id.to_hex(),
                    source: e,
                })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    id: id.to_hex(),
                    reason: "EOF before header NUL".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        let (kind, content_size, _header_len) = header::parse_header(&buf[..filled])?;
        Ok(Some((kind, content_size)))
    }

    /// Read and verify: the inflated bytes must hash back to `id`.
    pub fn read_verified(&self, id: &ObjectId) -> Result<Option<EncodedObject>, LooseError> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let raw = inflate_all(&compressed, id)?;
        let actual = Hasher::digest(self.format(), &raw)?;
        if actual != *id {
            return Err(LooseError::HashMismatch {
                path,
                expected: id.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let (kind, content_size, header_len) = header::parse_header(&raw)?;
        Ok(Some(EncodedObject::new(
            kind,
            raw[header_len..header_len + content_size].to_vec(),
        )))
    }
}

fn inflate_all(compressed: &[u8], id: &ObjectId) -> Result<Vec<u8>, LooseError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| LooseError::Decompress {
            id: id.to_hex(),
            source: e,
        })?;
    Ok(out)
}
