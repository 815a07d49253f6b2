//! Streaming digest computation behind one interface.

use crate::{HashError, HashFormat, ObjectId};

enum Inner {
    Sha1(Box<sha1_checked::Sha1>),
    Sha256(sha2::Sha256),
}

/// Streaming hash computation for both object formats.
///
/// SHA-1 runs with collision detection; a crafted collision input fails
/// finalization instead of silently producing an id. Data can be fed
/// incrementally via [`update`](Hasher::update) or the [`std::io::Write`]
/// implementation.
pub struct Hasher {
    inner: Inner,
}

impl Hasher {
    pub fn new(format: HashFormat) -> Self {
        use digest::Digest;
        let inner = match format {
            HashFormat::Sha1 => Inner::Sha1(Box::new(sha1_checked::Sha1::new())),
            HashFormat::Sha256 => Inner::Sha256(sha2::Sha256::new()),
        };
        Self { inner }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        match &mut self.inner {
            Inner::Sha1(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
        }
    }

    /// Finalize into an [`ObjectId`].
    pub fn finish(self) -> Result<ObjectId, HashError> {
        match self.inner {
            Inner::Sha1(h) => {
                let result = h.try_finalize();
                if result.has_collision() {
                    return Err(HashError::Sha1Collision);
                }
                let mut raw = [0u8; 20];
                raw.copy_from_slice(result.hash().as_slice());
                Ok(ObjectId::Sha1(raw))
            }
            Inner::Sha256(h) => {
                use digest::Digest;
                let mut raw = [0u8; 32];
                raw.copy_from_slice(h.finalize().as_slice());
                Ok(ObjectId::Sha256(raw))
            }
        }
    }

    /// Hash a byte slice in one call.
    pub fn digest(format: HashFormat, data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new(format);
        h.update(data);
        h.finish()
    }

    /// Compute a git object id: `hash("{kind} {len}\0" || content)`.
    pub fn object_id(
        format: HashFormat,
        kind: &str,
        content: &[u8],
    ) -> Result<ObjectId, HashError> {
        let mut h = Self::new(format);
        h.update(kind.as_bytes());
        h.update(b" ");
        h.update(content.len().to_string().as_bytes());
        h.update(b"\0");
        h.update(content);
        h.finish()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_empty_input() {
        let id = Hasher::digest(HashFormat::Sha1, b"").unwrap();
        assert_eq!(id.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn sha256_empty_input() {
        let id = Hasher::digest(HashFormat::Sha256, b"").unwrap();
        assert_eq!(
            id.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn empty_blob_object_id() {
        // The well-known id of the empty blob.
        let id = Hasher::object_id(HashFormat::Sha1, "blob", b"").unwrap();
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn hello_blob_object_id() {
        // `echo 'hello world' | git hash-object --stdin`
        let id = Hasher::object_id(HashFormat::Sha1, "blob", b"hello world\n").unwrap();
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = Hasher::new(HashFormat::Sha1);
        h.update(b"hello ");
        h.update(b"world");
        let incremental = h.finish().unwrap();
        let oneshot = Hasher::digest(HashFormat::Sha1, b"hello world").unwrap();
        assert_eq!(incremental, oneshot);
    }

    #[test]
    fn write_impl_feeds_hasher() {
        use std::io::Write;
        let mut h = Hasher::new(HashFormat::Sha1);
        h.write_all(b"hello world").unwrap();
        let via_write = h.finish().unwrap();
        assert_eq!(
            via_write,
            Hasher::digest(HashFormat::Sha1, b"hello world").unwrap()
        );
    }
}
