//! Loose object storage: read, write, enumerate, and prune
//! zlib-compressed one-file-per-object storage.
//!
//! Each object lives at `objects/XX/YYYY...` where `XX` is the first hex
//! byte of its id and `YYYY...` the rest. File content is zlib-deflated
//! `"{kind} {size}\0{content}"`. Writes go through a temp file and an
//! atomic rename, so readers never observe torn objects.

mod enumerate;
mod prune;
mod read;
mod write;

pub use enumerate::LooseIter;
pub use prune::PruneReport;

use std::path::{Path, PathBuf};

use grit_hash::{HashFormat, ObjectId};

/// The loose object layer over an `objects/` directory.
pub struct LooseStore {
    objects_dir: PathBuf,
    format: HashFormat,
    compression: flate2::Compression,
}

impl LooseStore {
    /// Open the loose store at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>, format: HashFormat) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            format,
            compression: flate2::Compression::default(),
        }
    }

    /// Set the zlib compression level (0–9).
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = flate2::Compression::new(level);
    }

    pub fn format(&self) -> HashFormat {
        self.format
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// The fan-out path for an id: `objects/xx/rest-of-hex`.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }
}

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("decompression error for {id}: {source}")]
    Decompress {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_fans_out_on_first_byte() {
        let store = LooseStore::open("/repo/objects", HashFormat::Sha1);
        let id = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        assert_eq!(
            store.object_path(&id),
            PathBuf::from("/repo/objects/da/39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }
}
