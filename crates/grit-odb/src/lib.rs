//! Unified object database: loose objects plus packfiles behind one
//! content-addressed interface.
//!
//! Reads consult the loose layer first, then packs in discovery order;
//! writes go through to the loose layer. Kind-checked reads detect a
//! mismatch from headers alone, without inflating bodies. Received packs
//! enter through [`Odb::packfile_writer`], which spools the byte stream
//! and installs the pack atomically only after its trailing hash
//! verifies.

mod iter;
mod sink;

pub use iter::OdbIter;
pub use sink::{InstalledPack, PackSink};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use grit_hash::{HashFormat, ObjectId};
use grit_loose::{LooseStore, PruneReport};
use grit_object::{EncodedObject, ObjectKind};
use grit_pack::pack::{PackFile, RawRecord};

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object {id} is a {actual}, expected {expected}")]
    KindMismatch {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: ObjectId, reason: String },

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Loose(#[from] grit_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

/// The composite object store over an `objects/` directory.
pub struct Odb {
    loose: LooseStore,
    packs: RwLock<Vec<Arc<PackFile>>>,
    objects_dir: PathBuf,
    format: HashFormat,
}

impl Odb {
    /// Open the store, discovering existing packs.
    pub fn open(objects_dir: impl AsRef<Path>, format: HashFormat) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let loose = LooseStore::open(&objects_dir, format);
        let packs = discover_packs(&objects_dir, format)?;
        Ok(Self {
            loose,
            packs: RwLock::new(packs),
            objects_dir,
            format,
        })
    }

    pub fn format(&self) -> HashFormat {
        self.format
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn loose(&self) -> &LooseStore {
        &self.loose
    }

    /// Write an encoded object; idempotent, returns its id.
    pub fn put(&self, obj: &EncodedObject) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(obj)?)
    }

    /// Write raw content with a known kind.
    pub fn put_raw(&self, kind: ObjectKind, content: &[u8]) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(kind, content)?)
    }

    /// Read an object, optionally enforcing its kind.
    ///
    /// With a kind hint, a stored object of a different kind fails with
    /// [`OdbError::KindMismatch`] before its body is inflated.
    pub fn get(
        &self,
        expected: Option<ObjectKind>,
        id: &ObjectId,
    ) -> Result<EncodedObject, OdbError> {
        if let Some(expected) = expected {
            let (actual, _) = self.header(id)?;
            if actual != expected {
                return Err(OdbError::KindMismatch {
                    id: *id,
                    expected,
                    actual,
                });
            }
        }
        self.read_encoded(id)
    }

    /// Fast membership test.
    pub fn has(&self, id: &ObjectId) -> bool {
        if self.loose.contains(id) {
            return true;
        }
        self.packs
            .read()
            .unwrap()
            .iter()
            .any(|pack| pack.contains(id))
    }

    /// Logical content size without reading the body.
    pub fn size(&self, id: &ObjectId) -> Result<usize, OdbError> {
        Ok(self.header(id)?.1)
    }

    /// `(kind, size)` from headers alone.
    pub fn header(&self, id: &ObjectId) -> Result<(ObjectKind, usize), OdbError> {
        if let Some(found) = self.loose.read_header(id)? {
            return Ok(found);
        }
        // Thin-pack remnants need a resolving read; that happens after
        // the pack-list lock is released.
        let mut needs_full_read = false;
        {
            let packs = self.packs.read().unwrap();
            for pack in packs.iter() {
                match pack.kind_of(id) {
                    Ok(Some(found)) => return Ok(found),
                    Ok(None) => continue,
                    Err(grit_pack::PackError::MissingBase(_)) => {
                        needs_full_read = true;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if needs_full_read {
            let obj = self.read_encoded(id)?;
            return Ok((obj.kind, obj.size()));
        }
        Err(OdbError::NotFound(*id))
    }

    /// The raw stored form: the delta script when the object is packed
    /// as a delta, the full object otherwise.
    pub fn delta_of(&self, id: &ObjectId) -> Result<RawRecord, OdbError> {
        for pack in self.packs.read().unwrap().iter() {
            if let Some(record) = pack.raw_record(id)? {
                return Ok(record);
            }
        }
        let obj = self.read_encoded(id)?;
        Ok(RawRecord::Full {
            kind: obj.kind,
            data: obj.data,
        })
    }

    /// Iterate all objects, optionally filtered by kind, deduplicated by
    /// id across layers.
    pub fn iter(&self, kind: Option<ObjectKind>) -> Result<OdbIter<'_>, OdbError> {
        OdbIter::new(self, kind)
    }

    /// All ids across layers, sorted and deduplicated.
    pub fn ids(&self) -> Result<Vec<ObjectId>, OdbError> {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut ids = Vec::new();
        for id in self.loose.iter()? {
            let id = id?;
            if seen.insert(id) {
                ids.push(id);
            }
        }
        for pack in self.packs.read().unwrap().iter() {
            for (id, _) in pack.index().iter() {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// A sink for a received packfile; see [`PackSink`].
    pub fn packfile_writer(&self) -> Result<PackSink<'_>, OdbError> {
        PackSink::new(self)
    }

    /// Delete unreachable loose objects older than `grace`.
    pub fn prune_loose(
        &self,
        reachable: &HashSet<ObjectId>,
        grace: Duration,
    ) -> Result<PruneReport, OdbError> {
        Ok(self.loose.prune(reachable, grace)?)
    }

    /// Rescan `objects/pack` (after a pack install or an external gc).
    pub fn refresh(&self) -> Result<(), OdbError> {
        let new_packs = discover_packs(&self.objects_dir, self.format)?;
        *self.packs.write().unwrap() = new_packs;
        Ok(())
    }

    fn read_encoded(&self, id: &ObjectId) -> Result<EncodedObject, OdbError> {
        if let Some(obj) = self.loose.read(id)? {
            return Ok(obj);
        }
        let packs = self.packs.read().unwrap();
        for pack in packs.iter() {
            // Bases of installed thin packs live elsewhere in this store.
            let resolver = |base: &ObjectId| {
                if self.loose.contains(base) {
                    return self
                        .loose
                        .read(base)
                        .ok()
                        .flatten()
                        .map(|o| (o.kind, o.data));
                }
                packs
                    .iter()
                    .filter(|other| !std::ptr::eq(pack.as_ref(), other.as_ref()))
                    .find_map(|other| other.read(base).ok().flatten())
                    .map(|o| (o.kind, o.data))
            };
            if let Some(obj) = pack.read_with_resolver(id, resolver)? {
                return Ok(obj);
            }
        }
        Err(OdbError::NotFound(*id))
    }
}

/// Scan `objects/pack` for `.pack` files with a usable index.
fn discover_packs(
    objects_dir: &Path,
    format: HashFormat,
) -> Result<Vec<Arc<PackFile>>, OdbError> {
    let pack_dir = objects_dir.join("pack");
    if !pack_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(&pack_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "pack"))
        .collect();

    // Newest packs first: recently fetched objects are the hot ones.
    entries.sort_by_key(|e| {
        std::cmp::Reverse(e.metadata().and_then(|m| m.modified()).ok())
    });

    let mut packs = Vec::new();
    for entry in entries {
        match PackFile::open(entry.path(), format) {
            Ok(pack) => packs.push(Arc::new(pack)),
            // A pack without a readable index is skipped, not fatal.
            Err(_) => continue,
        }
    }
    Ok(packs)
}
