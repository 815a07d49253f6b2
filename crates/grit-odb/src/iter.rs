//! Lazy enumeration over all store layers.

use grit_hash::ObjectId;
use grit_object::{EncodedObject, ObjectKind};

use crate::{Odb, OdbError};

/// Iterator over the store's objects, deduplicated by id across loose
/// and packed layers, optionally filtered by kind.
///
/// The id list is snapshotted up front; object bodies are read lazily,
/// so an `iter` that is dropped early never touches the skipped bodies.
/// Kind filtering goes through headers, not bodies.
pub struct OdbIter<'a> {
    odb: &'a Odb,
    ids: Vec<ObjectId>,
    pos: usize,
    kind: Option<ObjectKind>,
}

impl<'a> OdbIter<'a> {
    pub(crate) fn new(odb: &'a Odb, kind: Option<ObjectKind>) -> Result<Self, OdbError> {
        Ok(Self {
            odb,
            ids: odb.ids()?,
            pos: 0,
            kind,
        })
    }

    /// Release the cursor without draining it.
    pub fn close(mut self) {
        self.pos = self.ids.len();
    }
}

impl Iterator for OdbIter<'_> {
    type Item = Result<(ObjectId, EncodedObject), OdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.ids.len() {
            let id = self.ids[self.pos];
            self.pos += 1;

            if let Some(want) = self.kind {
                match self.odb.header(&id) {
                    Ok((kind, _)) if kind != want => continue,
                    Ok(_) => {}
                    Err(e) => return Some(Err(e)),
                }
            }
            return Some(self.odb.get(None, &id).map(|obj| (id, obj)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_hash::HashFormat;

    #[test]
    fn filters_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(dir.path(), HashFormat::Sha1).unwrap();

        odb.put_raw(ObjectKind::Blob, b"a blob").unwrap();
        odb.put_raw(ObjectKind::Blob, b"another blob").unwrap();
        odb.put_raw(
            ObjectKind::Commit,
            b"tree 0000000000000000000000000000000000000000\nauthor A <a@b.c> 0 +0000\ncommitter A <a@b.c> 0 +0000\n\nm\n",
        )
        .unwrap();

        let blobs: Vec<_> = odb
            .iter(Some(ObjectKind::Blob))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(blobs.len(), 2);
        assert!(blobs.iter().all(|(_, o)| o.kind == ObjectKind::Blob));

        let everything: Vec<_> = odb.iter(None).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn close_releases_early() {
        let dir = tempfile::tempdir().unwrap();
        let odb = Odb::open(dir.path(), HashFormat::Sha1).unwrap();
        odb.put_raw(ObjectKind::Blob, b"x").unwrap();

        let iter = odb.iter(None).unwrap();
        iter.close(); // no panic, no reads
    }
}
