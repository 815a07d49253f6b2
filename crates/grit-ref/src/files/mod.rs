//! The files ref backend: loose refs under `refs/` plus `packed-refs`.

pub(crate) mod loose;
pub mod packed;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use grit_utils::lockfile::LockFile;

use crate::error::RefError;
use crate::name::RefName;
use crate::store::RefStore;
use crate::Reference;

use self::packed::PackedRefs;

/// Ref store over a `.git` directory, matching C git's files backend:
/// one file per loose ref, `packed-refs` for the packed tier, loose
/// shadowing packed, and `.lock` files for update atomicity.
pub struct FilesRefStore {
    git_dir: PathBuf,
}

impl FilesRefStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn read_any(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        if let Some(found) = loose::read(&self.git_dir, name)? {
            return Ok(Some(found));
        }
        let packed = PackedRefs::load(&self.git_dir)?;
        Ok(packed.find(name).map(|pr| Reference::Hash {
            name: pr.name.clone(),
            target: pr.id,
        }))
    }

    /// Drop a ref from packed-refs, rewriting the file under its lock.
    fn remove_packed(&self, name: &RefName) -> Result<(), RefError> {
        let path = self.git_dir.join("packed-refs");
        if !path.exists() {
            return Ok(());
        }
        let mut packed = PackedRefs::load(&self.git_dir)?;
        if !packed.remove(name) {
            return Ok(());
        }
        let mut lock = LockFile::acquire(&path)?;
        lock.write_all(&packed.serialize())
            .map_err(RefError::Io)?;
        lock.commit()?;
        Ok(())
    }
}

impl RefStore for FilesRefStore {
    fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        self.read_any(name)
    }

    fn set(&self, reference: &Reference) -> Result<(), RefError> {
        loose::write(&self.git_dir, reference)
    }

    fn compare_and_set(
        &self,
        new: &Reference,
        expected: Option<&Reference>,
    ) -> Result<(), RefError> {
        // The loose file's lock serializes the read-compare-write.
        let path = loose::ref_path(&self.git_dir, new.name());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut lock = LockFile::acquire(&path)?;

        let stored = self.read_any(new.name())?;
        let matches = match (&stored, expected) {
            (None, None) => true,
            (Some(stored), Some(expected)) => stored == expected,
            _ => false,
        };
        if !matches {
            return Err(RefError::ReferenceHasChanged(new.name().to_string()));
        }

        lock.write_all(new.to_file_content().as_bytes())
            .map_err(RefError::Io)?;
        lock.commit()?;
        Ok(())
    }

    fn remove(&self, name: &RefName) -> Result<(), RefError> {
        loose::delete(&self.git_dir, name)?;
        self.remove_packed(name)
    }

    fn iter(&self) -> Result<Vec<Reference>, RefError> {
        // Packed first, then loose overwrites: loose takes precedence.
        let mut merged: BTreeMap<RefName, Reference> = BTreeMap::new();

        let packed = PackedRefs::load(&self.git_dir)?;
        for pr in packed.iter() {
            merged.insert(
                pr.name.clone(),
                Reference::Hash {
                    name: pr.name.clone(),
                    target: pr.id,
                },
            );
        }

        for reference in loose::list(&self.git_dir)? {
            merged.insert(reference.name().clone(), reference);
        }

        if let Some(head) = loose::read(&self.git_dir, &RefName::new("HEAD")?)? {
            merged.insert(head.name().clone(), head);
        }

        Ok(merged.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_hash::ObjectId;

    fn id(n: u8) -> ObjectId {
        let mut raw = [0u8; 20];
        raw[19] = n;
        ObjectId::Sha1(raw)
    }

    fn store() -> (tempfile::TempDir, FilesRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn set_get_remove_roundtrip() {
        let (_dir, store) = store();
        let name = RefName::new("refs/heads/main").unwrap();
        let reference = Reference::hash(name.clone(), id(1));

        store.set(&reference).unwrap();
        assert_eq!(store.get(&name).unwrap(), Some(reference));

        store.remove(&name).unwrap();
        assert_eq!(store.get(&name).unwrap(), None);
        // Removing again is not an error.
        store.remove(&name).unwrap();
    }

    #[test]
    fn symbolic_head_resolves_through_branch() {
        let (_dir, store) = store();
        let head = RefName::new("HEAD").unwrap();
        let main = RefName::new("refs/heads/main").unwrap();

        store
            .set(&Reference::symbolic(head.clone(), main.clone()))
            .unwrap();
        // Unborn branch: HEAD exists but does not resolve.
        assert!(matches!(
            store.resolve(&head),
            Err(RefError::NotFound(_))
        ));

        store.set(&Reference::hash(main, id(7))).unwrap();
        assert_eq!(store.resolve(&head).unwrap(), id(7));
    }

    #[test]
    fn resolution_depth_is_bounded() {
        let (_dir, store) = store();
        // a -> b -> a cycle
        let a = RefName::new("refs/heads/a").unwrap();
        let b = RefName::new("refs/heads/b").unwrap();
        store
            .set(&Reference::symbolic(a.clone(), b.clone()))
            .unwrap();
        store.set(&Reference::symbolic(b, a.clone())).unwrap();

        assert!(matches!(
            store.resolve(&a),
            Err(RefError::MaxRefDepth(_))
        ));
    }

    #[test]
    fn cas_succeeds_on_match_fails_on_divergence() {
        let (_dir, store) = store();
        let name = RefName::new("refs/heads/main").unwrap();
        let v1 = Reference::hash(name.clone(), id(1));
        let v2 = Reference::hash(name.clone(), id(2));
        let v3 = Reference::hash(name.clone(), id(3));

        // Create: expected None.
        store.compare_and_set(&v1, None).unwrap();
        // Advance with correct expectation.
        store.compare_and_set(&v2, Some(&v1)).unwrap();
        // Stale expectation loses.
        assert!(matches!(
            store.compare_and_set(&v3, Some(&v1)),
            Err(RefError::ReferenceHasChanged(_))
        ));
        assert_eq!(store.get(&name).unwrap(), Some(v2));
        // Create over existing fails too.
        assert!(matches!(
            store.compare_and_set(&v3, None),
            Err(RefError::ReferenceHasChanged(_))
        ));
    }

    #[test]
    fn iter_merges_packed_and_loose_sorted() {
        let (dir, store) = store();
        std::fs::write(
            dir.path().join("packed-refs"),
            format!(
                "# pack-refs with: peeled fully-peeled sorted\n{} refs/heads/packed-only\n{} refs/heads/shadowed\n",
                id(10).to_hex(),
                id(11).to_hex()
            ),
        )
        .unwrap();

        store
            .set(&Reference::hash(
                RefName::new("refs/heads/shadowed").unwrap(),
                id(12),
            ))
            .unwrap();
        store
            .set(&Reference::hash(
                RefName::new("refs/tags/v1").unwrap(),
                id(13),
            ))
            .unwrap();
        store
            .set(&Reference::symbolic(
                RefName::new("HEAD").unwrap(),
                RefName::new("refs/heads/shadowed").unwrap(),
            ))
            .unwrap();

        let refs = store.iter().unwrap();
        let names: Vec<String> = refs.iter().map(|r| r.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "HEAD",
                "refs/heads/packed-only",
                "refs/heads/shadowed",
                "refs/tags/v1"
            ]
        );
        // Loose shadows packed.
        let shadowed = refs
            .iter()
            .find(|r| r.name().as_str() == "refs/heads/shadowed")
            .unwrap();
        assert_eq!(shadowed.target_id(), Some(id(12)));
    }

    #[test]
    fn remove_reaches_into_packed_refs() {
        let (dir, store) = store();
        std::fs::write(
            dir.path().join("packed-refs"),
            format!("{} refs/heads/packed\n", id(4).to_hex()),
        )
        .unwrap();

        let name = RefName::new("refs/heads/packed").unwrap();
        assert!(store.get(&name).unwrap().is_some());
        store.remove(&name).unwrap();
        assert!(store.get(&name).unwrap().is_none());
    }
}
