//! The shallow set: commits at which local history is truncated.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use grit_hash::ObjectId;
use grit_utils::lockfile::LockFile;

use crate::ProtocolError;

/// The set of shallow-boundary commits (`.git/shallow`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShallowSet {
    commits: HashSet<ObjectId>,
}

impl ShallowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a `shallow` file; a missing file is the empty set.
    pub fn load(path: &Path) -> Result<Self, ProtocolError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(e) => return Err(e.into()),
        };

        let mut commits = HashSet::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            commits.insert(ObjectId::from_hex(line)?);
        }
        Ok(Self { commits })
    }

    /// Persist; an empty set removes the file.
    pub fn store(&self, path: &Path) -> Result<(), ProtocolError> {
        if self.commits.is_empty() {
            match std::fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }

        let mut sorted: Vec<&ObjectId> = self.commits.iter().collect();
        sorted.sort();

        let mut lock = LockFile::acquire(path)?;
        for id in sorted {
            writeln!(lock, "{}", id.to_hex())?;
        }
        lock.commit()?;
        Ok(())
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.commits.contains(id)
    }

    pub fn insert(&mut self, id: ObjectId) {
        self.commits.insert(id);
    }

    /// Unshallow: the commit's parents became visible.
    pub fn remove(&mut self, id: &ObjectId) {
        self.commits.remove(id);
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.commits.iter()
    }

    /// Sorted ids, for deterministic emission.
    pub fn sorted(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.commits.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn as_set(&self) -> &HashSet<ObjectId> {
        &self.commits
    }
}
