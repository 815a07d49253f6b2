//! Loose refs: one file per ref under the git directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use grit_utils::lockfile::LockFile;

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

/// The on-disk path of a ref (`HEAD`, `refs/heads/main`, ...).
pub(crate) fn ref_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

/// Read one loose ref. `Ok(None)` when absent.
pub(crate) fn read(git_dir: &Path, name: &RefName) -> Result<Option<Reference>, RefError> {
    let path = ref_path(git_dir, name);
    let content = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RefError::IoPath {
                path,
                source: e,
            })
        }
    };
    Reference::from_file_content(name.clone(), &content).map(Some)
}

/// Write one loose ref atomically through its lock file.
pub(crate) fn write(git_dir: &Path, reference: &Reference) -> Result<(), RefError> {
    let path = ref_path(git_dir, reference.name());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RefError::IoPath {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut lock = LockFile::acquire(&path)?;
    lock.write_all(reference.to_file_content().as_bytes())
        .map_err(|e| RefError::IoPath {
            path: path.clone(),
            source: e,
        })?;
    lock.commit()?;
    Ok(())
}

/// Delete one loose ref and any directories it leaves empty.
pub(crate) fn delete(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    let path = ref_path(git_dir, name);
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(&path).map_err(|e| RefError::IoPath {
        path: path.clone(),
        source: e,
    })?;

    let refs_dir = git_dir.join("refs");
    let mut dir = path.parent().map(|p| p.to_path_buf());
    while let Some(d) = dir {
        if d == refs_dir || d == *git_dir {
            break;
        }
        if d.read_dir().map(|mut e| e.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&d);
            dir = d.parent().map(|p| p.to_path_buf());
        } else {
            break;
        }
    }
    Ok(())
}

/// Enumerate all loose refs under `refs/`.
pub(crate) fn list(git_dir: &Path) -> Result<Vec<Reference>, RefError> {
    let refs_dir = git_dir.join("refs");
    let mut found = Vec::new();
    if refs_dir.is_dir() {
        walk(&refs_dir, git_dir, &mut found)?;
    }
    Ok(found)
}

fn walk(dir: &Path, git_dir: &Path, found: &mut Vec<Reference>) -> Result<(), RefError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(&path, git_dir, found)?;
            continue;
        }
        let rel = path
            .strip_prefix(git_dir)
            .expect("walk stays under git_dir");
        let Some(rel_str) = rel.to_str() else {
            continue;
        };
        // Skip locks and anything else that is not a valid ref name.
        let Ok(name) = RefName::new(rel_str.replace('\\', "/")) else {
            continue;
        };
        if let Some(reference) = read(git_dir, &name)? {
            found.push(reference);
        }
    }
    Ok(())
}
