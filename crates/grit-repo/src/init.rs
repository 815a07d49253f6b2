//! Repository initialization: the on-disk skeleton.

use std::fs;
use std::path::Path;

use grit_ref::{RefName, RefStore};

use crate::RepoError;

/// The branch a fresh HEAD points at.
const DEFAULT_BRANCH: &str = "master";

/// Create the standard repository layout at `git_dir`.
///
/// Writes `HEAD` (symbolic, unborn default branch), `objects/` with
/// `info` and `pack`, and `refs/{heads,tags}`. The `config` file is the
/// caller's to write — configuration is consumed as structured data,
/// not produced here. Initializing an existing repository is a no-op.
pub fn init(git_dir: impl AsRef<Path>, _bare: bool) -> Result<(), RepoError> {
    let git_dir = git_dir.as_ref();

    if git_dir.join("HEAD").exists() {
        return Ok(());
    }

    for dir in [
        "objects",
        "objects/info",
        "objects/pack",
        "refs",
        "refs/heads",
        "refs/tags",
        "info",
    ] {
        fs::create_dir_all(git_dir.join(dir))?;
    }

    let refs = grit_ref::FilesRefStore::new(git_dir);
    refs.set(&grit_ref::Reference::symbolic(
        RefName::new("HEAD")?,
        RefName::branch(DEFAULT_BRANCH)?,
    ))?;

    fs::write(git_dir.join("info/exclude"), b"")?;

    Ok(())
}
