//! Submodule resolution: `.gitmodules` data joined with the index's
//! gitlink entries.

use std::path::PathBuf;

use bstr::{BString, ByteSlice};
use grit_hash::ObjectId;
use grit_index::Stage;
use grit_object::FileMode;

use crate::config::SubmoduleConfig;
use crate::worktree::Worktree;
use crate::{init, RepoError};

/// One submodule: the recorded commit from the index plus the
/// `.gitmodules` block the caller parsed into [`SubmoduleConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Path relative to the superproject worktree.
    pub path: BString,
    /// The commit the superproject records (the gitlink entry).
    pub recorded: ObjectId,
    /// The configured URL, when `.gitmodules` has one.
    pub url: Option<String>,
    pub branch: Option<String>,
}

impl Worktree<'_> {
    /// The submodules of this worktree: every stage-0 gitlink entry,
    /// enriched with its configuration block.
    pub fn submodules(&self) -> Result<Vec<Submodule>, RepoError> {
        let index = self.repo.index()?;
        let mut out = Vec::new();

        for entry in index.entries() {
            if entry.stage != Stage::Normal || entry.mode != FileMode::Submodule {
                continue;
            }
            let path_str = entry.path.to_str_lossy();
            let config: Option<&SubmoduleConfig> = self.repo.config().submodule(&path_str);
            out.push(Submodule {
                path: entry.path.clone(),
                recorded: entry.id,
                url: config.map(|c| c.url.clone()),
                branch: config.and_then(|c| c.branch.clone()),
            });
        }
        Ok(out)
    }

    /// Initialize a submodule's nested repository: create the checkout
    /// directory and the standard `.git` layout inside it. Fetching the
    /// submodule's history is a separate, caller-driven step.
    pub fn submodule_init(&self, submodule: &Submodule) -> Result<PathBuf, RepoError> {
        let checkout = self.file_path(submodule.path.as_bstr());
        let git_dir = checkout.join(".git");
        std::fs::create_dir_all(&checkout)?;
        init(&git_dir, false)?;
        Ok(git_dir)
    }

    /// Is the submodule's working copy present (has its own `.git`)?
    pub fn submodule_initialized(&self, submodule: &Submodule) -> bool {
        self.file_path(submodule.path.as_bstr())
            .join(".git")
            .exists()
    }
}
