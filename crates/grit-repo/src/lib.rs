//! Repository assembly: the `.git` layout, worktree materialization,
//! status, staging, committing, and submodule resolution.
//!
//! A [`Repository`] owns the object store, the ref store, and the
//! structured configuration; operations borrow those pieces explicitly.
//! Single-process access to a repository path is the caller's
//! responsibility, as is cross-process `index.lock` etiquette beyond
//! what the library's own lock files provide.

pub mod config;
mod init;
mod stage;
mod status;
mod submodule;
mod worktree;

pub use config::{BranchConfig, Config, RemoteConfig, SubmoduleConfig};
pub use init::init;
pub use stage::{CommitOptions, NoSigner};
pub use status::{PathStatus, Status, StatusEntry};
pub use submodule::Submodule;
pub use worktree::{CheckoutMode, ResetMode, Worktree};

use std::path::{Path, PathBuf};

use grit_hash::HashFormat;
use grit_odb::Odb;
use grit_ref::{FilesRefStore, RefName, RefStore, Reference};

/// Errors from repository-level operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("unsupported repositoryformatversion: {0}")]
    UnsupportedFormatVersion(u32),

    #[error("unsupported object format: {0}")]
    UnsupportedObjectFormat(String),

    #[error("unknown repository extension: {0}")]
    UnknownExtension(String),

    #[error("worktree has local modifications; checkout would overwrite them")]
    DirtyWorktree,

    #[error("nothing to commit (use allow_empty to force)")]
    EmptyCommit,

    #[error("bare repository has no worktree")]
    BareRepository,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Index(#[from] grit_index::IndexError),

    #[error(transparent)]
    Ref(#[from] grit_ref::RefError),

    #[error(transparent)]
    Trie(#[from] grit_trie::TrieError),

    #[error(transparent)]
    Walk(#[from] grit_revwalk::WalkError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<grit_utils::UtilError> for RepoError {
    fn from(e: grit_utils::UtilError) -> Self {
        match e {
            grit_utils::UtilError::Canceled => RepoError::Canceled,
            grit_utils::UtilError::Io(io) => RepoError::Io(io),
            other => RepoError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// An open repository.
pub struct Repository {
    git_dir: PathBuf,
    work_dir: Option<PathBuf>,
    config: Config,
    format: HashFormat,
    odb: Odb,
    refs: FilesRefStore,
}

impl Repository {
    /// Open a repository from its `.git` directory (or a bare
    /// repository root) and its already-parsed configuration.
    ///
    /// Validation happens here: an unrecognized
    /// `repositoryformatversion` or extension refuses to open, and
    /// `extensions.objectformat` fixes the hash every subsystem uses.
    pub fn open(git_dir: impl AsRef<Path>, config: Config) -> Result<Self, RepoError> {
        let git_dir = git_dir.as_ref().to_path_buf();
        if !git_dir.join("objects").is_dir() || !git_dir.join("HEAD").is_file() {
            return Err(RepoError::NotARepository(git_dir));
        }

        let format = config.validate()?;
        let work_dir = if config.bare {
            None
        } else {
            match &config.worktree {
                Some(path) => Some(path.clone()),
                None => git_dir.parent().map(|p| p.to_path_buf()),
            }
        };

        let odb = Odb::open(git_dir.join("objects"), format)?;
        let refs = FilesRefStore::new(&git_dir);

        Ok(Self {
            git_dir,
            work_dir,
            config,
            format,
            odb,
            refs,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The worktree root; `None` for bare repositories.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn format(&self) -> HashFormat {
        self.format
    }

    pub fn odb(&self) -> &Odb {
        &self.odb
    }

    pub fn refs(&self) -> &FilesRefStore {
        &self.refs
    }

    /// The `.git/index` path.
    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    /// The `.git/shallow` path.
    pub fn shallow_path(&self) -> PathBuf {
        self.git_dir.join("shallow")
    }

    /// Read the staging index (empty when the file does not exist).
    pub fn index(&self) -> Result<grit_index::Index, RepoError> {
        Ok(grit_index::Index::read_or_empty(
            self.index_path(),
            self.format,
        )?)
    }

    /// The HEAD reference.
    pub fn head(&self) -> Result<Option<Reference>, RepoError> {
        Ok(self.refs.get(&RefName::new("HEAD")?)?)
    }

    /// HEAD resolved to a commit id; `None` on an unborn branch.
    pub fn head_id(&self) -> Result<Option<grit_hash::ObjectId>, RepoError> {
        match self.refs.resolve(&RefName::new("HEAD")?) {
            Ok(id) => Ok(Some(id)),
            Err(grit_ref::RefError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The worktree handle; fails for bare repositories.
    pub fn worktree(&self) -> Result<Worktree<'_>, RepoError> {
        match self.work_dir() {
            Some(root) => Ok(Worktree::new(self, root.to_path_buf())),
            None => Err(RepoError::BareRepository),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path(), Config::default()),
            Err(RepoError::NotARepository(_))
        ));
    }

    #[test]
    fn init_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        init(&git_dir, false).unwrap();

        let repo = Repository::open(&git_dir, Config::default()).unwrap();
        assert_eq!(repo.work_dir(), Some(dir.path()));
        assert_eq!(repo.format(), HashFormat::Sha1);

        // Fresh repository: symbolic HEAD to an unborn branch.
        let head = repo.head().unwrap().unwrap();
        assert!(head.is_symbolic());
        assert!(repo.head_id().unwrap().is_none());
    }

    #[test]
    fn bare_repository_has_no_worktree() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), true).unwrap();

        let config = Config {
            bare: true,
            ..Default::default()
        };
        let repo = Repository::open(dir.path(), config).unwrap();
        assert!(repo.work_dir().is_none());
        assert!(matches!(repo.worktree(), Err(RepoError::BareRepository)));
    }

    #[test]
    fn sha256_extension_switches_store_format() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        init(&git_dir, false).unwrap();

        let config = Config {
            repository_format_version: 1,
            extensions: vec![("objectformat".into(), "sha256".into())],
            ..Default::default()
        };
        let repo = Repository::open(&git_dir, config).unwrap();
        assert_eq!(repo.format(), HashFormat::Sha256);
        assert_eq!(repo.odb().format(), HashFormat::Sha256);
    }
}
