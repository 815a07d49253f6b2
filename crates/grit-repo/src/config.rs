//! Structured repository configuration.
//!
//! INI parsing belongs to the caller; this module only defines the
//! shape the library consumes and the open-time validation of
//! `core.repositoryformatversion` and `extensions.*`.

use grit_hash::HashFormat;
use std::path::PathBuf;

use crate::RepoError;

/// Configuration for one remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    pub url: String,
    /// `remote.<name>.fetch` refspecs.
    pub fetch: Vec<String>,
    /// `remote.<name>.push` refspecs.
    pub push: Vec<String>,
}

/// Configuration for one branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchConfig {
    pub name: String,
    /// `branch.<name>.remote`.
    pub remote: Option<String>,
    /// `branch.<name>.merge` (upstream ref name).
    pub merge: Option<String>,
}

/// One `submodule.<path>.*` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmoduleConfig {
    pub path: String,
    pub url: String,
    pub branch: Option<String>,
}

/// The structured repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `core.repositoryformatversion`.
    pub repository_format_version: u32,
    /// `core.filemode`: record the executable bit from the filesystem.
    pub filemode: bool,
    /// `core.bare`.
    pub bare: bool,
    /// `core.worktree` override.
    pub worktree: Option<PathBuf>,
    /// `extensions.*` entries as `(name, value)`, lowercase names.
    pub extensions: Vec<(String, String)>,
    pub remotes: Vec<RemoteConfig>,
    pub branches: Vec<BranchConfig>,
    pub submodules: Vec<SubmoduleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository_format_version: 0,
            filemode: true,
            bare: false,
            worktree: None,
            extensions: Vec::new(),
            remotes: Vec::new(),
            branches: Vec::new(),
            submodules: Vec::new(),
        }
    }
}

impl Config {
    /// Validate format version and extensions; returns the object hash
    /// format the repository uses.
    ///
    /// With `repositoryformatversion >= 1`, any extension this library
    /// does not understand fails the open. `objectformat` selects the
    /// hash; `noop` is accepted and ignored.
    pub fn validate(&self) -> Result<HashFormat, RepoError> {
        if self.repository_format_version > 1 {
            return Err(RepoError::UnsupportedFormatVersion(
                self.repository_format_version,
            ));
        }

        let mut format = HashFormat::Sha1;
        for (name, value) in &self.extensions {
            match name.as_str() {
                "objectformat" => {
                    format = HashFormat::from_name(value).ok_or_else(|| {
                        RepoError::UnsupportedObjectFormat(value.clone())
                    })?;
                }
                "noop" => {}
                other => {
                    if self.repository_format_version >= 1 {
                        return Err(RepoError::UnknownExtension(other.to_string()));
                    }
                    // Version 0 ignores unknown extensions, as git does.
                }
            }
        }
        Ok(format)
    }

    pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
        self.remotes.iter().find(|r| r.name == name)
    }

    pub fn branch(&self, name: &str) -> Option<&BranchConfig> {
        self.branches.iter().find(|b| b.name == name)
    }

    pub fn submodule(&self, path: &str) -> Option<&SubmoduleConfig> {
        self.submodules.iter().find(|s| s.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates_to_sha1() {
        assert_eq!(Config::default().validate().unwrap(), HashFormat::Sha1);
    }

    #[test]
    fn objectformat_extension_selects_sha256() {
        let config = Config {
            repository_format_version: 1,
            extensions: vec![("objectformat".into(), "sha256".into())],
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap(), HashFormat::Sha256);
    }

    #[test]
    fn unknown_objectformat_fails() {
        let config = Config {
            repository_format_version: 1,
            extensions: vec![("objectformat".into(), "md5".into())],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RepoError::UnsupportedObjectFormat(v)) if v == "md5"
        ));
    }

    #[test]
    fn unknown_extension_fails_with_v1() {
        let config = Config {
            repository_format_version: 1,
            extensions: vec![("worktreeconfig".into(), "true".into())],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RepoError::UnknownExtension(name)) if name == "worktreeconfig"
        ));
    }

    #[test]
    fn unknown_extension_tolerated_with_v0() {
        let config = Config {
            repository_format_version: 0,
            extensions: vec![("somethingelse".into(), "1".into())],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn noop_extension_accepted() {
        let config = Config {
            repository_format_version: 1,
            extensions: vec![("noop".into(), "1".into())],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn format_version_2_rejected() {
        let config = Config {
            repository_format_version: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RepoError::UnsupportedFormatVersion(2))
        ));
    }

    #[test]
    fn lookups_by_name() {
        let config = Config {
            remotes: vec![RemoteConfig {
                name: "origin".into(),
                url: "https://example.com/r.git".into(),
                fetch: vec!["+refs/heads/*:refs/remotes/origin/*".into()],
                push: Vec::new(),
            }],
            branches: vec![BranchConfig {
                name: "main".into(),
                remote: Some("origin".into()),
                merge: Some("refs/heads/main".into()),
            }],
            ..Default::default()
        };
        assert!(config.remote("origin").is_some());
        assert!(config.remote("upstream").is_none());
        assert_eq!(
            config.branch("main").unwrap().merge.as_deref(),
            Some("refs/heads/main")
        );
    }
}
