use std::path::PathBuf;

/// Errors from reference operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("reference not found: {0}")]
    NotFound(String),

    #[error("reference has changed concurrently: {0}")]
    ReferenceHasChanged(String),

    #[error("max ref resolution depth exceeded at: {0}")]
    MaxRefDepth(String),

    #[error("invalid refspec: {0}")]
    InvalidRefSpec(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("lock file error: {0}")]
    Lock(#[from] grit_utils::LockError),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

impl From<grit_utils::UtilError> for RefError {
    fn from(e: grit_utils::UtilError) -> Self {
        match e {
            grit_utils::UtilError::Lock(lock) => RefError::Lock(lock),
            grit_utils::UtilError::Io(io) => RefError::Io(io),
            other => RefError::Parse(other.to_string()),
        }
    }
}
