//! Shared plumbing for the grit workspace.
//!
//! Small, dependency-light pieces used by nearly every other crate:
//! identity/timestamp handling for commit and tag headers, the `.lock`
//! file protocol for atomic file replacement, and the cooperative
//! cancellation flag checked at blocking boundaries.

pub mod cancel;
pub mod error;
pub mod ident;
pub mod lockfile;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use cancel::CancelToken;
pub use error::{LockError, UtilError};
pub use ident::{Identity, When};

pub type Result<T> = std::result::Result<T, UtilError>;
