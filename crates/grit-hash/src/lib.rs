//! Object identity for the grit workspace.
//!
//! Provides [`ObjectId`] (a fixed-width content hash, SHA-1 or SHA-256),
//! the [`HashFormat`] selector, hex encoding/decoding, and the streaming
//! [`hasher::Hasher`] used to compute object ids from
//! `"{kind} {len}\0{content}"`.

mod error;
mod format;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use format::HashFormat;
pub use oid::ObjectId;
