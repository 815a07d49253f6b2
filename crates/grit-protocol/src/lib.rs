//! The git v1 smart protocol, client side.
//!
//! Pkt-line framing, capability negotiation, side-band demultiplexing,
//! ref advertisements, the upload-pack (fetch) exchange, and the
//! receive-pack (push) exchange. Wire formats are bit-exact to upstream
//! git's v1 protocol; v2 is out of scope.

pub mod advert;
pub mod capability;
pub mod fetch;
pub mod pktline;
pub mod push;
pub mod shallow;
pub mod sideband;

pub use advert::Advertisement;
pub use capability::{Capabilities, SidebandMode};
pub use shallow::ShallowSet;

/// Errors from protocol exchanges.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("capability not supported by server: {0}")]
    UnknownCapability(String),

    #[error("remote error: {0}")]
    ServerError(String),

    #[error("push rejected ({reference}): non-fast-forward")]
    NonFastForward { reference: String },

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Transport(#[from] grit_transport::TransportError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] grit_ref::RefError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<grit_utils::UtilError> for ProtocolError {
    fn from(e: grit_utils::UtilError) -> Self {
        match e {
            grit_utils::UtilError::Canceled => ProtocolError::Canceled,
            grit_utils::UtilError::Io(io) => ProtocolError::Io(io),
            other => ProtocolError::NegotiationFailed(other.to_string()),
        }
    }
}
