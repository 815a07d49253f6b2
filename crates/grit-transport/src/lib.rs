//! Transport layer: opaque bidirectional byte streams to a remote
//! git-upload-pack / git-receive-pack.
//!
//! The protocol code consumes the [`Transport`] trait and never
//! interprets URLs beyond scheme/host/path splitting. Concrete
//! transports: a spawned local service process for `file://` and plain
//! paths, an `ssh` subprocess, and the smart HTTP exchange.

pub mod daemon;
pub mod http;
pub mod local;
pub mod ssh;
mod url;

use std::io::{Read, Write};

/// Errors from transport setup and teardown.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Git URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ssh,
    Git,
    Http,
    Https,
    File,
    /// A bare local path with no scheme.
    Local,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Scheme::Ssh => "ssh",
            Scheme::Git => "git",
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::Local => "local",
        })
    }
}

/// A parsed git URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    pub scheme: Scheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub path: String,
}

/// The remote service a connection speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// `git-upload-pack`: fetch and clone.
    UploadPack,
    /// `git-receive-pack`: push.
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }
}

/// A connected bidirectional byte stream to a remote service.
///
/// Process-backed transports expose the child's pipes directly.
/// Stateless transports (HTTP) buffer writes; [`finish_request`]
/// (Transport::finish_request) marks the request boundary and makes the
/// response readable.
pub trait Transport: Send {
    /// The server's output.
    fn reader(&mut self) -> &mut dyn Read;

    /// The client's input to the server.
    fn writer(&mut self) -> &mut dyn Write;

    /// Mark the end of one request. Streaming transports flush; the
    /// HTTP transport performs the buffered POST here.
    fn finish_request(&mut self) -> Result<(), TransportError> {
        self.writer().flush()?;
        Ok(())
    }

    /// Close the stream, releasing the process/connection.
    fn close(self: Box<Self>) -> Result<(), TransportError>;

    /// Abort the connection without the usual shutdown handshake.
    fn cancel(&mut self) {}

    /// One request/response per exchange (HTTP)?
    fn is_stateless(&self) -> bool {
        false
    }
}

/// Open a transport for the URL and service.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    match url.scheme {
        Scheme::Ssh => ssh::connect(url, service),
        Scheme::Git => daemon::connect(url, service),
        Scheme::Http | Scheme::Https => http::connect(url, service),
        Scheme::File | Scheme::Local => local::connect(url, service),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names() {
        assert_eq!(Service::UploadPack.as_str(), "git-upload-pack");
        assert_eq!(Service::ReceivePack.as_str(), "git-receive-pack");
    }
}
