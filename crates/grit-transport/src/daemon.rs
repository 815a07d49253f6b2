//! `git://` daemon transport over a plain TCP connection.
//!
//! The daemon protocol opens with one pkt-line request
//! (`git-upload-pack /path\0host=example.com\0`) and then speaks the
//! same byte stream as every other transport.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::{GitUrl, Service, Transport, TransportError};

const DEFAULT_GIT_PORT: u16 = 9418;

pub struct DaemonTransport {
    reader: TcpStream,
    writer: TcpStream,
}

impl Transport for DaemonTransport {
    fn reader(&mut self) -> &mut dyn Read {
        &mut self.reader
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.writer.shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }

    fn cancel(&mut self) {
        let _ = self.writer.shutdown(std::net::Shutdown::Both);
    }
}

/// Connect to a git daemon and issue the service request line.
pub fn connect(url: &GitUrl, service: Service) -> Result<Box<dyn Transport>, TransportError> {
    let host = url
        .host
        .as_deref()
        .ok_or_else(|| TransportError::InvalidUrl("git:// URL requires a host".into()))?;
    let port = url.port.unwrap_or(DEFAULT_GIT_PORT);

    let stream = TcpStream::connect((host, port)).map_err(|e| {
        TransportError::ConnectionFailed(format!("connect {host}:{port}: {e}"))
    })?;
    let mut writer = stream
        .try_clone()
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    // The opening request is itself pkt-line framed.
    let payload = format!("{} {}\0host={}\0", service.as_str(), url.path, host);
    let pkt = format!("{:04x}{}", payload.len() + 4, payload);
    writer.write_all(pkt.as_bytes())?;
    writer.flush()?;

    Ok(Box::new(DaemonTransport {
        reader: stream,
        writer,
    }))
}
