//! Pkt-line framing.
//!
//! Every packet is a 4-hex-digit length (counting the length field
//! itself) followed by the payload. Lengths 0–2 are markers, not data:
//! `0000` flush, `0001` delimiter, `0002` response-end. Text lines carry
//! a trailing LF on the wire, counted in the length; readers strip it on
//! request.

use std::io::{Read, Write};

use crate::ProtocolError;

/// Maximum payload per packet (65520 total − 4 header).
pub const MAX_PKT_PAYLOAD: usize = 65516;

/// One received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkt {
    /// A data packet.
    Data(Vec<u8>),
    /// `0000` — section terminator.
    Flush,
    /// `0001` — delimiter (protocol v2; tolerated, never sent).
    Delimiter,
    /// `0002` — response end (protocol v2; tolerated, never sent).
    ResponseEnd,
}

impl Pkt {
    /// The payload with one trailing LF stripped, for text-mode lines.
    pub fn as_text(&self) -> Option<&[u8]> {
        match self {
            Pkt::Data(data) => Some(match data.last() {
                Some(b'\n') => &data[..data.len() - 1],
                _ => data,
            }),
            _ => None,
        }
    }
}

/// Pkt-line reader over any byte stream.
pub struct PktReader<R> {
    inner: R,
}

impl<R: Read> PktReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read one packet.
    pub fn read_pkt(&mut self) -> Result<Pkt, ProtocolError> {
        let mut len_buf = [0u8; 4];
        self.inner.read_exact(&mut len_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::InvalidPktLine("unexpected EOF in length field".into())
            } else {
                ProtocolError::Io(e)
            }
        })?;

        let len_str = std::str::from_utf8(&len_buf).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("non-hex length bytes: {len_buf:?}"))
        })?;
        let len = usize::from_str_radix(len_str, 16).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("invalid length: {len_str:?}"))
        })?;

        match len {
            0 => Ok(Pkt::Flush),
            1 => Ok(Pkt::Delimiter),
            2 => Ok(Pkt::ResponseEnd),
            3 => Err(ProtocolError::InvalidPktLine(
                "length 3 is invalid (minimum data packet is 4)".into(),
            )),
            _ => {
                let payload_len = len - 4;
                if payload_len > MAX_PKT_PAYLOAD {
                    return Err(ProtocolError::InvalidPktLine(format!(
                        "packet too long: {payload_len} bytes"
                    )));
                }
                let mut payload = vec![0u8; payload_len];
                self.inner.read_exact(&mut payload)?;
                Ok(Pkt::Data(payload))
            }
        }
    }

    /// Read one text line (LF stripped). `None` on flush.
    pub fn read_text_line(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        match self.read_pkt()? {
            Pkt::Flush | Pkt::Delimiter | Pkt::ResponseEnd => Ok(None),
            pkt => Ok(pkt.as_text().map(|t| t.to_vec())),
        }
    }

    /// Collect data packets until a flush.
    pub fn read_until_flush(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut lines = Vec::new();
        while let Pkt::Data(data) = self.read_pkt()? {
            lines.push(data);
        }
        Ok(lines)
    }
}

/// Pkt-line writer over any byte stream.
pub struct PktWriter<W> {
    inner: W,
}

impl<W: Write> PktWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write one data packet exactly as given.
    pub fn write_pkt(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.len() > MAX_PKT_PAYLOAD {
            return Err(ProtocolError::InvalidPktLine(format!(
                "payload too long for one packet: {} bytes (max {})",
                payload.len(),
                MAX_PKT_PAYLOAD
            )));
        }
        write!(self.inner, "{:04x}", payload.len() + 4)?;
        self.inner.write_all(payload)?;
        Ok(())
    }

    /// Write a text line; the trailing LF is added when missing and is
    /// counted in the length, as upstream git frames text lines.
    pub fn write_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        if text.ends_with('\n') {
            self.write_pkt(text.as_bytes())
        } else {
            let mut payload = Vec::with_capacity(text.len() + 1);
            payload.extend_from_slice(text.as_bytes());
            payload.push(b'\n');
            self.write_pkt(&payload)
        }
    }

    /// `0000`.
    pub fn write_flush(&mut self) -> Result<(), ProtocolError> {
        self.inner.write_all(b"0000")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.inner.flush()?;
        Ok(())
    }
}
