//! Side-band demultiplexing.
//!
//! When negotiated, the server multiplexes three channels over one
//! pkt-line stream: 1 = pack data, 2 = progress text, 3 = fatal error.
//! A channel-3 message aborts the transfer with the server's words.

use std::io::Read;

use crate::pktline::{Pkt, PktReader};
use crate::ProtocolError;

/// Side-band channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Data = 1,
    Progress = 2,
    Error = 3,
}

/// Receives progress (channel 2) text as it arrives.
pub type ProgressFn<'a> = &'a mut dyn FnMut(&[u8]);

/// Demultiplexer over a pkt-line stream.
pub struct SidebandReader<'a, R> {
    reader: PktReader<R>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, R: Read> SidebandReader<'a, R> {
    pub fn new(reader: PktReader<R>) -> Self {
        Self {
            reader,
            progress: None,
        }
    }

    /// Surface channel-2 messages through `progress`.
    pub fn with_progress(mut self, progress: ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Next chunk of channel-1 data; `None` at the flush packet.
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        loop {
            match self.reader.read_pkt()? {
                Pkt::Flush | Pkt::Delimiter | Pkt::ResponseEnd => return Ok(None),
                Pkt::Data(data) => {
                    if data.is_empty() {
                        return Ok(None);
                    }
                    let payload = &data[1..];
                    match data[0] {
                        1 => return Ok(Some(payload.to_vec())),
                        2 => {
                            if let Some(progress) = self.progress.as_mut() {
                                progress(payload);
                            }
                        }
                        3 => {
                            return Err(ProtocolError::ServerError(
                                String::from_utf8_lossy(payload).trim_end().to_string(),
                            ))
                        }
                        band => {
                            return Err(ProtocolError::NegotiationFailed(format!(
                                "unknown side-band channel {band}"
                            )))
                        }
                    }
                }
            }
        }
    }

    /// Copy all channel-1 data into `out` until flush.
    pub fn copy_data_to(&mut self, out: &mut dyn std::io::Write) -> Result<u64, ProtocolError> {
        let mut total = 0u64;
        while let Some(chunk) = self.read_data()? {
            out.write_all(&chunk)?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }

    pub fn into_inner(self) -> PktReader<R> {
        self.reader
    }
}
