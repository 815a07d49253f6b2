//! Ref advertisement parsing (v1).
//!
//! The first line carries a ref and, after a NUL, the capability set;
//! the rest are `<hex> <name>` lines; a flush ends it. Empty
//! repositories advertise the null id against the placeholder name
//! `capabilities^{}`. Smart-HTTP responses prefix a `# service=`
//! announcement section that is skipped here.

use bstr::{BString, ByteSlice};
use grit_hash::ObjectId;

use crate::capability::Capabilities;
use crate::pktline::{Pkt, PktReader};
use crate::ProtocolError;

/// The parsed ref advertisement.
#[derive(Debug, Default)]
pub struct Advertisement {
    /// Advertised refs in server order: `(id, name)`.
    pub refs: Vec<(ObjectId, BString)>,
    pub capabilities: Capabilities,
}

impl Advertisement {
    /// Parse an advertisement from the start of the response stream.
    pub fn parse<R: std::io::Read>(
        reader: &mut PktReader<R>,
    ) -> Result<Self, ProtocolError> {
        let mut first = reader.read_pkt()?;

        // Smart HTTP: "# service=git-upload-pack" then a flush, then the
        // real advertisement.
        if let Pkt::Data(ref data) = first {
            if data.starts_with(b"# service=") {
                match reader.read_pkt()? {
                    Pkt::Flush => {}
                    _ => {
                        return Err(ProtocolError::NegotiationFailed(
                            "missing flush after service announcement".into(),
                        ))
                    }
                }
                first = reader.read_pkt()?;
            }
        }

        let mut advert = Advertisement::default();

        let banner = match first {
            // An entirely empty advertisement (no capabilities line).
            Pkt::Flush => return Ok(advert),
            Pkt::Data(data) => data,
            _ => {
                return Err(ProtocolError::NegotiationFailed(
                    "unexpected packet at advertisement start".into(),
                ))
            }
        };

        // Banner: "<hex> <name>\0<capabilities>\n"
        let (ref_part, caps_part) = match banner.find_byte(0) {
            Some(nul) => (&banner[..nul], Some(&banner[nul + 1..])),
            None => (&banner[..], None),
        };
        if let Some(caps) = caps_part {
            let caps_str = std::str::from_utf8(caps)
                .map_err(|_| {
                    ProtocolError::NegotiationFailed("non-UTF8 capabilities".into())
                })?
                .trim_end();
            advert.capabilities = Capabilities::parse(caps_str);
        }
        push_ref_line(&mut advert.refs, ref_part)?;

        // Remaining ref lines until flush.
        loop {
            match reader.read_pkt()? {
                Pkt::Flush => break,
                Pkt::Data(line) => {
                    let text = match line.last() {
                        Some(b'\n') => &line[..line.len() - 1],
                        _ => &line[..],
                    };
                    push_ref_line(&mut advert.refs, text)?;
                }
                _ => {
                    return Err(ProtocolError::NegotiationFailed(
                        "unexpected packet in ref advertisement".into(),
                    ))
                }
            }
        }

        Ok(advert)
    }

    /// The advertised id of a ref, by exact name.
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.refs
            .iter()
            .find(|(_, n)| n.as_bstr() == name.as_bytes().as_bstr())
            .map(|(id, _)| *id)
    }

    /// The advertised HEAD, when present.
    pub fn head(&self) -> Option<ObjectId> {
        self.find("HEAD")
    }

    /// The branch HEAD points at, from the `symref=` capability.
    pub fn head_symref(&self) -> Option<String> {
        self.capabilities
            .symrefs()
            .into_iter()
            .find(|(from, _)| from == "HEAD")
            .map(|(_, to)| to)
    }

    /// True when the remote has no refs at all (a freshly initialized
    /// repository).
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

fn push_ref_line(
    refs: &mut Vec<(ObjectId, BString)>,
    line: &[u8],
) -> Result<(), ProtocolError> {
    let line = match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    };
    let space = line.find_byte(b' ').ok_or_else(|| {
        ProtocolError::NegotiationFailed(format!(
            "malformed ref line: {:?}",
            line.as_bstr()
        ))
    })?;

    let hex = std::str::from_utf8(&line[..space])
        .map_err(|_| ProtocolError::NegotiationFailed("non-UTF8 ref id".into()))?;
    let id = ObjectId::from_hex(hex)
        .map_err(|e| ProtocolError::NegotiationFailed(format!("bad ref id: {e}")))?;
    let name = BString::from(&line[space + 1..]);

    // The placeholder line of an empty repository advertises nothing.
    if name == "capabilities^{}" {
        return Ok(());
    }
    refs.push((id, name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::PktWriter;
    use std::io::Cursor;

    const HEAD_ID: &str = "6ecf0ef2c2dffb796033e5a02219af86ec6584e5";

    fn sample_advert(with_service_prefix: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = PktWriter::new(&mut buf);
        if with_service_prefix {
            writer.write_text("# service=git-upload-pack").unwrap();
            writer.write_flush().unwrap();
        }
        writer
            .write_pkt(
                format!(
                    "{HEAD_ID} HEAD\0multi_ack_detailed side-band-64k thin-pack \
ofs-delta shallow symref=HEAD:refs/heads/master agent=git/2.39.0\n"
                )
                .as_bytes(),
            )
            .unwrap();
        writer
            .write_text(&format!("{HEAD_ID} refs/heads/master"))
            .unwrap();
        writer
            .write_text(&format!(
                "35e85108805c84807bc66a02d91535e1e24b38b9 refs/tags/v1.0.0"
            ))
            .unwrap();
        writer.write_flush().unwrap();
        drop(writer);
        buf
    }

    #[test]
    fn parse_plain_advertisement() {
        let mut reader = PktReader::new(Cursor::new(sample_advert(false)));
        let advert = Advertisement::parse(&mut reader).unwrap();

        assert_eq!(advert.refs.len(), 3);
        assert_eq!(advert.head().unwrap().to_hex(), HEAD_ID);
        assert_eq!(
            advert.find("refs/heads/master").unwrap().to_hex(),
            HEAD_ID
        );
        assert_eq!(advert.head_symref().unwrap(), "refs/heads/master");
        assert!(advert.capabilities.has("thin-pack"));
    }

    #[test]
    fn parse_smart_http_advertisement() {
        let mut reader = PktReader::new(Cursor::new(sample_advert(true)));
        let advert = Advertisement::parse(&mut reader).unwrap();
        assert_eq!(advert.refs.len(), 3);
        assert!(advert.capabilities.has("side-band-64k"));
    }

    #[test]
    fn empty_repository_advertisement() {
        let mut buf = Vec::new();
        {
            let mut writer = PktWriter::new(&mut buf);
            writer
                .write_pkt(
                    b"0000000000000000000000000000000000000000 capabilities^{}\0report-status agent=git/2.39.0\n",
                )
                .unwrap();
            writer.write_flush().unwrap();
        }

        let mut reader = PktReader::new(Cursor::new(buf));
        let advert = Advertisement::parse(&mut reader).unwrap();
        assert!(advert.is_empty());
        assert!(advert.capabilities.has("report-status"));
    }

    #[test]
    fn malformed_ref_line_is_negotiation_failure() {
        let mut buf = Vec::new();
        {
            let mut writer = PktWriter::new(&mut buf);
            writer.write_pkt(b"garbage-without-space\n").unwrap();
            writer.write_flush().unwrap();
        }
        let mut reader = PktReader::new(Cursor::new(buf));
        assert!(matches!(
            Advertisement::parse(&mut reader),
            Err(ProtocolError::NegotiationFailed(_))
        ));
    }
}
