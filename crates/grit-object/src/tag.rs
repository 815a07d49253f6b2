use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;
use grit_utils::Identity;

use crate::{ObjectError, ObjectKind};

/// An annotated tag object.
///
/// Lightweight tags are plain refs and never reach this codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Id of the tagged object.
    pub target: ObjectId,
    /// Kind of the tagged object.
    pub target_kind: ObjectKind,
    /// Tag name.
    pub name: BString,
    /// Tagger identity (missing on some ancient tags).
    pub tagger: Option<Identity>,
    /// Tag message, signature excluded.
    pub message: BString,
    /// Trailing armored signature, if any.
    pub signature: Option<BString>,
}

impl Tag {
    /// Parse tag content from raw bytes (no storage header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut target: Option<ObjectId> = None;
        let mut target_kind: Option<ObjectKind> = None;
        let mut name: Option<BString> = None;
        let mut tagger: Option<Identity> = None;

        let data = content;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break;
            }
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            if let Some(space_pos) = line.find_byte(b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];

                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF8 target id".into())
                        })?;
                        target = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => {
                        target_kind = Some(ObjectKind::from_bytes(value)?);
                    }
                    b"tag" => {
                        name = Some(BString::from(value));
                    }
                    b"tagger" => {
                        tagger = Some(Identity::parse(BStr::new(value)));
                    }
                    _ => {}
                }
            }

            pos = line_end + 1;
        }

        // The signature, when present, is the armored block at the end of
        // the message body.
        let remaining = &data[pos..];
        let sig_start = remaining
            .find(b"-----BEGIN PGP SIGNATURE-----")
            .or_else(|| remaining.find(b"-----BEGIN SSH SIGNATURE-----"));
        let (message, signature) = match sig_start {
            Some(start) => (
                BString::from(&remaining[..start]),
                Some(BString::from(&remaining[start..])),
            ),
            None => (BString::from(remaining), None),
        };

        Ok(Self {
            target: target.ok_or(ObjectError::MissingTagField { field: "object" })?,
            target_kind: target_kind.ok_or(ObjectError::MissingTagField { field: "type" })?,
            name: name.ok_or(ObjectError::MissingTagField { field: "tag" })?,
            tagger,
            message,
            signature,
        })
    }

    /// Serialize tag content (no storage header), signature included.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.target.to_hex().as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_kind.as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');

        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        if let Some(ref sig) = self.signature {
            out.extend_from_slice(sig);
        }
        out
    }

    /// The payload a verifier checks the signature against.
    pub fn serialize_unsigned(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        unsigned.serialize_content()
    }
}
