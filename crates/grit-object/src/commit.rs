use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;
use grit_utils::Identity;

use crate::ObjectError;

/// Which signature header a commit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    /// `gpgsig` header (SHA-1 object format).
    Gpg,
    /// `gpgsig-sha256` header.
    GpgSha256,
}

impl SignatureFormat {
    pub const fn header_name(&self) -> &'static [u8] {
        match self {
            Self::Gpg => b"gpgsig",
            Self::GpgSha256 => b"gpgsig-sha256",
        }
    }
}

/// A detached signature block embedded in a commit header.
///
/// Stored apart from the message so the commit can be re-encoded with or
/// without it; verification runs over the unsigned encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSignature {
    pub format: SignatureFormat,
    /// The armored signature, newlines unfolded.
    pub data: BString,
}

/// A git commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Id of the root tree.
    pub tree: ObjectId,
    /// Parent commit ids, in recorded order (empty for a root commit).
    pub parents: Vec<ObjectId>,
    pub author: Identity,
    pub committer: Identity,
    /// Optional `encoding` header (e.g. "ISO-8859-1").
    pub encoding: Option<BString>,
    /// Headers this codec has no structure for (`mergetag`, ...), with
    /// multi-line values unfolded; preserved for byte-exact round-trips.
    pub extra_headers: Vec<(BString, BString)>,
    /// Optional signature block.
    pub signature: Option<CommitSignature>,
    /// Message, verbatim, including any trailing blank lines.
    pub message: BString,
}

impl Commit {
    /// Parse commit content from raw bytes (no storage header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Identity> = None;
        let mut committer: Option<Identity> = None;
        let mut encoding: Option<BString> = None;
        let mut signature: Option<CommitSignature> = None;
        let mut extra_headers: Vec<(BString, BString)> = Vec::new();

        let data = content;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break;
            }
            // Blank line separates headers from the message.
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            let Some(space_pos) = line.find_byte(b' ') else {
                // Header line without a value; skip it.
                pos = line_end + 1;
                continue;
            };
            let key = &line[..space_pos];
            let value = &line[space_pos + 1..];

            match key {
                b"tree" => {
                    tree = Some(parse_oid(value)?);
                    pos = line_end + 1;
                }
                b"parent" => {
                    parents.push(parse_oid(value)?);
                    pos = line_end + 1;
                }
                b"author" => {
                    author = Some(Identity::parse(BStr::new(value)));
                    pos = line_end + 1;
                }
                b"committer" => {
                    committer = Some(Identity::parse(BStr::new(value)));
                    pos = line_end + 1;
                }
                b"encoding" => {
                    encoding = Some(BString::from(value));
                    pos = line_end + 1;
                }
                b"gpgsig" | b"gpgsig-sha256" => {
                    let format = if key == b"gpgsig" {
                        SignatureFormat::Gpg
                    } else {
                        SignatureFormat::GpgSha256
                    };
                    let (unfolded, next) = unfold_value(data, value, line_end);
                    signature = Some(CommitSignature {
                        format,
                        data: unfolded,
                    });
                    pos = next;
                }
                _ => {
                    // mergetag and friends: multi-line, space-continued.
                    let (unfolded, next) = unfold_value(data, value, line_end);
                    extra_headers.push((BString::from(key), unfolded));
                    pos = next;
                }
            }
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer
                .ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            encoding,
            extra_headers,
            signature,
            message: BString::from(&data[pos..]),
        })
    }

    /// Serialize commit content to bytes (no storage header).
    pub fn serialize_content(&self) -> Vec<u8> {
        self.serialize(true)
    }

    /// Serialize without the signature block.
    ///
    /// This is the payload a [`crate::sign::Verifier`] checks the detached
    /// signature against, and what a [`crate::sign::Signer`] signs.
    pub fn serialize_unsigned(&self) -> Vec<u8> {
        self.serialize(false)
    }

    fn serialize(&self, with_signature: bool) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        if let Some(ref enc) = self.encoding {
            out.extend_from_slice(b"encoding ");
            out.extend_from_slice(enc);
            out.push(b'\n');
        }

        for (key, val) in &self.extra_headers {
            fold_header(&mut out, key, val);
        }

        if with_signature {
            if let Some(ref sig) = self.signature {
                fold_header(&mut out, sig.format.header_name(), &sig.data);
            }
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// First parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// More than one parent?
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// The committer timestamp used for walk ordering.
    pub fn commit_time(&self) -> i64 {
        self.committer.when.seconds
    }

    /// The first line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }
}

fn parse_oid(value: &[u8]) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader("non-UTF8 object id".into()))?;
    Ok(ObjectId::from_hex(hex)?)
}

/// Collect a multi-line header value: continuation lines start with a
/// space. Returns the unfolded value and the position past its last line.
fn unfold_value(data: &[u8], first: &[u8], line_end: usize) -> (BString, usize) {
    let mut value = Vec::from(first);
    let mut next = line_end + 1;
    while next < data.len() && data[next] == b' ' {
        value.push(b'\n');
        let cont_end = data[next..]
            .find_byte(b'\n')
            .map(|p| p + next)
            .unwrap_or(data.len());
        value.extend_from_slice(&data[next + 1..cont_end]);
        next = cont_end + 1;
    }
    (BString::from(value), next)
}

/// Emit a multi-line header, folding embedded newlines into
/// space-continued lines.
fn fold_header(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    for (i, line) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.extend_from_slice(b"\n ");
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');
}
