//! The `"{kind} {size}\0"` storage header shared by loose objects and
//! the object-id computation.

use crate::{ObjectError, ObjectKind};

/// Parse an object header from raw bytes.
///
/// Returns `(kind, content_size, header_length)` where `header_length`
/// includes the NUL terminator.
pub fn parse_header(data: &[u8]) -> Result<(ObjectKind, usize, usize), ObjectError> {
    let nul_pos = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing NUL terminator".into()))?;

    let header = &data[..nul_pos];
    let space_pos = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space in header".into()))?;

    let kind = ObjectKind::from_bytes(&header[..space_pos])?;

    let size_str = std::str::from_utf8(&header[space_pos + 1..])
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII size".into()))?;
    let content_size: usize = size_str
        .parse()
        .map_err(|_| ObjectError::InvalidHeader(format!("invalid size: {size_str}")))?;

    Ok((kind, content_size, nul_pos + 1))
}

/// Write an object header: `"{kind} {size}\0"`.
pub fn write_header(kind: ObjectKind, content_size: usize) -> Vec<u8> {
    format!("{} {}\0", kind, content_size).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blob_header() {
        let data = b"blob 12\0hello world!";
        let (kind, size, hdr_len) = parse_header(data).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(size, 12);
        assert_eq!(&data[hdr_len..], b"hello world!");
    }

    #[test]
    fn write_parse_roundtrip() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            let hdr = write_header(kind, 42);
            let (parsed, size, len) = parse_header(&hdr).unwrap();
            assert_eq!(parsed, kind);
            assert_eq!(size, 42);
            assert_eq!(len, hdr.len());
        }
    }

    #[test]
    fn malformed_headers() {
        assert!(parse_header(b"blob 12").is_err()); // no NUL
        assert!(parse_header(b"blob12\0").is_err()); // no space
        assert!(parse_header(b"widget 12\0").is_err()); // bad kind
        assert!(parse_header(b"blob twelve\0").is_err()); // bad size
    }
}
