//! The `packed-refs` file.
//!
//! Format:
//!
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <hex-id> <refname>
//! ^<hex-id>            (peeled target of the annotated tag above)
//! ```

use std::fs;
use std::path::Path;

use bstr::ByteSlice;
use grit_hash::ObjectId;

use crate::error::RefError;
use crate::name::RefName;

/// One packed ref, with the peeled tag target when recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: RefName,
    pub id: ObjectId,
    /// For annotated tag refs: the commit the tag points at, so peeling
    /// needs no object read.
    pub peeled: Option<ObjectId>,
}

/// Parsed `packed-refs` content.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    refs: Vec<PackedRef>,
}

impl PackedRefs {
    /// Load from a git directory; a missing file is an empty set.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        let path = git_dir.join("packed-refs");
        match fs::read(&path) {
            Ok(data) => Self::parse(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(RefError::IoPath { path, source: e }),
        }
    }

    /// Parse packed-refs bytes.
    pub fn parse(data: &[u8]) -> Result<Self, RefError> {
        let mut refs: Vec<PackedRef> = Vec::new();

        for line in data.lines() {
            if line.is_empty() || line.starts_with(b"#") {
                continue;
            }

            if let Some(hex_bytes) = line.strip_prefix(b"^") {
                let hex = std::str::from_utf8(hex_bytes)
                    .map_err(|_| RefError::Parse("non-UTF8 peeled id".into()))?;
                let peeled = ObjectId::from_hex(hex.trim())?;
                let Some(last) = refs.last_mut() else {
                    return Err(RefError::Parse(
                        "peeled line without a preceding ref".into(),
                    ));
                };
                last.peeled = Some(peeled);
                continue;
            }

            let space = line
                .find_byte(b' ')
                .ok_or_else(|| RefError::Parse("malformed packed-refs line".into()))?;
            let hex = std::str::from_utf8(&line[..space])
                .map_err(|_| RefError::Parse("non-UTF8 packed-refs id".into()))?;
            let id = ObjectId::from_hex(hex)?;
            let name_str = std::str::from_utf8(&line[space + 1..])
                .map_err(|_| RefError::Parse("non-UTF8 packed-refs name".into()))?;
            refs.push(PackedRef {
                name: RefName::new(name_str.trim())?,
                id,
                peeled: None,
            });
        }

        Ok(Self { refs })
    }

    /// Serialize back to the on-disk format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"# pack-refs with: peeled fully-peeled sorted\n");
        let mut sorted: Vec<&PackedRef> = self.refs.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        for pr in sorted {
            out.extend_from_slice(format!("{} {}\n", pr.id.to_hex(), pr.name).as_bytes());
            if let Some(peeled) = pr.peeled {
                out.extend_from_slice(format!("^{}\n", peeled.to_hex()).as_bytes());
            }
        }
        out
    }

    pub fn find(&self, name: &RefName) -> Option<&PackedRef> {
        self.refs.iter().find(|pr| pr.name == *name)
    }

    /// Remove a ref; returns whether it was present.
    pub fn remove(&mut self, name: &RefName) -> bool {
        let before = self.refs.len();
        self.refs.retain(|pr| pr.name != *name);
        before != self.refs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackedRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"# pack-refs with: peeled fully-peeled sorted\n\
6ecf0ef2c2dffb796033e5a02219af86ec6584e5 refs/heads/master\n\
35e85108805c84807bc66a02d91535e1e24b38b9 refs/tags/v1.0.0\n\
^a5b8b09e2f8fcb0bb99d3ccb0958157b40890d69\n";

    #[test]
    fn parse_with_peeled_lines() {
        let packed = PackedRefs::parse(SAMPLE).unwrap();
        assert_eq!(packed.len(), 2);

        let tag = packed
            .find(&RefName::new("refs/tags/v1.0.0").unwrap())
            .unwrap();
        assert_eq!(
            tag.peeled.unwrap().to_hex(),
            "a5b8b09e2f8fcb0bb99d3ccb0958157b40890d69"
        );

        let branch = packed
            .find(&RefName::new("refs/heads/master").unwrap())
            .unwrap();
        assert!(branch.peeled.is_none());
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let packed = PackedRefs::parse(SAMPLE).unwrap();
        let reparsed = PackedRefs::parse(&packed.serialize()).unwrap();
        assert_eq!(packed.refs, reparsed.refs);
    }

    #[test]
    fn orphan_peeled_line_is_an_error() {
        assert!(PackedRefs::parse(b"^a5b8b09e2f8fcb0bb99d3ccb0958157b40890d69\n").is_err());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PackedRefs::load(dir.path()).unwrap().is_empty());
    }
}
