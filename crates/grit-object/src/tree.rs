use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use grit_hash::{HashFormat, ObjectId};

use crate::ObjectError;

/// File mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule commit reference (160000)
    Submodule,
    /// Subdirectory (040000)
    Dir,
    /// Anything else, preserved for round-trip.
    Unknown(u32),
}

impl FileMode {
    /// Parse from octal ASCII bytes (e.g. `b"100644"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o160000 => Self::Submodule,
            0o040000 => Self::Dir,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Submodule => 0o160000,
            Self::Dir => 0o40000,
            Self::Unknown(v) => *v,
        }
    }

    /// Octal ASCII as git writes it (no leading zero on directories).
    pub fn as_bytes(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }

    pub fn is_submodule(&self) -> bool {
        matches!(self, Self::Submodule)
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// A single entry in a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub id: ObjectId,
}

impl TreeEntry {
    /// Build an entry, validating the name: non-empty, no NUL, no `/`.
    pub fn new(
        mode: FileMode,
        name: impl Into<BString>,
        id: ObjectId,
    ) -> Result<Self, ObjectError> {
        let name = name.into();
        validate_entry_name(&name, 0)?;
        Ok(Self { mode, name, id })
    }

    /// Git's canonical tree order: byte-lexicographic with an implicit
    /// trailing `/` on directory names. "foo" (dir) therefore sorts after
    /// "foo.c" but also after "foo-bar".
    pub fn canonical_cmp(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        tree_name_compare(&a.name, a.mode.is_dir(), &b.name, b.mode.is_dir())
    }
}

fn validate_entry_name(name: &[u8], offset: usize) -> Result<(), ObjectError> {
    if name.is_empty() {
        return Err(ObjectError::InvalidTreeEntry {
            offset,
            reason: "empty entry name".into(),
        });
    }
    if name.contains(&0) || name.contains(&b'/') {
        return Err(ObjectError::InvalidTreeEntry {
            offset,
            reason: "entry name contains NUL or '/'".into(),
        });
    }
    Ok(())
}

/// Compare two entry names with the directory `/` fiction applied.
fn tree_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    let next = |name: &[u8], is_dir: bool| {
        if name.len() > min_len {
            name[min_len]
        } else if is_dir {
            b'/'
        } else {
            0
        }
    };
    next(name1, is_dir1).cmp(&next(name2, is_dir2))
}

/// A tree object: an ordered directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tree content from its binary form.
    ///
    /// Each entry is `<octal mode> <name>\0<raw id>`; the raw-id width
    /// comes from `format`. Entries are kept in file order — legacy trees
    /// exist whose order is plain byte-lexicographic rather than
    /// canonical, and both must decode.
    pub fn parse(content: &[u8], format: HashFormat) -> Result<Self, ObjectError> {
        let id_len = format.raw_len();
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let space_pos = content[pos..]
                .find_byte(b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;

            let mode = FileMode::from_bytes(&content[pos..space_pos]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "invalid mode".into(),
                }
            })?;

            let name_start = space_pos + 1;
            let nul_pos = content[name_start..]
                .find_byte(0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing NUL after name".into(),
                })?
                + name_start;

            let name = &content[name_start..nul_pos];
            validate_entry_name(name, name_start)?;

            let id_start = nul_pos + 1;
            if id_start + id_len > content.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: id_start,
                    reason: "truncated entry id".into(),
                });
            }
            let id = ObjectId::from_bytes(&content[id_start..id_start + id_len], format)?;

            entries.push(TreeEntry {
                mode,
                name: BString::from(name),
                id,
            });
            pos = id_start + id_len;
        }

        Ok(Self { entries })
    }

    /// Serialize tree content; entries are always written in canonical
    /// order regardless of the in-memory order.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(TreeEntry::canonical_cmp);

        let mut out = Vec::new();
        for entry in &sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    /// Sort entries in place into canonical order.
    pub fn sort(&mut self) {
        self.entries.sort_by(TreeEntry::canonical_cmp);
    }

    /// Look up an entry by name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: FileMode, name: &str) -> TreeEntry {
        TreeEntry {
            mode,
            name: BString::from(name),
            id: ObjectId::ZERO_SHA1,
        }
    }

    #[test]
    fn mode_parse_and_roundtrip() {
        assert_eq!(FileMode::from_bytes(b"100644").unwrap(), FileMode::Regular);
        assert_eq!(
            FileMode::from_bytes(b"100755").unwrap(),
            FileMode::Executable
        );
        assert_eq!(FileMode::from_bytes(b"120000").unwrap(), FileMode::Symlink);
        assert_eq!(
            FileMode::from_bytes(b"160000").unwrap(),
            FileMode::Submodule
        );
        assert_eq!(FileMode::from_bytes(b"40000").unwrap(), FileMode::Dir);
        for mode in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Submodule,
            FileMode::Dir,
        ] {
            assert_eq!(FileMode::from_bytes(&mode.as_bytes()).unwrap(), mode);
        }
    }

    #[test]
    fn dir_sorts_with_virtual_slash() {
        // "foo/" > "foo.c" because '/' (0x2f) > '.' (0x2e)
        assert_eq!(
            TreeEntry::canonical_cmp(
                &entry(FileMode::Dir, "foo"),
                &entry(FileMode::Regular, "foo.c")
            ),
            Ordering::Greater
        );
        // "foo/" > "foo-bar"
        assert_eq!(
            TreeEntry::canonical_cmp(
                &entry(FileMode::Dir, "foo"),
                &entry(FileMode::Regular, "foo-bar")
            ),
            Ordering::Greater
        );
        // Regular file "foo" < "foo.c"
        assert_eq!(
            TreeEntry::canonical_cmp(
                &entry(FileMode::Regular, "foo"),
                &entry(FileMode::Regular, "foo.c")
            ),
            Ordering::Less
        );
    }

    #[test]
    fn parse_empty() {
        assert!(Tree::parse(b"", HashFormat::Sha1).unwrap().is_empty());
    }

    #[test]
    fn parse_single_entry() {
        let id = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 hello.txt\0");
        data.extend_from_slice(id.as_bytes());

        let tree = Tree::parse(&data, HashFormat::Sha1).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.entries[0].mode, FileMode::Regular);
        assert_eq!(tree.entries[0].name, "hello.txt");
        assert_eq!(tree.entries[0].id, id);
    }

    #[test]
    fn parse_sha256_entry_width() {
        let id = grit_hash::HashFormat::Sha256.zero();
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 a\0");
        data.extend_from_slice(id.as_bytes());

        let tree = Tree::parse(&data, HashFormat::Sha256).unwrap();
        assert_eq!(tree.entries[0].id.format(), HashFormat::Sha256);
    }

    #[test]
    fn legacy_order_is_tolerated_and_canonicalized() {
        // byte-lexicographic order puts dir "foo" before "foo.c"; canonical
        // order is the other way around. Parsing keeps file order; the
        // re-encode sorts canonically.
        let id = ObjectId::ZERO_SHA1;
        let mut legacy = Vec::new();
        legacy.extend_from_slice(b"40000 foo\0");
        legacy.extend_from_slice(id.as_bytes());
        legacy.extend_from_slice(b"100644 foo.c\0");
        legacy.extend_from_slice(id.as_bytes());

        let tree = Tree::parse(&legacy, HashFormat::Sha1).unwrap();
        assert_eq!(tree.entries[0].name, "foo");

        let canonical = tree.serialize_content();
        let reread = Tree::parse(&canonical, HashFormat::Sha1).unwrap();
        assert_eq!(reread.entries[0].name, "foo.c");
        assert_eq!(reread.entries[1].name, "foo");
        // Sorting is idempotent on the canonical form.
        assert_eq!(reread.serialize_content(), canonical);
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(TreeEntry::new(FileMode::Regular, "", ObjectId::ZERO_SHA1).is_err());
        assert!(TreeEntry::new(FileMode::Regular, "a/b", ObjectId::ZERO_SHA1).is_err());
        assert!(TreeEntry::new(FileMode::Regular, &b"a\0b"[..], ObjectId::ZERO_SHA1).is_err());
        assert!(TreeEntry::new(FileMode::Regular, "ok.txt", ObjectId::ZERO_SHA1).is_ok());
    }

    #[test]
    fn find_by_name() {
        let tree = Tree {
            entries: vec![
                entry(FileMode::Regular, "README.md"),
                entry(FileMode::Dir, "src"),
            ],
        };
        assert!(tree.find(BStr::new("README.md")).is_some());
        assert!(tree.find(BStr::new("missing")).is_none());
    }

    #[test]
    fn truncated_id_is_an_error() {
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 f\0shortid");
        assert!(matches!(
            Tree::parse(&data, HashFormat::Sha1),
            Err(ObjectError::InvalidTreeEntry { .. })
        ));
    }
}
