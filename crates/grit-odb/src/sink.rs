//! Atomic pack installation.
//!
//! A received packfile streams into a temp file inside `objects/pack`.
//! On commit the bytes are parsed and fully verified (trailer hash,
//! entry CRCs, delta resolution — thin-pack bases pulled from the rest
//! of the store), the v2 index is built, and only then are
//! `pack-<checksum>.pack` / `.idx` renamed into place. Anything short of
//! that leaves no trace: a partially consumed pack is never persisted.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use grit_hash::ObjectId;
use grit_object::ObjectKind;
use grit_pack::index_write;
use grit_pack::parse::PackParser;
use grit_utils::CancelToken;

use crate::{Odb, OdbError};

/// Streaming sink for one incoming packfile.
pub struct PackSink<'a> {
    odb: &'a Odb,
    tmp_path: PathBuf,
    file: Option<fs::File>,
    committed: bool,
}

/// Outcome of installing a pack.
#[derive(Debug)]
pub struct InstalledPack {
    /// The pack's trailing hash (also its file name stem).
    pub checksum: ObjectId,
    pub pack_path: PathBuf,
    pub object_count: usize,
}

impl<'a> PackSink<'a> {
    pub(crate) fn new(odb: &'a Odb) -> Result<Self, OdbError> {
        let pack_dir = odb.objects_dir().join("pack");
        fs::create_dir_all(&pack_dir)?;
        let tmp_path = pack_dir.join(format!("tmp_pack_{}", std::process::id()));
        let file = fs::File::create(&tmp_path)?;
        Ok(Self {
            odb,
            tmp_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Verify and install the spooled pack.
    ///
    /// Returns [`InstalledPack`] on success. An empty spool (the server
    /// had nothing to send) succeeds with a zero-object result and
    /// installs nothing.
    pub fn commit(mut self, cancel: &CancelToken) -> Result<InstalledPack, OdbError> {
        let mut file = self.file.take().expect("commit called once");
        file.flush()?;
        file.sync_all()?;
        drop(file);

        let bytes = fs::read(&self.tmp_path)?;
        if bytes.is_empty() {
            fs::remove_file(&self.tmp_path)?;
            self.committed = true;
            return Ok(InstalledPack {
                checksum: self.odb.format().zero(),
                pack_path: PathBuf::new(),
                object_count: 0,
            });
        }

        let parser = PackParser::new(&bytes, self.odb.format())?;
        let checksum = parser.checksum();

        // Thin-pack fixup: bases the pack lacks must already be local.
        let resolve = |base: &ObjectId| -> Option<(ObjectKind, Vec<u8>)> {
            self.odb.get(None, base).ok().map(|o| (o.kind, o.data))
        };
        let mut object_count = 0usize;
        let entries = parser.parse(&resolve, cancel, |_| {
            object_count += 1;
            Ok(())
        })?;

        let pack_dir = self.odb.objects_dir().join("pack");
        let final_pack = pack_dir.join(format!("pack-{}.pack", checksum.to_hex()));
        let final_idx = final_pack.with_extension("idx");

        let tmp_idx = pack_dir.join(format!("tmp_idx_{}", std::process::id()));
        index_write::write_index(&tmp_idx, &entries, &checksum, self.odb.format())?;

        if let Err(e) = fs::rename(&self.tmp_path, &final_pack)
            .and_then(|()| fs::rename(&tmp_idx, &final_idx))
        {
            let _ = fs::remove_file(&tmp_idx);
            let _ = fs::remove_file(&final_pack);
            return Err(e.into());
        }
        self.committed = true;

        self.odb.refresh()?;

        Ok(InstalledPack {
            checksum,
            pack_path: final_pack,
            object_count,
        })
    }
}

impl Write for PackSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("pack sink already committed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PackSink<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_hash::HashFormat;
    use grit_pack::write::PackBytesWriter;

    fn fresh_odb(dir: &std::path::Path) -> Odb {
        Odb::open(dir, HashFormat::Sha1).unwrap()
    }

    #[test]
    fn install_pack_and_read_objects() {
        let dir = tempfile::tempdir().unwrap();
        let odb = fresh_odb(dir.path());

        let mut writer = PackBytesWriter::new(HashFormat::Sha1);
        writer.add_object(ObjectKind::Blob, b"packed one").unwrap();
        writer.add_object(ObjectKind::Blob, b"packed two").unwrap();
        let (bytes, checksum) = writer.finish().unwrap();

        let mut sink = odb.packfile_writer().unwrap();
        sink.write_all(&bytes).unwrap();
        let installed = sink.commit(&CancelToken::new()).unwrap();

        assert_eq!(installed.checksum, checksum);
        assert_eq!(installed.object_count, 2);
        assert!(installed.pack_path.exists());
        assert!(installed.pack_path.with_extension("idx").exists());

        let id = grit_hash::hasher::Hasher::object_id(
            HashFormat::Sha1,
            "blob",
            b"packed one",
        )
        .unwrap();
        assert!(odb.has(&id));
        assert_eq!(odb.get(None, &id).unwrap().data, b"packed one");
    }

    #[test]
    fn corrupt_pack_is_never_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let odb = fresh_odb(dir.path());

        let mut writer = PackBytesWriter::new(HashFormat::Sha1);
        writer.add_object(ObjectKind::Blob, b"will be corrupted").unwrap();
        let (mut bytes, _) = writer.finish().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut sink = odb.packfile_writer().unwrap();
        sink.write_all(&bytes).unwrap();
        assert!(sink.commit(&CancelToken::new()).is_err());

        // Nothing installed, nothing left behind.
        let pack_dir = dir.path().join("pack");
        let leftover: Vec<_> = fs::read_dir(&pack_dir)
            .map(|rd| rd.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        assert!(leftover.is_empty(), "leftover files: {leftover:?}");
    }

    #[test]
    fn thin_pack_resolves_against_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let odb = fresh_odb(dir.path());

        let base: &[u8] = b"an object we already hold locally before the fetch";
        let target: &[u8] = b"an object we already hold locally after the change";
        let base_id = odb.put_raw(ObjectKind::Blob, base).unwrap();

        let mut writer = PackBytesWriter::new(HashFormat::Sha1);
        writer
            .add_ref_delta(&base_id, &grit_pack::delta::compute(base, target))
            .unwrap();
        let (bytes, _) = writer.finish().unwrap();

        let mut sink = odb.packfile_writer().unwrap();
        sink.write_all(&bytes).unwrap();
        let installed = sink.commit(&CancelToken::new()).unwrap();
        assert_eq!(installed.object_count, 1);

        let target_id = grit_hash::hasher::Hasher::object_id(
            HashFormat::Sha1,
            "blob",
            target,
        )
        .unwrap();
        assert_eq!(odb.get(None, &target_id).unwrap().data, target);
    }

    #[test]
    fn dropped_sink_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let odb = fresh_odb(dir.path());
        {
            let mut sink = odb.packfile_writer().unwrap();
            sink.write_all(b"partial garbage").unwrap();
        }
        let pack_dir = dir.path().join("pack");
        assert_eq!(fs::read_dir(&pack_dir).unwrap().count(), 0);
    }

    #[test]
    fn empty_stream_commits_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let odb = fresh_odb(dir.path());
        let sink = odb.packfile_writer().unwrap();
        let installed = sink.commit(&CancelToken::new()).unwrap();
        assert_eq!(installed.object_count, 0);
    }
}
