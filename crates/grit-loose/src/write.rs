use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use grit_hash::hasher::Hasher;
use grit_hash::ObjectId;
use grit_object::{header, EncodedObject, ObjectKind};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Write an encoded object, returning its id.
    ///
    /// Idempotent: writing bytes already present is a no-op with the same
    /// id. The file lands via temp-file-then-rename.
    pub fn write(&self, obj: &EncodedObject) -> Result<ObjectId, LooseError> {
        self.write_raw(obj.kind, &obj.data)
    }

    /// Write raw content with a known kind, returning its id.
    pub fn write_raw(&self, kind: ObjectKind, content: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(kind, content.len());

        let id = {
            let mut hasher = Hasher::new(self.format());
            hasher.update(&hdr);
            hasher.update(content);
            hasher.finish()?
        };

        if self.contains(&id) {
            return Ok(id);
        }

        let final_path = self.object_path(&id);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.deflate_to_temp(&hdr, content)?;
        finalize_object(&tmp_path, &final_path)?;

        Ok(id)
    }

    /// Compress header + content into a temp file in the objects dir
    /// (same filesystem, so the final rename is atomic).
    fn deflate_to_temp(&self, hdr: &[u8], content: &[u8]) -> Result<std::path::PathBuf, LooseError> {
        let tmp_path = self.objects_dir().join(format!(
            "tmp_obj_{}",
            std::process::id()
                ^ std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos()
        ));

        let file = fs::File::create(&tmp_path)?;
        let mut encoder = ZlibEncoder::new(file, self.compression());
        let write_result = encoder
            .write_all(hdr)
            .and_then(|()| encoder.write_all(content))
            .and_then(|()| encoder.finish().map(|_| ()));
        if let Err(e) = write_result {
            // Partial writes never survive cancellation or IO failure.
            let _ = fs::remove_file(&tmp_path);
            return Err(LooseError::Io(e));
        }

        // Loose objects are immutable; 0444 matches what git writes.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o444))?;
        }

        Ok(tmp_path)
    }

    fn compression(&self) -> flate2::Compression {
        self.compression
    }
}

/// Atomically move a temp file into its final location.
///
/// A concurrent writer may win the race; content addressing makes that
/// outcome equivalent to success.
fn finalize_object(tmp: &Path, final_path: &Path) -> Result<(), LooseError> {
    match fs::rename(tmp, final_path) {
        Ok(()) => Ok(()),
        Err(_) if final_path.exists() => {
            let _ = fs::remove_file(tmp);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(tmp);
            Err(LooseError::Io(e))
        }
    }
}
