use std::collections::HashSet;
use std::fs;
use std::time::{Duration, SystemTime};

use grit_hash::ObjectId;

use crate::{LooseError, LooseStore};

/// Outcome of a prune pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Ids whose files were deleted.
    pub removed: Vec<ObjectId>,
    /// Ids kept because they were reachable or too young.
    pub retained: usize,
}

impl LooseStore {
    /// Delete unreachable loose objects older than `grace`.
    ///
    /// `reachable` is the caller-computed reachability set (every object
    /// reachable from any ref plus the index). An object younger than the
    /// grace period is kept even when unreachable: it may belong to an
    /// operation still in flight.
    pub fn prune(
        &self,
        reachable: &HashSet<ObjectId>,
        grace: Duration,
    ) -> Result<PruneReport, LooseError> {
        let cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut report = PruneReport::default();
        for id in self.iter()? {
            let id = id?;
            if reachable.contains(&id) {
                report.retained += 1;
                continue;
            }

            let path = self.object_path(&id);
            let mtime = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if mtime > cutoff {
                report.retained += 1;
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(id),
                // Already gone: another pruner won, same outcome.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.removed.push(id)
                }
                Err(e) => return Err(LooseError::Io(e)),
            }
        }
        Ok(report)
    }
}
