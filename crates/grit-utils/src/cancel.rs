use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::UtilError;

/// Cooperative cancellation handle.
///
/// Long-running operations (negotiation, pack ingestion, checkout) check
/// this at their blocking boundaries and bail out with
/// [`UtilError::Canceled`]. Cloning shares the underlying flag, so the
/// caller keeps one handle and hands the other to the operation.
///
/// An optional deadline turns the token into a per-operation timeout:
/// the token reports itself canceled once the deadline passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that additionally fires once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Request cancellation. Idempotent; visible to all clones.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Has cancellation been requested (or the deadline passed)?
    pub fn is_canceled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Check-point: error out if canceled.
    pub fn check(&self) -> Result<(), UtilError> {
        if self.is_canceled() {
            Err(UtilError::Canceled)
        } else {
            Ok(())
        }
    }
}
