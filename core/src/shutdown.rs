//! Process-wide cooperative shutdown flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag every long-lived thread polls once per loop iteration.
///
/// Any thread may raise it; nobody lowers it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` if this call was the first to do so.
    pub fn request(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
