//! Busy flag for the control that started an operation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exclusion for one triggering control (a button, a command slot).
///
/// While a [`ControlGuard`] is alive the control is disabled and a second
/// start is refused. The guard re-enables the control when dropped, on every
/// exit path.
#[derive(Debug, Clone, Default)]
pub struct Control {
    busy: Arc<AtomicBool>,
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable the control, or `None` if an operation already holds it
    pub fn try_acquire(&self) -> Option<ControlGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ControlGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds a [`Control`] disabled until dropped
#[derive(Debug)]
#[must_use = "the control is released as soon as the guard is dropped"]
pub struct ControlGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
