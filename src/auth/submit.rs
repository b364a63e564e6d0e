/// In-flight lock for a form submission
use std::sync::atomic::{AtomicBool, Ordering};

/// Mirrors a submit control that is disabled while a request is in flight.
///
/// The guard re-enables it on drop, so every completion path (success,
/// error, early return, cancelled future) releases it.
#[derive(Debug, Default)]
pub struct SubmitControl {
    busy: AtomicBool,
}

#[must_use = "dropping the guard re-enables the control immediately"]
pub struct SubmitGuard<'a> {
    control: &'a SubmitControl,
}

impl SubmitControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable the control, or `None` if it already is.
    pub fn try_begin(&self) -> Option<SubmitGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitGuard { control: self })
    }

    pub fn is_enabled(&self) -> bool {
        !self.busy.load(Ordering::Acquire)
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.control.busy.store(false, Ordering::Release);
    }
}
