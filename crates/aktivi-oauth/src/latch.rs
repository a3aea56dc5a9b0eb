use std::sync::atomic::{AtomicBool, Ordering};

/// Fires once; every later attempt is refused.
///
/// Owned by a route handler and tripped before any side effect, so a handler
/// mounted twice for the same navigation only does its work once.
#[derive(Debug, Default)]
pub struct OneShot {
    fired: AtomicBool,
}

impl OneShot {
    /// An unfired latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` for the first caller only.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
