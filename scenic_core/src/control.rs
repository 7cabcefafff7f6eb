//! Progress and cancellation shared between a loader and its caller.
//!
//! Both values are polled: the loader publishes progress between top-level
//! statements and checks the cancel flag at node granularity.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct LoadControl {
    progress: AtomicU32,
    cancel: AtomicBool,
}

impl LoadControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress in [0, 1].
    #[inline]
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub fn set_progress(&self, progress: f32) {
        let progress = progress.clamp(0.0, 1.0);
        self.progress.store(progress.to_bits(), Ordering::Release);
    }

    /// Asks the loader to stop at the next check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn progress_is_clamped() {
        let control = LoadControl::new();
        assert_eq!(control.progress(), 0.0);
        control.set_progress(0.5);
        assert_eq!(control.progress(), 0.5);
        control.set_progress(3.0);
        assert_eq!(control.progress(), 1.0);
    }

    #[test]
    fn cancel_is_visible_across_threads() {
        let control = Arc::new(LoadControl::new());
        let remote = control.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(control.is_cancelled());
    }
}
