//! Scope guards that run cleanup on every exit path.

/// Runs a closure when dropped.
///
/// Used to pair an acquisition with its release so that early returns,
/// cancellation and panics all go through the same cleanup.
pub struct DropGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> DropGuard<F> {
    /// Arms a guard around `cleanup`.
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }
}

impl<F: FnOnce()> Drop for DropGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl<F: FnOnce()> std::fmt::Debug for DropGuard<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropGuard")
            .field("armed", &self.cleanup.is_some())
            .finish()
    }
}
