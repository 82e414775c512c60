use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::transport::CancelPredicate;

/// Shared stop request for a monitoring session.
///
/// Clones observe the same flag. The bridge owns one flag and hands clones to
/// each session; tests build independent flags per session.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the active session stop at its next receive timeout.
    pub fn request(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }

    /// Predicate handed to the transport's blocking receive.
    #[must_use]
    pub fn predicate(&self) -> CancelPredicate {
        let inner = Arc::clone(&self.inner);
        Box::new(move || inner.load(Ordering::SeqCst))
    }
}
