//! Cancellation of in-flight requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;

/// Cancels whichever attempt of a request is currently in flight.
///
/// The pipeline repoints the handle at each new attempt, so a caller holding
/// the handle returned by [`Requester::request`](crate::Requester::request)
/// can cancel a retried attempt too. Cancelling suppresses the completion
/// callback; cancelling after completion has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelCell>,
}

#[derive(Debug, Default)]
struct CancelCell {
    cancelled: AtomicBool,
    current: Mutex<Option<AbortHandle>>,
}

impl CancelHandle {
    /// Creates a handle with no attempt attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the current attempt and every later one.
    pub fn cancel(&self) {
        let mut current = self.lock();
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(attempt) = current.take() {
            attempt.abort();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Points the handle at a new attempt.
    ///
    /// If the handle was already cancelled the attempt is aborted at once
    /// and `false` is returned.
    pub(crate) fn repoint(&self, attempt: AbortHandle) -> bool {
        let mut current = self.lock();
        if self.is_cancelled() {
            attempt.abort();
            return false;
        }
        *current = Some(attempt);
        true
    }

    /// Detaches the finished attempt.
    pub(crate) fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        // The cell holds no invariant a panic could break.
        self.inner
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
