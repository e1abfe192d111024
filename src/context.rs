//! Cooperative cancellation shared by a study and its trials.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

/// A cloneable cancellation signal.
///
/// Clones share the same flag: cancelling any clone cancels all of them.
/// The optimize loop checks the signal before starting each trial, and
/// objectives may poll [`Trial::context`](crate::Trial::context) to stop
/// early. Nothing is interrupted preemptively.
///
/// # Examples
///
/// ```
/// use hypertune::Context;
///
/// let ctx = Context::new();
/// let worker_view = ctx.clone();
/// assert!(!worker_view.is_cancelled());
/// ctx.cancel();
/// assert!(worker_view.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled until [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that also reports cancellation once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Fire the signal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the signal fired or the deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
