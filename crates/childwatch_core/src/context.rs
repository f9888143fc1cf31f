//! Per-call cancellation and deadline token.
//!
//! # Responsibility
//! - Carry caller cancellation and timeout through service and repository
//!   layers down to the point of blocking I/O.
//!
//! # Invariants
//! - Once cancelled, a context stays cancelled.
//! - Clones share the same cancellation flag.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `CancelHandle::cancel` was called.
    Cancelled,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled by caller"),
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
        }
    }
}

/// Execution context passed to every repository and service call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

/// Cancels the context it was taken from, and every clone of it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    /// Context with no deadline that is only cancelled through its handle.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    /// Returns a copy sharing the cancellation flag, with `deadline` applied.
    ///
    /// An existing earlier deadline is kept.
    pub fn deadline_at(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context is done, or `None` while it is live.
    pub fn done(&self) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// `Ok(())` while live, `Err(reason)` once done.
    pub fn check(&self) -> Result<(), CancelReason> {
        match self.done() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{CallContext, CancelReason};
    use std::time::{Duration, Instant};

    #[test]
    fn background_context_is_live() {
        let ctx = CallContext::background();
        assert_eq!(ctx.done(), None);
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let ctx = CallContext::background();
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();
        assert_eq!(clone.done(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn elapsed_deadline_reports_deadline_exceeded() {
        let ctx = CallContext::with_timeout(Duration::ZERO);
        assert_eq!(ctx.check(), Err(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn deadline_at_keeps_earlier_deadline() {
        let early = Instant::now() + Duration::from_secs(1);
        let late = early + Duration::from_secs(60);
        let ctx = CallContext::background().deadline_at(early).deadline_at(late);
        assert_eq!(ctx.deadline(), Some(early));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let ctx = CallContext::with_timeout(Duration::ZERO);
        ctx.cancel_handle().cancel();
        assert_eq!(ctx.done(), Some(CancelReason::Cancelled));
    }
}
