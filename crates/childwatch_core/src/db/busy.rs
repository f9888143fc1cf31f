//! SQLite busy handling bound to the running operation's context.
//!
//! # Responsibility
//! - Retry statements blocked by another connection's lock.
//! - Give up as soon as the calling operation's context is done.
//!
//! # Invariants
//! - The handler only observes a context while a [`BusyScope`] for it is
//!   alive on the calling thread.
//! - Without a scope, waiting stops after [`BUSY_TIMEOUT`].

use crate::context::CallContext;
use std::cell::RefCell;
use std::thread;
use std::time::Duration;

/// Upper bound on waiting for another connection's lock.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(5);

thread_local! {
    static ACTIVE_CONTEXT: RefCell<Option<CallContext>> = const { RefCell::new(None) };
}

/// Makes `ctx` visible to [`wait_while_busy`] on this thread until dropped.
pub(crate) struct BusyScope {
    previous: Option<CallContext>,
}

impl BusyScope {
    pub(crate) fn enter(ctx: &CallContext) -> Self {
        let previous = ACTIVE_CONTEXT.with(|active| active.replace(Some(ctx.clone())));
        Self { previous }
    }
}

impl Drop for BusyScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_CONTEXT.with(|active| {
            *active.borrow_mut() = previous;
        });
    }
}

/// Busy callback installed on every bootstrapped connection.
///
/// `attempt` counts prior invocations for the current lock wait. Returning
/// `false` makes SQLite fail the statement with `SQLITE_BUSY`.
pub(crate) fn wait_while_busy(attempt: i32) -> bool {
    let waited = BUSY_RETRY_INTERVAL.saturating_mul(u32::try_from(attempt).unwrap_or(0));
    if waited >= BUSY_TIMEOUT {
        return false;
    }

    let ctx_done = ACTIVE_CONTEXT.with(|active| {
        active
            .borrow()
            .as_ref()
            .is_some_and(|ctx| ctx.done().is_some())
    });
    if ctx_done {
        return false;
    }

    thread::sleep(BUSY_RETRY_INTERVAL);
    true
}
