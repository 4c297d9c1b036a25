//! Pause and cancellation primitives.
//!
//! Each registered job owns one `PauseGate`; each execution of a job owns
//! one `CancelToken`. The job's worker is the gate's only waiter; the
//! manager (directly or on behalf of the business-software detector) is the
//! signaler. Both waits are bounded so a fired token is observed promptly
//! even when no wake-up is sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::EngineError;

/// How long a blocked wait sleeps between cancellation checks.
pub(crate) const WAIT_POLL: Duration = Duration::from_millis(50);

/// Cooperative cancellation handle for one job execution.
///
/// Cloning shares the underlying flag: the manager keeps one clone to fire,
/// the worker keeps another to check at loop boundaries and inside blocking
/// waits. A cancelled token never un-cancels; a new execution gets a fresh
/// token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Suspension-point check: `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// True when both tokens share one underlying flag.
    pub(crate) fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Blocking pause signal for one job.
///
/// The gate starts open (not blocking). `pause` closes it; `resume` opens it
/// and wakes the waiter. The worker parks in `wait_while_paused` between two
/// per-file steps, so a pause set on an idle job simply takes effect at the
/// next execution's first check.
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    unpaused: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate. The worker blocks at its next check.
    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Open the gate and wake the blocked worker, if any.
    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.unpaused.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the gate is open.
    ///
    /// Returns `Err(Cancelled)` if the execution's token fires while the
    /// worker is parked here; a paused job must still be stoppable.
    pub fn wait_while_paused(&self, cancel: &CancelToken) -> Result<(), EngineError> {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        while *paused {
            cancel.check()?;
            let (guard, _) = self
                .unpaused
                .wait_timeout(paused, WAIT_POLL)
                .unwrap_or_else(PoisonError::into_inner);
            paused = guard;
        }
        Ok(())
    }
}
