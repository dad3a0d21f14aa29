//! Cancelable controller timers
//!
//! Controller state never owns a running task. A transition that wants
//! something to happen later issues a [`TimerToken`], records it as pending,
//! and returns a [`TimerEffect`] describing the timer. The controller's driver
//! turns that effect into a sleeping task whose handle lives in a
//! [`TimerSlot`]. When the task wakes it hands the token back to the state,
//! which acts only if that token is still the pending one. Cancelling is
//! therefore a state change first and a task abort second.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::utils::lock;
use crate::utils::logging::LoggingHelper;

/// Delay before a marked roster entry advances to the next student
pub const AUTO_ADVANCE_DELAY: Duration = Duration::from_millis(1500);

/// Delay before a quick-capture success is cleared
pub const AUTO_CLEAR_DELAY: Duration = Duration::from_millis(5000);

/// Identifies one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Issues unique timer tokens for one controller
#[derive(Debug, Default)]
pub struct TimerTokens {
    next: u64,
}

impl TimerTokens {
    pub fn issue(&mut self) -> TimerToken {
        self.next += 1;
        TimerToken(self.next)
    }
}

/// A timer change requested by a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEffect {
    Schedule { token: TimerToken, delay: Duration },
    Cancel(TimerToken),
}

/// Holds the task behind the one pending timer of a controller
pub struct TimerSlot {
    kind: &'static str,
    pending: Option<(TimerToken, AbortHandle)>,
}

impl TimerSlot {
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            pending: None,
        }
    }

    fn arm(&mut self, token: TimerToken, handle: AbortHandle) {
        if let Some((_, previous)) = self.pending.replace((token, handle)) {
            previous.abort();
        }
    }

    fn cancel(&mut self, token: TimerToken) {
        if self.pending.as_ref().is_some_and(|(t, _)| *t == token) {
            if let Some((_, handle)) = self.pending.take() {
                handle.abort();
                LoggingHelper::log_timer_cancelled(self.kind);
            }
        }
    }

    fn fired(&mut self, token: TimerToken) {
        if self.pending.as_ref().is_some_and(|(t, _)| *t == token) {
            self.pending = None;
        }
    }

    /// Whether a timer task is still armed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }
}

/// Controller state driven by timer effects
pub trait TimerDriven: Send + 'static {
    fn timer_slot(&mut self) -> &mut TimerSlot;

    /// Called when a timer task wakes up with its token
    fn on_timer_elapsed(&mut self, token: TimerToken);
}

/// Perform the timer effects returned by a transition.
///
/// `inner` must be the locked contents of `shared`. Spawned tasks hold only
/// a weak reference, so dropping the controller ends them quietly.
pub fn apply_effects<T: TimerDriven>(
    shared: &Arc<Mutex<T>>,
    inner: &mut T,
    effects: Vec<TimerEffect>,
) {
    for effect in effects {
        match effect {
            TimerEffect::Cancel(token) => inner.timer_slot().cancel(token),
            TimerEffect::Schedule { token, delay } => {
                let weak: Weak<Mutex<T>> = Arc::downgrade(shared);
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(shared) = weak.upgrade() {
                        let mut inner = lock(&shared);
                        inner.timer_slot().fired(token);
                        inner.on_timer_elapsed(token);
                    }
                });
                let slot = inner.timer_slot();
                LoggingHelper::log_timer_scheduled(slot.kind, delay);
                slot.arm(token, task.abort_handle());
            }
        }
    }
}
