//! One-shot cancellable timer handle for the deferred-release stage.
//!
//! The handle is shared between the request context (which cancels it on
//! teardown) and the driving task (which awaits the deadline and fires it).
//! State transitions are one-way: `ARMED → FIRED` or `ARMED → CANCELLED`.
//! Firing after cancellation is a no-op, which is what makes teardown safe
//! against a timer that is still in flight.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug)]
struct TimerInner {
    deadline: tokio::time::Instant,
    state: AtomicU8,
}

/// Shared handle to a one-shot timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    inner: Arc<TimerInner>,
}

impl TimerHandle {
    /// Arm a timer that becomes due after `delay`.
    pub fn arm(delay: Duration) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                deadline: tokio::time::Instant::now() + delay,
                state: AtomicU8::new(ARMED),
            }),
        }
    }

    /// Sleep until the deadline. Does not change state; the caller decides
    /// whether the fire actually happens via [`TimerHandle::fire`].
    pub async fn due(&self) {
        tokio::time::sleep_until(self.inner.deadline).await;
    }

    /// Transition `ARMED → FIRED`. Returns `true` only for the transition
    /// that wins; a fire after cancel (or a second fire) returns `false`
    /// and has no effect.
    pub fn fire(&self) -> bool {
        self.inner
            .state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transition `ARMED → CANCELLED`. Returns `true` if the timer was
    /// still armed.
    pub fn cancel(&self) -> bool {
        self.inner
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Did the timer already fire?
    pub fn fired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == FIRED
    }

    pub fn cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_once() {
        let t = TimerHandle::arm(Duration::from_millis(1));
        assert!(t.fire());
        assert!(t.fired());
        assert!(!t.fire());
    }

    #[test]
    fn test_fire_after_cancel_is_noop() {
        let t = TimerHandle::arm(Duration::from_millis(1));
        assert!(t.cancel());
        assert!(!t.fire());
        assert!(!t.fired());
        assert!(t.cancelled());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let t = TimerHandle::arm(Duration::from_millis(1));
        assert!(t.fire());
        assert!(!t.cancel());
        assert!(t.fired());
    }

    #[tokio::test]
    async fn test_due_waits_for_deadline() {
        let t = TimerHandle::arm(Duration::from_millis(50));
        let before = std::time::Instant::now();
        t.due().await;
        assert!(before.elapsed() >= Duration::from_millis(45));
    }
}
