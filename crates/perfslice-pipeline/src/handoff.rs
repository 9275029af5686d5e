//! Rotation to aggregation handshake.
//!
//! A single atomic state: rotation marks the closed generation `Ready`, a pump
//! claims it by moving it to `Draining`, and the pass ends back at `Idle`. No
//! lock or condition variable sits between the threads, and only one pump can
//! hold a pass at a time.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const READY: u8 = 1;
const DRAINING: u8 = 2;

/// Where the pending generation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// Nothing waits for aggregation.
    Idle,
    /// A rotated generation waits for a pump.
    Ready,
    /// A pump is reading the rotated generation.
    Draining,
}

/// Set from rotation until the pump finishes the pass it claimed.
#[derive(Debug, Default)]
pub struct HandoffSignal {
    state: AtomicU8,
}

impl HandoffSignal {
    /// An idle signal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// Mark a rotated generation ready. Returns `true` if the previous one
    /// was still waiting or being drained.
    pub fn raise(&self) -> bool {
        self.state.swap(READY, Ordering::AcqRel) != IDLE
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandoffState {
        match self.state.load(Ordering::Acquire) {
            READY => HandoffState::Ready,
            DRAINING => HandoffState::Draining,
            _ => HandoffState::Idle,
        }
    }

    /// Whether a handoff is pending or under aggregation.
    #[inline]
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.state.load(Ordering::Acquire) != IDLE
    }

    /// Return to idle.
    pub fn clear(&self) {
        self.state.store(IDLE, Ordering::Release);
    }

    /// Claim the pending generation for one aggregation pass.
    ///
    /// Returns `None` when nothing is ready or another pass holds the claim.
    /// The returned guard returns the signal to idle when dropped, including
    /// during unwinding.
    #[must_use]
    pub fn begin(&self) -> Option<HandoffGuard<'_>> {
        self.state
            .compare_exchange(READY, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_ready| HandoffGuard { signal: self })
    }
}

/// Ends an aggregation pass on drop.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the aggregation pass"]
pub struct HandoffGuard<'a> {
    signal: &'a HandoffSignal,
}

impl Drop for HandoffGuard<'_> {
    fn drop(&mut self) {
        self.signal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_reports_previous_state() {
        let signal = HandoffSignal::new();
        assert!(!signal.raise());
        assert!(signal.raise());
        signal.clear();
        assert!(!signal.is_raised());
        assert_eq!(signal.state(), HandoffState::Idle);
    }

    #[test]
    fn test_begin_only_when_ready() {
        let signal = HandoffSignal::new();
        assert!(signal.begin().is_none());

        signal.raise();
        {
            let _guard = signal.begin();
            assert_eq!(signal.state(), HandoffState::Draining);
            assert!(signal.is_raised());
        }
        assert_eq!(signal.state(), HandoffState::Idle);
    }

    #[test]
    fn test_second_begin_is_refused_while_draining() {
        let signal = HandoffSignal::new();
        signal.raise();

        let first = signal.begin();
        assert!(first.is_some());
        assert!(signal.begin().is_none());

        drop(first);
        assert!(signal.begin().is_none());
    }

    #[test]
    fn test_raise_while_draining_counts_as_overlap() {
        let signal = HandoffSignal::new();
        signal.raise();
        let guard = signal.begin();

        assert!(signal.raise());
        assert_eq!(signal.state(), HandoffState::Ready);

        drop(guard);
        assert_eq!(signal.state(), HandoffState::Idle);
    }

    #[test]
    fn test_guard_clears_on_unwind() {
        let signal = HandoffSignal::new();
        signal.raise();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = signal.begin();
            std::panic::panic_any("calculator exploded");
        }));

        assert!(matches!(result, Err(_)), "closure should have unwound");
        assert!(!signal.is_raised());
    }
}
