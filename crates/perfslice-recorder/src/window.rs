//! Slice windows.
//!
//! A recorder covers the half-open interval `[start, stop)` in wall-clock
//! milliseconds. [`WindowStamp`] holds that interval inside a recorder where it
//! is rewritten on every rotation; [`SliceWindow`] is the plain copy carried by
//! finished statistics.

use core::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// Half-open `[start_ms, stop_ms)` interval covered by one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SliceWindow {
    /// Inclusive start, milliseconds since the Unix epoch.
    pub start_ms: i64,
    /// Exclusive stop, milliseconds since the Unix epoch.
    pub stop_ms: i64,
}

impl SliceWindow {
    /// Window from explicit bounds.
    #[must_use]
    pub const fn new(start_ms: i64, stop_ms: i64) -> Self {
        Self { start_ms, stop_ms }
    }

    /// Window `[start_ms, start_ms + slice_ms)`.
    #[must_use]
    pub const fn starting_at(start_ms: i64, slice_ms: i64) -> Self {
        Self {
            start_ms,
            stop_ms: start_ms.saturating_add(slice_ms),
        }
    }

    /// Length in milliseconds; zero or negative for an unusable window.
    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        self.stop_ms.saturating_sub(self.start_ms)
    }

    /// Both bounds set and `stop > start`.
    #[must_use]
    pub const fn is_stamped(&self) -> bool {
        self.start_ms > 0 && self.stop_ms > 0 && self.stop_ms > self.start_ms
    }

    /// `other` begins exactly where `self` ends.
    #[must_use]
    pub const fn is_followed_by(&self, other: &Self) -> bool {
        self.stop_ms == other.start_ms
    }
}

/// Atomic window bounds owned by a recorder.
///
/// Written by the rotation thread while the recorder is not visible to
/// application threads, read by the aggregation thread after the swap has been
/// published, so relaxed ordering on the individual fields is enough.
#[derive(Debug, Default)]
pub struct WindowStamp {
    start_ms: AtomicI64,
    stop_ms: AtomicI64,
}

impl WindowStamp {
    /// Unstamped window (both bounds zero).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start_ms: AtomicI64::new(0),
            stop_ms: AtomicI64::new(0),
        }
    }

    /// Window start.
    #[inline]
    #[must_use]
    pub fn start_ms(&self) -> i64 {
        self.start_ms.load(Ordering::Relaxed)
    }

    /// Set the window start.
    #[inline]
    pub fn set_start_ms(&self, start_ms: i64) {
        self.start_ms.store(start_ms, Ordering::Relaxed);
    }

    /// Window stop.
    #[inline]
    #[must_use]
    pub fn stop_ms(&self) -> i64 {
        self.stop_ms.load(Ordering::Relaxed)
    }

    /// Set the window stop.
    #[inline]
    pub fn set_stop_ms(&self, stop_ms: i64) {
        self.stop_ms.store(stop_ms, Ordering::Relaxed);
    }

    /// Copy of the current bounds.
    #[must_use]
    pub fn load(&self) -> SliceWindow {
        SliceWindow::new(self.start_ms(), self.stop_ms())
    }

    /// Overwrite both bounds.
    pub fn store(&self, window: SliceWindow) {
        self.set_start_ms(window.start_ms);
        self.set_stop_ms(window.stop_ms);
    }
}
