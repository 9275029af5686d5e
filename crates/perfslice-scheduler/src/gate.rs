//! Wall-clock slice alignment.
//!
//! Every scheduler derives its slice boundaries from the wall clock alone, so
//! independent instances configured with the same slice size turn over at the
//! same instants without talking to each other.

/// Next slice boundary strictly after `now_ms`.
///
/// Computes `floor(now / slice) * slice + slice` with floor division, so the
/// result is a multiple of `slice_ms`, strictly greater than `now_ms`, and
/// non-decreasing as `now_ms` grows. A non-positive `slice_ms` is treated as 1.
/// Saturates at the largest representable multiple near `i64::MAX`.
#[inline]
#[must_use]
pub fn next_boundary(now_ms: i64, slice_ms: i64) -> i64 {
    let slice = slice_ms.max(1);
    now_ms
        .div_euclid(slice)
        .saturating_mul(slice)
        .saturating_add(slice)
}

/// Slice-size-bound view of [`next_boundary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockAlignedGate {
    slice_ms: i64,
}

impl ClockAlignedGate {
    /// Create a gate for the given slice size. Non-positive sizes become 1.
    #[must_use]
    pub const fn new(slice_ms: i64) -> Self {
        Self {
            slice_ms: if slice_ms < 1 { 1 } else { slice_ms },
        }
    }

    /// Slice size in milliseconds.
    #[inline]
    #[must_use]
    pub const fn slice_ms(&self) -> i64 {
        self.slice_ms
    }

    /// Next boundary strictly after `now_ms`.
    #[inline]
    #[must_use]
    pub fn next_boundary(&self, now_ms: i64) -> i64 {
        next_boundary(now_ms, self.slice_ms)
    }

    /// Start of the slice containing `now_ms`.
    #[inline]
    #[must_use]
    pub fn slice_start(&self, now_ms: i64) -> i64 {
        self.next_boundary(now_ms).saturating_sub(self.slice_ms)
    }
}

/// Clamp a configured slice size into `[MIN_SLICE_MS, MAX_SLICE_MS]`.
///
/// Out-of-range values are not an error; they snap to the nearest bound.
#[must_use]
pub fn clamp_slice_ms(slice_ms: u64) -> i64 {
    let clamped = slice_ms.clamp(crate::MIN_SLICE_MS, crate::MAX_SLICE_MS);
    i64::try_from(clamped).unwrap_or(i64::MAX)
}
