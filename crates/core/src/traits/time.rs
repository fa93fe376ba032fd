//! Time abstraction for timeout and wait handling.
//!
//! This module provides the `TimeSource` trait that abstracts over the
//! wall clock so that timeouts, poll loops and post-reset waits can be
//! tested deterministically on the host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic time source with blocking sleep.
///
/// - `SystemTimeSource` (in the host crate) uses `std::time::Instant`
/// - `MockTime` advances virtual time on `sleep_us` and never blocks
///
/// # Example
///
/// ```
/// use ardu_configurator_core::traits::{TimeSource, MockTime};
///
/// fn wait_for<T: TimeSource>(time: &T, deadline_us: u64) {
///     while time.now_us() < deadline_us {
///         time.sleep_us(10_000);
///     }
/// }
///
/// let time = MockTime::new();
/// wait_for(&time, 50_000);
/// assert_eq!(time.now_us(), 50_000);
/// ```
pub trait TimeSource: Clone + Send + Sync {
    /// Returns current time in microseconds since an arbitrary start.
    fn now_us(&self) -> u64;

    /// Blocks the calling thread for the given duration.
    fn sleep_us(&self, us: u64);

    /// Returns current time in milliseconds.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }

    /// Returns elapsed time in microseconds since a reference point.
    ///
    /// Uses saturating subtraction to handle potential overflow.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

// ============================================================================
// Mock Implementation (always available for testing)
// ============================================================================

/// Mock time source for testing with controllable time advancement.
///
/// Clones share the same clock, so a simulated flight controller and the
/// client driving it observe identical time. `sleep_us` advances the
/// clock instantly and accumulates the total slept time.
///
/// # Example
///
/// ```
/// use ardu_configurator_core::traits::{MockTime, TimeSource};
///
/// let time = MockTime::new();
/// time.sleep_us(1000);
/// assert_eq!(time.now_us(), 1000);
/// assert_eq!(time.slept_us(), 1000);
/// ```
#[derive(Clone, Default)]
pub struct MockTime {
    current_us: Arc<AtomicU64>,
    slept_us: Arc<AtomicU64>,
}

impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time to an absolute value.
    pub fn set(&self, us: u64) {
        self.current_us.store(us, Ordering::SeqCst);
    }

    /// Advances the current time without counting it as sleep.
    pub fn advance(&self, us: u64) {
        self.current_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Total time spent in `sleep_us`.
    pub fn slept_us(&self) -> u64 {
        self.slept_us.load(Ordering::SeqCst)
    }
}

impl TimeSource for MockTime {
    fn now_us(&self) -> u64 {
        self.current_us.load(Ordering::SeqCst)
    }

    fn sleep_us(&self, us: u64) {
        self.current_us.fetch_add(us, Ordering::SeqCst);
        self.slept_us.fetch_add(us, Ordering::SeqCst);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
