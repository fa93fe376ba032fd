//! Wall-clock time source

use std::time::{Duration, Instant};

use ardu_configurator_core::traits::TimeSource;

/// `TimeSource` backed by `std::time::Instant` and `std::thread::sleep`
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    start: Instant,
}

impl SystemTimeSource {
    /// Create a time source whose zero is now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    fn sleep_us(&self, us: u64) {
        std::thread::sleep(Duration::from_micros(us));
    }
}
