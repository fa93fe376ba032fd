//! Scoped cleanup around long-running calibrations
//!
//! The IMU temperature calibration is an opaque routine that may run for
//! minutes. Whatever was switched off before it starts (progress window,
//! link polling) has to come back whether it finishes, fails or panics.

/// Runs its cleanup exactly once when dropped
pub struct CalibrationGuard<F: FnOnce()> {
    name: String,
    cleanup: Option<F>,
}

impl<F: FnOnce()> CalibrationGuard<F> {
    pub fn new(name: impl Into<String>, cleanup: F) -> Self {
        let name = name.into();
        crate::log_info!("Calibration {} started", name);
        Self {
            name,
            cleanup: Some(cleanup),
        }
    }
}

impl<F: FnOnce()> Drop for CalibrationGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            if std::thread::panicking() {
                crate::log_error!("Calibration {} aborted, cleaning up", self.name);
            } else {
                crate::log_info!("Calibration {} finished, cleaning up", self.name);
            }
            cleanup();
        }
    }
}

/// Run `routine` with `cleanup` guaranteed afterwards
///
/// The routine reports progress as `(current, total)`.
pub fn run_calibration<T, E, R, F>(
    name: &str,
    routine: R,
    cleanup: F,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<T, E>
where
    R: FnOnce(&mut dyn FnMut(usize, usize)) -> Result<T, E>,
    F: FnOnce(),
    E: std::fmt::Display,
{
    let _guard = CalibrationGuard::new(name, cleanup);
    let result = routine(progress);
    if let Err(e) = &result {
        crate::log_error!("Calibration {} failed: {}", name, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_cleanup_on_success() {
        let cleaned = Cell::new(0);
        let mut steps = Vec::new();
        let result: Result<u32, String> = run_calibration(
            "imu_temperature",
            |progress| {
                for i in 1..=3 {
                    progress(i, 3);
                }
                Ok(7)
            },
            || cleaned.set(cleaned.get() + 1),
            &mut |c, t| steps.push((c, t)),
        );
        assert_eq!(result, Ok(7));
        assert_eq!(cleaned.get(), 1);
        assert_eq!(steps, [(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_cleanup_on_error() {
        let cleaned = Cell::new(false);
        let result: Result<(), String> = run_calibration(
            "imu_temperature",
            |_| Err("no temperature range".to_string()),
            || cleaned.set(true),
            &mut |_, _| {},
        );
        assert!(result.is_err());
        assert!(cleaned.get());
    }

    #[test]
    fn test_cleanup_on_panic() {
        let cleaned = Cell::new(false);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), String> = run_calibration(
                "imu_temperature",
                |_| panic!("fit diverged"),
                || cleaned.set(true),
                &mut |_, _| {},
            );
        }));
        assert!(outcome.is_err());
        assert!(cleaned.get());
    }
}
