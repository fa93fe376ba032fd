//! Logging abstraction
//!
//! Provides unified logging macros for the whole crate. They forward to
//! the `log` facade, so the application picks the backend (env_logger,
//! a GUI log pane, a file) and the library never installs one itself.
//!
//! Every fallback tier and partial failure is logged before degrading,
//! so an operator can tell which strategy satisfied a request.

/// Target used for all records emitted by this crate
pub const LOG_TARGET: &str = "ardu_configurator";

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        ::log::info!(target: $crate::core::logging::LOG_TARGET, $($arg)*)
    };
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ::log::warn!(target: $crate::core::logging::LOG_TARGET, $($arg)*)
    };
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        ::log::error!(target: $crate::core::logging::LOG_TARGET, $($arg)*)
    };
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        ::log::debug!(target: $crate::core::logging::LOG_TARGET, $($arg)*)
    };
}

/// Log trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        ::log::trace!(target: $crate::core::logging::LOG_TARGET, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_without_logger() {
        // No backend installed: records are dropped silently
        crate::log_info!("info {}", 1);
        crate::log_warn!("warn");
        crate::log_error!("error {value}", value = 3);
        crate::log_debug!("debug");
        crate::log_trace!("trace");
    }
}
