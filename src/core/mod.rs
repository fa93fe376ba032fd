//! Ambient infrastructure
//!
//! Logging macros, persistent settings and the wall-clock time source.

pub mod logging;
pub mod settings;
pub mod time;

pub use settings::Settings;
pub use time::SystemTimeSource;
