//! Software-in-the-loop flight controller for ardu_configurator.
//!
//! Provides [`SimulatedFlightController`], an in-process stand-in for an
//! ArduPilot autopilot: parameter table with factory defaults, packed
//! parameter file, reboot with boot delay, a virtual file system holding
//! flight logs, and an optional lossy link.

pub mod controller;
pub mod error;
pub mod files;
pub mod params;

pub use controller::{SimulatedFlightController, BASE_BOOT_TIME_US, LOG_DIRECTORY, PARAM_PACK_FILE};
pub use error::SimulatorError;
pub use files::VirtualFileSystem;
pub use params::{ParameterTable, SimParameter};
