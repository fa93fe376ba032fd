//! ardu_configurator - Step-by-step ArduPilot flight controller configuration
//!
//! This library downloads, edits, uploads and verifies ArduPilot
//! parameters over MAVLink, one numbered step file at a time, and
//! retrieves the newest flight log from the flight controller.

// Logging, settings and wall-clock time
pub mod core;

// MAVLink parameter protocol, MAVFTP and log discovery
pub mod communication;

// Vehicle directory and the configuration step workflow
pub mod configuration;

// Error types shared by the modules above
pub mod error;

pub use communication::logs::LogDiscovery;
pub use communication::mavlink::{ClientConfig, ProtocolClient};
pub use configuration::{ConfigurationStepEngine, UploadReport, VehicleDirectory};
pub use crate::core::Settings;
pub use error::{EngineError, FilesystemError, FlightControllerError, LogDiscoveryError};
