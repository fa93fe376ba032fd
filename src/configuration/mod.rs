//! Step-by-step vehicle configuration
//!
//! # Architecture
//!
//! - **Filesystem**: vehicle directory with its step files, documentation and snapshots
//! - **Step**: per-step metadata with forced and derived overrides
//! - **Engine**: workflow over the steps, editing, upload and verification
//! - **Operator**: confirmations and notices, injected by the front end
//! - **Registry**: plugins activated by individual steps
//! - **Calibration**: scoped cleanup around long-running calibrations

pub mod calibration; // Calibration cleanup guard
pub mod engine; // Configuration step engine
pub mod filesystem; // Vehicle directory
pub mod operator; // Operator interaction
pub mod registry; // Step plugin registry
pub mod step; // Step metadata

pub use calibration::{run_calibration, CalibrationGuard};
pub use engine::{ConfigurationStepEngine, ParameterMismatch, UploadReport, BOOT_DELAY_PARAMETER};
pub use filesystem::{is_step_file, VehicleDirectory};
pub use operator::{HeadlessOperator, OperatorInterface};
pub use registry::{PluginFactory, PluginRegistry, StepPlugin};
pub use step::{ConfigurationSteps, DerivedExpression, StepMetadata, STEPS_FILE};
