use std::path::PathBuf;

use ardu_configurator_core::configuration::{ParameterEditError, WorkflowState};
use ardu_configurator_core::parameters::{ParseError, ValidationError};
use ardu_configurator_core::traits::{FileTransferError, RemoteError, TransportError};

/// Remote-reported failure (non-zero completion code)
pub type ProtocolError = RemoteError;

/// Errors from flight controller operations.
#[derive(Debug, thiserror::Error)]
pub enum FlightControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Timeout must be positive")]
    InvalidTimeout,

    #[error("Timeout waiting for parameter {0}")]
    Timeout(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Flight controller link has no file transfer service")]
    FileTransferUnavailable,

    #[error("Invalid packed parameter data: {0}")]
    InvalidParamPack(String),
}

impl From<FileTransferError> for FlightControllerError {
    fn from(err: FileTransferError) -> Self {
        match err {
            FileTransferError::Transport(e) => FlightControllerError::Transport(e),
            FileTransferError::Remote(e) => FlightControllerError::Protocol(e),
        }
    }
}

/// Errors from locating and downloading flight logs.
#[derive(Debug, thiserror::Error)]
pub enum LogDiscoveryError {
    #[error("No log number discoverable on the flight controller")]
    NoLogNumber,

    #[error("Download of {path} failed: {message}")]
    DownloadFailed { path: String, message: String },
}

/// Errors from reading and writing the vehicle directory.
#[derive(Debug, thiserror::Error)]
pub enum FilesystemError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error in {path}, {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} parameter {name} in step {file} has no change reason")]
    MissingChangeReason {
        file: String,
        name: String,
        kind: &'static str,
    },

    #[error("{kind} parameter {name} in step {file} has no value")]
    MissingValue {
        file: String,
        name: String,
        kind: &'static str,
    },

    #[error("Configuration step file not found: {0}")]
    StepNotFound(String),
}

/// Errors from the configuration step engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Cannot go from {from} to {to}")]
    InvalidState {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("No configuration step is loaded")]
    NoStepLoaded,

    #[error("Step {file} is {percent}% mandatory and cannot be skipped")]
    MandatoryStep { file: String, percent: u8 },

    #[error("Parameter {0} is not part of the current step")]
    UnknownParameter(String),

    #[error("Parameter {0} is already part of the current step")]
    DuplicateParameter(String),

    #[error("Unsaved changes in {0}")]
    UnsavedChanges(String),

    #[error("{text:?} is not a valid value for {name}")]
    InvalidValue { name: String, text: String },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Edit(#[from] ParameterEditError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(transparent)]
    FlightController(#[from] FlightControllerError),
}

/// Errors from the step plugin registry.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin {name} failed: {message}")]
    Failed { name: String, message: String },
}

/// Errors from loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error on settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}
