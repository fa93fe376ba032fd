//! Trait abstractions for the flight controller link and time.
//!
//! # Design
//!
//! - Trait definitions are pure and have no feature gates
//! - Mock time is always available for host testing
//! - The MAVLink binding lives in the host crate, the simulated flight
//!   controller in the SITL crate

pub mod time;
pub mod transport;

pub use time::{MockTime, TimeSource};
pub use transport::{
    ftp_error_message, DirEntry, FileTransfer, FileTransferError, ParamTransport, ParamValueMsg,
    RemoteError, TransportError, FTP_ERR_EOF, FTP_ERR_FAIL, FTP_ERR_FILE_EXISTS,
    FTP_ERR_FILE_NOT_FOUND, FTP_ERR_FILE_PROTECTED, FTP_ERR_INVALID_SESSION,
    FTP_ERR_NO_SESSIONS_AVAILABLE, FTP_ERR_UNKNOWN_COMMAND,
};
