//! Flight controller link abstraction.
//!
//! The parameter and file-transfer services the configuration workflow
//! consumes, independent of the wire protocol. The MAVLink binding lives
//! in the host crate, the simulated flight controller in the SITL crate.

use core::fmt;
use core::time::Duration;

/// One parameter value notification from the flight controller
#[derive(Debug, Clone, PartialEq)]
pub struct ParamValueMsg {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: f64,
    /// Index of this parameter on the flight controller
    pub index: u16,
    /// Total number of parameters the flight controller advertises
    pub count: u16,
}

/// Link-level failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing arrived in time
    Timeout,
    /// Link closed or lost
    Disconnected,
    /// Underlying I/O or encoding failure
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timed out waiting for the flight controller"),
            TransportError::Disconnected => write!(f, "flight controller link lost"),
            TransportError::Io(msg) => write!(f, "link I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Remote completion code reported by the flight controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Non-zero completion code
    pub code: u8,
    /// Human-readable description of the code
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// File transfer failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTransferError {
    /// Link failure
    Transport(TransportError),
    /// Flight controller rejected the operation
    Remote(RemoteError),
}

impl FileTransferError {
    /// True if the flight controller reported that the file does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileTransferError::Remote(e) if e.code == FTP_ERR_FILE_NOT_FOUND)
    }
}

impl fmt::Display for FileTransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTransferError::Transport(e) => write!(f, "{}", e),
            FileTransferError::Remote(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FileTransferError {}

impl From<TransportError> for FileTransferError {
    fn from(err: TransportError) -> Self {
        FileTransferError::Transport(err)
    }
}

impl From<RemoteError> for FileTransferError {
    fn from(err: RemoteError) -> Self {
        FileTransferError::Remote(err)
    }
}

/// Generic failure
pub const FTP_ERR_FAIL: u8 = 1;
/// Failure with errno
pub const FTP_ERR_FAIL_ERRNO: u8 = 2;
/// Payload size is invalid
pub const FTP_ERR_INVALID_DATA_SIZE: u8 = 3;
/// Session is not open
pub const FTP_ERR_INVALID_SESSION: u8 = 4;
/// All sessions in use
pub const FTP_ERR_NO_SESSIONS_AVAILABLE: u8 = 5;
/// Offset past end of file
pub const FTP_ERR_EOF: u8 = 6;
/// Unknown opcode
pub const FTP_ERR_UNKNOWN_COMMAND: u8 = 7;
/// File already exists
pub const FTP_ERR_FILE_EXISTS: u8 = 8;
/// File is write protected
pub const FTP_ERR_FILE_PROTECTED: u8 = 9;
/// File or directory not found
pub const FTP_ERR_FILE_NOT_FOUND: u8 = 10;

/// Describe a MAVFTP NAK code
pub fn ftp_error_message(code: u8) -> &'static str {
    match code {
        FTP_ERR_FAIL => "Fail",
        FTP_ERR_FAIL_ERRNO => "FailErrno",
        FTP_ERR_INVALID_DATA_SIZE => "InvalidDataSize",
        FTP_ERR_INVALID_SESSION => "InvalidSession",
        FTP_ERR_NO_SESSIONS_AVAILABLE => "NoSessionsAvailable",
        FTP_ERR_EOF => "EndOfFile",
        FTP_ERR_UNKNOWN_COMMAND => "UnknownCommand",
        FTP_ERR_FILE_EXISTS => "FileExists",
        FTP_ERR_FILE_PROTECTED => "FileProtected",
        FTP_ERR_FILE_NOT_FOUND => "FileNotFound",
        _ => "Unknown",
    }
}

/// Entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File or directory name, without path
    pub name: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// True for directories
    pub is_dir: bool,
}

/// Remote file system access (MAVFTP semantics)
///
/// Progress callbacks receive the completed fraction in `0.0..=1.0`.
pub trait FileTransfer {
    /// Read a whole remote file
    fn read_file(
        &mut self,
        path: &str,
        timeout: Duration,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>, FileTransferError>;

    /// Create or overwrite a remote file
    fn write_file(
        &mut self,
        path: &str,
        data: &[u8],
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), FileTransferError>;

    /// List a remote directory
    fn list_directory(&mut self, path: &str) -> Result<Vec<DirEntry>, FileTransferError>;

    /// Open and immediately close a remote file to test for its existence
    ///
    /// `Ok(false)` means the flight controller answered "not found".
    fn open_probe(&mut self, path: &str, timeout: Duration) -> Result<bool, FileTransferError>;
}

/// Parameter protocol and control link to a flight controller
///
/// Calls block for at most the given timeout. Implementations are not
/// required to be thread-safe; callers serialize access.
pub trait ParamTransport {
    /// Ask the flight controller to broadcast all parameters
    fn request_list(&mut self) -> Result<(), TransportError>;

    /// Ask for a single parameter by name
    fn request_read(&mut self, name: &str) -> Result<(), TransportError>;

    /// Write a parameter; the protocol sends no acknowledgement
    fn send_set(&mut self, name: &str, value: f64) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next parameter value notification
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn recv_value(&mut self, timeout: Duration) -> Result<Option<ParamValueMsg>, TransportError>;

    /// True if the flight controller advertises bulk parameter transfer
    fn supports_bulk_transfer(&self) -> bool;

    /// Ask the flight controller to reboot
    fn reboot(&mut self) -> Result<(), TransportError>;

    /// File transfer service, if the link provides one
    fn file_transfer(&mut self) -> Option<&mut dyn FileTransfer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = FileTransferError::Remote(RemoteError {
            code: FTP_ERR_FILE_NOT_FOUND,
            message: ftp_error_message(FTP_ERR_FILE_NOT_FOUND).into(),
        });
        assert!(err.is_not_found());
        assert!(!FileTransferError::Transport(TransportError::Timeout).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = RemoteError {
            code: 9,
            message: "FileProtected".into(),
        };
        assert_eq!(err.to_string(), "remote error 9: FileProtected");
        assert_eq!(ftp_error_message(200), "Unknown");
    }
}
