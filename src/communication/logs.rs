//! Flight log discovery
//!
//! Finds the number of the newest `NNNNNNNN.BIN` log on the flight
//! controller. Three strategies are tried in order and the first answer
//! wins:
//!
//! 1. the `LASTLOG.TXT` pointer file
//! 2. the highest numbered entry of a directory listing
//! 3. a binary search over `1..=9999` probing each candidate with an open
//!
//! The binary search relies on logs being numbered contiguously from 1:
//! every number up to the newest exists, none above it does.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ardu_configurator_core::traits::{FileTransfer, ParamTransport, TimeSource};

use crate::communication::mavlink::ProtocolClient;
use crate::core::Settings;
use crate::error::LogDiscoveryError;

/// Remote log directory
pub const LOG_DIRECTORY: &str = "/APM/LOGS";

/// Remote file holding the number of the newest log
pub const LAST_LOG_FILE: &str = "/APM/LOGS/LASTLOG.TXT";

/// Highest log number ArduPilot uses
pub const MAX_LOG_NUMBER: u32 = 9999;

/// `00000042.BIN`
pub fn log_file_name(number: u32) -> String {
    format!("{:08}.BIN", number)
}

/// Remote path of a log file
pub fn log_file_path(number: u32) -> String {
    format!("{}/{}", LOG_DIRECTORY, log_file_name(number))
}

/// Parse an eight digit `.BIN` log file name
pub fn parse_log_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_suffix(".BIN")?;
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Largest `n` in `low..=high` for which `exists(n)` holds
///
/// `exists` must be monotone: true up to some boundary, false above it.
pub fn binary_search_max(
    mut low: u32,
    mut high: u32,
    mut exists: impl FnMut(u32) -> bool,
) -> Option<u32> {
    let mut found = None;
    while low <= high {
        let mid = low + (high - low) / 2;
        if exists(mid) {
            found = Some(mid);
            low = mid + 1;
        } else if mid == 0 {
            break;
        } else {
            high = mid - 1;
        }
    }
    found
}

/// Three-tier newest log finder
#[derive(Debug, Clone)]
pub struct LogDiscovery {
    probe_timeout: Duration,
    read_timeout: Duration,
    probes: usize,
}

impl LogDiscovery {
    /// `probe_timeout` must exceed the link's idle detection or missing
    /// replies look like missing files
    pub fn new(probe_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            read_timeout,
            probes: 0,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.log_probe_timeout(), settings.file_timeout())
    }

    /// Existence probes issued by the last binary search
    pub fn probe_count(&self) -> usize {
        self.probes
    }

    /// Find the number of the newest log
    pub fn discover(&mut self, ftp: &mut dyn FileTransfer) -> Result<u32, LogDiscoveryError> {
        if let Some(n) = self.from_pointer_file(ftp) {
            crate::log_info!("Newest log {} found via {}", n, LAST_LOG_FILE);
            return Ok(n);
        }
        if let Some(n) = self.from_directory_listing(ftp) {
            crate::log_info!("Newest log {} found via listing of {}", n, LOG_DIRECTORY);
            return Ok(n);
        }
        if let Some(n) = self.from_binary_search(ftp) {
            crate::log_info!("Newest log {} found by probing ({} probes)", n, self.probes);
            return Ok(n);
        }
        crate::log_error!("No log number discoverable on the flight controller");
        Err(LogDiscoveryError::NoLogNumber)
    }

    fn from_pointer_file(&self, ftp: &mut dyn FileTransfer) -> Option<u32> {
        let data = match ftp.read_file(LAST_LOG_FILE, self.read_timeout, &mut |_| {}) {
            Ok(data) => data,
            Err(e) => {
                crate::log_info!("Cannot read {}: {}", LAST_LOG_FILE, e);
                return None;
            }
        };
        let text = String::from_utf8_lossy(&data);
        match text.trim().parse::<u32>() {
            Ok(n) if n > 0 => Some(n),
            _ => {
                crate::log_warn!("{} holds no log number: {:?}", LAST_LOG_FILE, text.trim());
                None
            }
        }
    }

    fn from_directory_listing(&self, ftp: &mut dyn FileTransfer) -> Option<u32> {
        let entries = match ftp.list_directory(LOG_DIRECTORY) {
            Ok(entries) => entries,
            Err(e) => {
                crate::log_info!("Cannot list {}: {}", LOG_DIRECTORY, e);
                return None;
            }
        };
        let newest = entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| parse_log_file_name(&e.name))
            .max();
        if newest.is_none() {
            crate::log_info!("No log files in listing of {}", LOG_DIRECTORY);
        }
        newest
    }

    fn from_binary_search(&mut self, ftp: &mut dyn FileTransfer) -> Option<u32> {
        let timeout = self.probe_timeout;
        let mut probes = 0;
        let found = binary_search_max(1, MAX_LOG_NUMBER, |n| {
            probes += 1;
            let path = log_file_path(n);
            match ftp.open_probe(&path, timeout) {
                Ok(exists) => exists,
                Err(e) => {
                    crate::log_debug!("Probe of {} failed: {}", path, e);
                    false
                }
            }
        });
        self.probes = probes;
        found
    }

    /// Find the newest log and download it into `dest_dir`
    ///
    /// Returns the local path. Nothing is downloaded if no log number can
    /// be discovered.
    pub fn download_latest_log<T: ParamTransport, C: TimeSource>(
        &mut self,
        client: &mut ProtocolClient<T, C>,
        dest_dir: &Path,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<PathBuf, LogDiscoveryError> {
        let number = {
            let Some(ftp) = client.transport_mut().file_transfer() else {
                crate::log_error!("Flight controller link has no file transfer service");
                return Err(LogDiscoveryError::NoLogNumber);
            };
            self.discover(ftp)?
        };

        let remote = log_file_path(number);
        let local = dest_dir.join(log_file_name(number));
        let outcome = client.download_file(&remote, &local, progress);
        if outcome.success {
            Ok(local)
        } else {
            Err(LogDiscoveryError::DownloadFailed {
                path: remote,
                message: outcome.message,
            })
        }
    }
}
