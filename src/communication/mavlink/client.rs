//! Parameter and file client for a connected flight controller
//!
//! Wraps a [`ParamTransport`] with the download fallback chain, the
//! fire-and-forget write, the polled targeted read and whole-file
//! transfers with percentage progress.
//!
//! The client keeps a cache of the last downloaded or fetched values.
//! A write never touches the cache: the flight controller does not
//! acknowledge writes, so only a later read tells whether one took effect.

use std::fs;
use std::path::Path;
use std::time::Duration;

use ardu_configurator_core::parameters::{
    validate_name, validate_name_and_value, ParameterRecord, ParameterSet,
};
use ardu_configurator_core::traits::{FileTransferError, ParamTransport, TimeSource};

use super::param_pack::{decode_param_pack, PARAM_PACK_PATH};
use crate::core::Settings;
use crate::error::FlightControllerError;

/// Timing configuration of a [`ProtocolClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Give up on a parameter list after this long without a new value
    pub param_timeout: Duration,
    /// Sleep between polls of a targeted read
    pub fetch_poll_interval: Duration,
    /// Timeout for whole-file transfers
    pub file_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ClientConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            param_timeout: settings.param_timeout(),
            fetch_poll_interval: settings.fetch_poll_interval(),
            file_timeout: settings.file_timeout(),
        }
    }
}

/// Result of a whole-file transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferOutcome {
    pub success: bool,
    /// Completion code reported by the flight controller, if any
    pub remote_code: Option<u8>,
    pub message: String,
}

impl FileTransferOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            remote_code: None,
            message: String::new(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_code: None,
            message: message.into(),
        }
    }
}

impl From<FileTransferError> for FileTransferOutcome {
    fn from(err: FileTransferError) -> Self {
        match err {
            FileTransferError::Remote(e) => Self {
                success: false,
                remote_code: Some(e.code),
                message: e.message,
            },
            FileTransferError::Transport(e) => Self::failed(e.to_string()),
        }
    }
}

/// Turns fractional completion into whole-percent `(percent, 100)` updates
///
/// Only emits when the integer percentage changes.
pub struct PercentProgress<'a> {
    last: Option<usize>,
    callback: &'a mut dyn FnMut(usize, usize),
}

impl<'a> PercentProgress<'a> {
    pub fn new(callback: &'a mut dyn FnMut(usize, usize)) -> Self {
        Self {
            last: None,
            callback,
        }
    }

    /// Report a completed fraction in `0.0..=1.0`
    pub fn update(&mut self, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).floor() as usize;
        if self.last != Some(percent) {
            self.last = Some(percent);
            (self.callback)(percent, 100);
        }
    }

    /// Report completion
    pub fn finish(&mut self) {
        self.update(1.0);
    }
}

/// Parameter and file access to one flight controller
pub struct ProtocolClient<T: ParamTransport, C: TimeSource> {
    transport: T,
    time: C,
    config: ClientConfig,
    cache: ParameterSet,
}

impl<T: ParamTransport, C: TimeSource> ProtocolClient<T, C> {
    pub fn new(transport: T, time: C, config: ClientConfig) -> Self {
        Self {
            transport,
            time,
            config,
            cache: ParameterSet::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn time(&self) -> &C {
        &self.time
    }

    /// Underlying link
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Last known flight controller values
    pub fn cache(&self) -> &ParameterSet {
        &self.cache
    }

    /// Cached value of a parameter; never touches the link
    pub fn get(&self, name: &str) -> Option<f64> {
        self.cache.value(name)
    }

    /// Download every parameter
    ///
    /// Returns `(values, defaults)`. The bulk path reads the packed
    /// parameter file and also yields factory defaults; on any bulk failure
    /// the per-item list protocol is used and defaults come back empty.
    /// A partial per-item result is not an error.
    pub fn download_all(
        &mut self,
        prefer_bulk: bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(ParameterSet, ParameterSet), FlightControllerError> {
        if prefer_bulk && self.transport.supports_bulk_transfer() {
            match self.download_bulk(progress) {
                Ok((values, defaults)) => {
                    crate::log_info!(
                        "Downloaded {} parameters and {} defaults via file transfer",
                        values.len(),
                        defaults.len()
                    );
                    self.cache = values.clone();
                    return Ok((values, defaults));
                }
                Err(e) => {
                    crate::log_warn!(
                        "Bulk parameter download failed ({}), falling back to parameter list",
                        e
                    );
                }
            }
        } else if prefer_bulk {
            crate::log_info!("Flight controller has no file transfer, using parameter list");
        }

        let values = self.download_per_item(progress)?;
        self.cache = values.clone();
        Ok((values, ParameterSet::new()))
    }

    fn download_bulk(
        &mut self,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(ParameterSet, ParameterSet), FlightControllerError> {
        let timeout = self.config.file_timeout;
        let ftp = self
            .transport
            .file_transfer()
            .ok_or(FlightControllerError::FileTransferUnavailable)?;
        let mut percent = PercentProgress::new(progress);
        let data = ftp.read_file(PARAM_PACK_PATH, timeout, &mut |f| percent.update(f))?;
        let packed = decode_param_pack(&data)?;
        percent.finish();
        Ok((packed.values, packed.defaults))
    }

    fn download_per_item(
        &mut self,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<ParameterSet, FlightControllerError> {
        self.transport.request_list()?;

        let mut values = ParameterSet::new();
        let mut total: Option<usize> = None;
        loop {
            match self.transport.recv_value(self.config.param_timeout) {
                Ok(Some(msg)) => {
                    let count = msg.count as usize;
                    total = Some(count);
                    values.insert(msg.name, ParameterRecord::new(msg.value));
                    progress(values.len(), count);
                    if values.len() >= count {
                        break;
                    }
                }
                Ok(None) => {
                    crate::log_warn!(
                        "Parameter list stalled after {} of {} parameters, keeping partial result",
                        values.len(),
                        total.map_or_else(|| "?".to_string(), |t| t.to_string())
                    );
                    break;
                }
                Err(e) => {
                    crate::log_error!(
                        "Parameter list interrupted after {} parameters: {}",
                        values.len(),
                        e
                    );
                    break;
                }
            }
        }

        crate::log_info!("Downloaded {} parameters via parameter list", values.len());
        Ok(values)
    }

    /// Write a parameter without waiting for confirmation
    ///
    /// The cache keeps the old value until a later read.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), FlightControllerError> {
        validate_name_and_value(name, value)?;
        crate::log_debug!("Setting {} to {}", name, value);
        self.transport.send_set(name, value)?;
        Ok(())
    }

    /// Read one parameter from the flight controller
    ///
    /// Polls until a matching value arrives or `timeout` elapses. The cache
    /// is only updated on success.
    pub fn fetch(&mut self, name: &str, timeout: Duration) -> Result<f64, FlightControllerError> {
        if timeout.is_zero() {
            return Err(FlightControllerError::InvalidTimeout);
        }
        validate_name(name)?;

        // Values queued before the read request are echoes of earlier writes
        let mut stale = 0usize;
        while self.transport.recv_value(Duration::ZERO)?.is_some() {
            stale += 1;
        }
        if stale > 0 {
            crate::log_debug!("Dropped {} queued parameter values before reading {}", stale, name);
        }
        self.transport.request_read(name)?;
        let start = self.time.now_us();
        let timeout_us = timeout.as_micros() as u64;
        let poll_us = self.config.fetch_poll_interval.as_micros() as u64;

        loop {
            while let Some(msg) = self.transport.recv_value(Duration::ZERO)? {
                if msg.name == name {
                    self.cache.insert(name, ParameterRecord::new(msg.value));
                    return Ok(msg.value);
                }
            }
            if self.time.elapsed_since(start) >= timeout_us {
                crate::log_warn!("No reply for parameter {} within {:?}", name, timeout);
                return Err(FlightControllerError::Timeout(name.to_string()));
            }
            self.time.sleep_us(poll_us.max(1));
        }
    }

    /// Reboot the flight controller and block for `wait`
    pub fn reset_and_reconnect(&mut self, wait: Duration) -> Result<(), FlightControllerError> {
        self.transport.reboot()?;
        crate::log_info!("Waiting {} s for the flight controller to boot", wait.as_secs());
        self.time.sleep_us(wait.as_micros() as u64);
        Ok(())
    }

    /// Upload a local file
    pub fn upload_file(
        &mut self,
        local: &Path,
        remote: &str,
        progress: &mut dyn FnMut(usize, usize),
    ) -> FileTransferOutcome {
        let data = match fs::read(local) {
            Ok(data) => data,
            Err(e) => {
                crate::log_error!("Cannot read {}: {}", local.display(), e);
                return FileTransferOutcome::failed(e.to_string());
            }
        };
        let Some(ftp) = self.transport.file_transfer() else {
            return FileTransferOutcome::failed(
                FlightControllerError::FileTransferUnavailable.to_string(),
            );
        };

        let mut percent = PercentProgress::new(progress);
        match ftp.write_file(remote, &data, &mut |f| percent.update(f)) {
            Ok(()) => {
                percent.finish();
                crate::log_info!("Uploaded {} to {}", local.display(), remote);
                FileTransferOutcome::ok()
            }
            Err(e) => {
                crate::log_error!("Upload of {} to {} failed: {}", local.display(), remote, e);
                e.into()
            }
        }
    }

    /// Download a remote file
    pub fn download_file(
        &mut self,
        remote: &str,
        local: &Path,
        progress: &mut dyn FnMut(usize, usize),
    ) -> FileTransferOutcome {
        let timeout = self.config.file_timeout;
        let Some(ftp) = self.transport.file_transfer() else {
            return FileTransferOutcome::failed(
                FlightControllerError::FileTransferUnavailable.to_string(),
            );
        };

        let mut percent = PercentProgress::new(progress);
        let data = match ftp.read_file(remote, timeout, &mut |f| percent.update(f)) {
            Ok(data) => data,
            Err(e) => {
                crate::log_error!("Download of {} failed: {}", remote, e);
                return e.into();
            }
        };
        if let Err(e) = fs::write(local, &data) {
            crate::log_error!("Cannot write {}: {}", local.display(), e);
            return FileTransferOutcome::failed(e.to_string());
        }
        percent.finish();
        crate::log_info!("Downloaded {} to {}", remote, local.display());
        FileTransferOutcome::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ardu_configurator_core::traits::{
        DirEntry, FileTransfer, MockTime, ParamValueMsg, RemoteError, TransportError,
        FTP_ERR_FILE_NOT_FOUND,
    };
    use std::collections::VecDeque;

    /// Scripted link: replies are queued up front
    #[derive(Default)]
    struct ScriptedLink {
        replies: VecDeque<ParamValueMsg>,
        reply_on_read: Option<ParamValueMsg>,
        sent: Vec<(String, f64)>,
        reads: Vec<String>,
        bulk: bool,
        pack: Option<Vec<u8>>,
        files: Vec<(String, Vec<u8>)>,
    }

    impl ScriptedLink {
        fn queue(&mut self, name: &str, value: f64, index: u16, count: u16) {
            self.replies.push_back(ParamValueMsg {
                name: name.into(),
                value,
                index,
                count,
            });
        }
    }

    impl FileTransfer for ScriptedLink {
        fn read_file(
            &mut self,
            path: &str,
            _timeout: Duration,
            progress: &mut dyn FnMut(f32),
        ) -> Result<Vec<u8>, FileTransferError> {
            if path == PARAM_PACK_PATH {
                if let Some(pack) = &self.pack {
                    progress(0.333);
                    progress(0.336);
                    progress(1.0);
                    return Ok(pack.clone());
                }
            }
            if let Some((_, data)) = self.files.iter().find(|(p, _)| p == path) {
                progress(0.5);
                return Ok(data.clone());
            }
            Err(FileTransferError::Remote(RemoteError {
                code: FTP_ERR_FILE_NOT_FOUND,
                message: "FileNotFound".into(),
            }))
        }

        fn write_file(
            &mut self,
            path: &str,
            data: &[u8],
            progress: &mut dyn FnMut(f32),
        ) -> Result<(), FileTransferError> {
            progress(0.25);
            progress(0.251);
            self.files.push((path.to_string(), data.to_vec()));
            Ok(())
        }

        fn list_directory(&mut self, _path: &str) -> Result<Vec<DirEntry>, FileTransferError> {
            Ok(Vec::new())
        }

        fn open_probe(
            &mut self,
            _path: &str,
            _timeout: Duration,
        ) -> Result<bool, FileTransferError> {
            Ok(false)
        }
    }

    impl ParamTransport for ScriptedLink {
        fn request_list(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn request_read(&mut self, name: &str) -> Result<(), TransportError> {
            self.reads.push(name.to_string());
            if let Some(reply) = self.reply_on_read.take() {
                self.replies.push_back(reply);
            }
            Ok(())
        }

        fn send_set(&mut self, name: &str, value: f64) -> Result<(), TransportError> {
            self.sent.push((name.to_string(), value));
            Ok(())
        }

        fn recv_value(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<ParamValueMsg>, TransportError> {
            Ok(self.replies.pop_front())
        }

        fn supports_bulk_transfer(&self) -> bool {
            self.bulk
        }

        fn reboot(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn file_transfer(&mut self) -> Option<&mut dyn FileTransfer> {
            if self.bulk {
                Some(self)
            } else {
                None
            }
        }
    }

    fn client(link: ScriptedLink) -> ProtocolClient<ScriptedLink, MockTime> {
        ProtocolClient::new(link, MockTime::new(), ClientConfig::default())
    }

    fn small_pack() -> Vec<u8> {
        let mut data = 0x671cu16.to_le_bytes().to_vec();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.push(0x11);
        data.push(((4 - 1) << 4) as u8);
        data.extend_from_slice(b"GAIN");
        data.push(5);
        data.push(2);
        data
    }

    #[test]
    fn test_per_item_download_stops_at_advertised_count() {
        let mut link = ScriptedLink::default();
        link.queue("A", 1.0, 0, 2);
        link.queue("B", 2.0, 1, 2);
        link.queue("STRAY", 3.0, 0, 2);
        let mut client = client(link);

        let mut seen = Vec::new();
        let (values, defaults) = client
            .download_all(false, &mut |cur, total| seen.push((cur, total)))
            .unwrap();
        assert_eq!(values.len(), 2);
        assert!(defaults.is_empty());
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
        assert_eq!(client.get("B"), Some(2.0));
    }

    #[test]
    fn test_per_item_partial_result_is_success() {
        let mut link = ScriptedLink::default();
        link.queue("A", 1.0, 0, 5);
        let mut client = client(link);
        let (values, _) = client.download_all(false, &mut |_, _| {}).unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_bulk_download_returns_defaults() {
        let link = ScriptedLink {
            bulk: true,
            pack: Some(small_pack()),
            ..Default::default()
        };
        let mut client = client(link);
        let mut percents = Vec::new();
        let (values, defaults) = client
            .download_all(true, &mut |p, _| percents.push(p))
            .unwrap();
        assert_eq!(values.value("GAIN"), Some(5.0));
        assert_eq!(defaults.value("GAIN"), Some(2.0));
        assert_eq!(percents, vec![33, 100]);
        assert_eq!(client.get("GAIN"), Some(5.0));
    }

    #[test]
    fn test_bulk_failure_falls_back_to_list() {
        let mut link = ScriptedLink {
            bulk: true,
            pack: Some(vec![0xde, 0xad]),
            ..Default::default()
        };
        link.queue("A", 1.0, 0, 1);
        let mut client = client(link);
        let (values, defaults) = client.download_all(true, &mut |_, _| {}).unwrap();
        assert_eq!(values.value("A"), Some(1.0));
        assert!(defaults.is_empty());
    }

    #[test]
    fn test_set_does_not_update_cache() {
        let mut link = ScriptedLink::default();
        link.queue("BATT_CAPACITY", 3300.0, 0, 1);
        let mut client = client(link);
        client.download_all(false, &mut |_, _| {}).unwrap();

        client.set("BATT_CAPACITY", 5000.0).unwrap();
        assert_eq!(client.get("BATT_CAPACITY"), Some(3300.0));
        assert_eq!(client.transport().sent, vec![("BATT_CAPACITY".to_string(), 5000.0)]);
    }

    #[test]
    fn test_set_rejects_invalid_name_before_io() {
        let mut client = client(ScriptedLink::default());
        assert!(matches!(
            client.set("bad name", 1.0),
            Err(FlightControllerError::Validation(_))
        ));
        assert!(matches!(
            client.set("GOOD", f64::NAN),
            Err(FlightControllerError::Validation(_))
        ));
        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_fetch_updates_cache() {
        let link = ScriptedLink {
            reply_on_read: Some(ParamValueMsg {
                name: "RC_SPEED".into(),
                value: 490.0,
                index: 3,
                count: 10,
            }),
            ..Default::default()
        };
        let mut client = client(link);
        assert_eq!(client.fetch("RC_SPEED", Duration::from_secs(1)).unwrap(), 490.0);
        assert_eq!(client.get("RC_SPEED"), Some(490.0));
    }

    #[test]
    fn test_fetch_skips_values_queued_before_the_read() {
        let mut link = ScriptedLink {
            reply_on_read: Some(ParamValueMsg {
                name: "RC_SPEED".into(),
                value: 400.0,
                index: 3,
                count: 10,
            }),
            ..Default::default()
        };
        link.queue("RC_SPEED", 490.0, 3, 10);
        let mut client = client(link);
        assert_eq!(client.fetch("RC_SPEED", Duration::from_secs(1)).unwrap(), 400.0);
        assert_eq!(client.get("RC_SPEED"), Some(400.0));
        assert_eq!(client.transport().reads, ["RC_SPEED"]);
    }

    #[test]
    fn test_fetch_ignores_other_parameters_and_times_out() {
        let mut link = ScriptedLink::default();
        link.queue("OTHER", 1.0, 0, 2);
        let mut client = client(link);
        let err = client.fetch("RC_SPEED", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, FlightControllerError::Timeout(ref n) if n == "RC_SPEED"));
        assert_eq!(client.get("RC_SPEED"), None);
        assert_eq!(client.get("OTHER"), None);
        assert!(client.time().now_us() >= 100_000);
    }

    #[test]
    fn test_fetch_zero_timeout_rejected_before_io() {
        let mut client = client(ScriptedLink::default());
        assert!(matches!(
            client.fetch("RC_SPEED", Duration::ZERO),
            Err(FlightControllerError::InvalidTimeout)
        ));
        assert!(client.transport().reads.is_empty());
    }

    #[test]
    fn test_percent_progress_emits_on_change_only() {
        let mut seen = Vec::new();
        let mut cb = |p: usize, _t: usize| seen.push(p);
        let mut progress = PercentProgress::new(&mut cb);
        for f in [0.0, 0.001, 0.5, 0.504, 0.51, 1.2] {
            progress.update(f);
        }
        progress.finish();
        assert_eq!(seen, vec![0, 50, 51, 100]);
    }

    #[test]
    fn test_download_file_writes_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("log.bin");
        let link = ScriptedLink {
            bulk: true,
            files: vec![("/APM/LOGS/00000002.BIN".into(), vec![1, 2, 3])],
            ..Default::default()
        };
        let mut client = client(link);
        let mut last = 0;
        let outcome = client.download_file("/APM/LOGS/00000002.BIN", &local, &mut |p, _| last = p);
        assert!(outcome.success);
        assert_eq!(last, 100);
        assert_eq!(std::fs::read(&local).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_download_missing_file_reports_remote_code() {
        let dir = tempfile::tempdir().unwrap();
        let link = ScriptedLink {
            bulk: true,
            ..Default::default()
        };
        let mut client = client(link);
        let outcome = client.download_file("/missing", &dir.path().join("x"), &mut |_, _| {});
        assert!(!outcome.success);
        assert_eq!(outcome.remote_code, Some(FTP_ERR_FILE_NOT_FOUND));
        assert!(!dir.path().join("x").exists());
    }

    #[test]
    fn test_upload_without_file_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.lua");
        std::fs::write(&local, b"-- script").unwrap();
        let mut client = client(ScriptedLink::default());
        let outcome = client.upload_file(&local, "/APM/scripts/a.lua", &mut |_, _| {});
        assert!(!outcome.success);
        assert_eq!(outcome.remote_code, None);
    }

    #[test]
    fn test_upload_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.lua");
        std::fs::write(&local, b"-- script").unwrap();
        let link = ScriptedLink {
            bulk: true,
            ..Default::default()
        };
        let mut client = client(link);
        let mut seen = Vec::new();
        let outcome = client.upload_file(&local, "/APM/scripts/a.lua", &mut |p, _| seen.push(p));
        assert!(outcome.success);
        assert_eq!(seen, vec![25, 100]);
        assert_eq!(client.transport().files[0].1, b"-- script".to_vec());
    }
}
