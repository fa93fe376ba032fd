//! Simulated ArduPilot flight controller.
//!
//! Implements the parameter and file transfer traits in-process so the
//! configuration workflow can run end to end without hardware. Time is a
//! shared [`MockTime`]: waiting on an empty link advances the clock, and
//! a reboot keeps the controller silent until its boot delay has passed.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ardu_configurator_core::traits::{
    ftp_error_message, DirEntry, FileTransfer, FileTransferError, MockTime, ParamTransport,
    ParamValueMsg, RemoteError, TimeSource, TransportError, FTP_ERR_FAIL, FTP_ERR_FILE_NOT_FOUND,
    FTP_ERR_UNKNOWN_COMMAND,
};

use crate::error::SimulatorError;
use crate::files::VirtualFileSystem;
use crate::params::ParameterTable;

/// Remote log directory.
pub const LOG_DIRECTORY: &str = "/APM/LOGS";

/// Virtual file holding the packed parameter table.
pub const PARAM_PACK_FILE: &str = "@PARAM/param.pck";

/// Time from reboot until the controller answers, on top of `BRD_BOOT_DELAY`.
pub const BASE_BOOT_TIME_US: u64 = 500_000;

/// Bytes per simulated file transfer chunk, as in a MAVFTP read.
const CHUNK_SIZE: usize = 239;

fn remote_error(code: u8) -> FileTransferError {
    FileTransferError::Remote(RemoteError {
        code,
        message: ftp_error_message(code).to_string(),
    })
}

/// In-process flight controller.
pub struct SimulatedFlightController {
    time: MockTime,
    params: ParameterTable,
    read_only: BTreeSet<String>,
    files: VirtualFileSystem,
    file_transfer: bool,
    listing: bool,
    outbox: VecDeque<ParamValueMsg>,
    rng: StdRng,
    loss_probability: f64,
    booting_until_us: u64,
    reboots: u32,
    sets: Vec<(String, f64)>,
    probes: usize,
}

impl SimulatedFlightController {
    /// Empty controller with file transfer enabled and a lossless link.
    pub fn new(time: MockTime) -> Self {
        Self {
            time,
            params: ParameterTable::new(),
            read_only: BTreeSet::new(),
            files: VirtualFileSystem::new(),
            file_transfer: true,
            listing: true,
            outbox: VecDeque::new(),
            rng: StdRng::seed_from_u64(0),
            loss_probability: 0.0,
            booting_until_us: 0,
            reboots: 0,
            sets: Vec::new(),
            probes: 0,
        }
    }

    pub fn add_parameter(
        &mut self,
        name: &str,
        value: f64,
        default: f64,
    ) -> Result<(), SimulatorError> {
        self.params.insert(name, value, default)
    }

    /// Writes to this parameter are accepted on the link but ignored.
    pub fn set_read_only(&mut self, name: &str) -> Result<(), SimulatorError> {
        if self.params.get(name).is_none() {
            return Err(SimulatorError::ParameterNotFound(name.to_string()));
        }
        self.read_only.insert(name.to_string());
        Ok(())
    }

    pub fn set_file_transfer(&mut self, enabled: bool) {
        self.file_transfer = enabled;
    }

    /// Answer directory listings with an unknown-command error when off.
    pub fn set_directory_listing(&mut self, enabled: bool) {
        self.listing = enabled;
    }

    /// Drop each parameter message and write with `probability`.
    ///
    /// Seeded so failing runs can be replayed.
    pub fn set_packet_loss(&mut self, probability: f64, seed: u64) -> Result<(), SimulatorError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimulatorError::InvalidLossProbability(probability));
        }
        self.loss_probability = probability;
        self.rng = StdRng::seed_from_u64(seed);
        Ok(())
    }

    pub fn add_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<(), SimulatorError> {
        self.files.insert(path, data.into())
    }

    /// Create logs `1..=count`, optionally with a `LASTLOG.TXT` pointer.
    pub fn add_logs(&mut self, count: u32, with_pointer: bool) -> Result<(), SimulatorError> {
        for n in 1..=count {
            let body = format!("log {}", n).into_bytes();
            self.files.insert(&format!("{}/{:08}.BIN", LOG_DIRECTORY, n), body)?;
        }
        if with_pointer && count > 0 {
            let pointer = format!("{}\r\n", count).into_bytes();
            self.files.insert(&format!("{}/LASTLOG.TXT", LOG_DIRECTORY), pointer)?;
        }
        Ok(())
    }

    /// Current value as the controller holds it.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.params.get(name).map(|p| p.value as f64)
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.params
    }

    pub fn files(&self) -> &VirtualFileSystem {
        &self.files
    }

    pub fn reboot_count(&self) -> u32 {
        self.reboots
    }

    /// Every write received, including lost and ignored ones.
    pub fn sent_sets(&self) -> &[(String, f64)] {
        &self.sets
    }

    /// Open probes received.
    pub fn probe_count(&self) -> usize {
        self.probes
    }

    pub fn is_booting(&self) -> bool {
        self.time.now_us() < self.booting_until_us
    }

    fn lost(&mut self) -> bool {
        self.loss_probability > 0.0 && self.rng.gen_bool(self.loss_probability)
    }

    fn ensure_up(&self) -> Result<(), TransportError> {
        if self.is_booting() {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn queue_value(&mut self, name: &str) {
        let (Some(param), Some(index)) = (self.params.get(name), self.params.index_of(name)) else {
            return;
        };
        let msg = ParamValueMsg {
            name: param.name.clone(),
            value: param.value as f64,
            index: index as u16,
            count: self.params.len() as u16,
        };
        if !self.lost() {
            self.outbox.push_back(msg);
        }
    }

    fn transfer_progress(len: usize, progress: &mut dyn FnMut(f32)) {
        let mut offset = 0;
        while offset < len {
            offset = (offset + CHUNK_SIZE).min(len);
            progress(offset as f32 / len as f32);
        }
    }
}

impl ParamTransport for SimulatedFlightController {
    fn request_list(&mut self) -> Result<(), TransportError> {
        self.ensure_up()?;
        let names: Vec<String> = self.params.iter().map(|p| p.name.clone()).collect();
        for name in names {
            self.queue_value(&name);
        }
        Ok(())
    }

    fn request_read(&mut self, name: &str) -> Result<(), TransportError> {
        self.ensure_up()?;
        self.queue_value(name);
        Ok(())
    }

    fn send_set(&mut self, name: &str, value: f64) -> Result<(), TransportError> {
        self.ensure_up()?;
        self.sets.push((name.to_string(), value));
        if self.lost() || self.read_only.contains(name) {
            return Ok(());
        }
        if self.params.set_value(name, value).is_ok() {
            // ArduPilot echoes accepted writes
            self.queue_value(name);
        }
        Ok(())
    }

    fn recv_value(&mut self, timeout: Duration) -> Result<Option<ParamValueMsg>, TransportError> {
        if self.is_booting() {
            self.time.advance(timeout.as_micros() as u64);
            return Ok(None);
        }
        match self.outbox.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None => {
                self.time.advance(timeout.as_micros() as u64);
                Ok(None)
            }
        }
    }

    fn supports_bulk_transfer(&self) -> bool {
        self.file_transfer
    }

    fn reboot(&mut self) -> Result<(), TransportError> {
        let boot_delay_ms = self
            .params
            .get("BRD_BOOT_DELAY")
            .map_or(0.0, |p| p.value.max(0.0) as f64);
        self.reboots += 1;
        self.outbox.clear();
        self.booting_until_us =
            self.time.now_us() + BASE_BOOT_TIME_US + (boot_delay_ms * 1000.0) as u64;
        Ok(())
    }

    fn file_transfer(&mut self) -> Option<&mut dyn FileTransfer> {
        if self.file_transfer {
            Some(self)
        } else {
            None
        }
    }
}

impl FileTransfer for SimulatedFlightController {
    fn read_file(
        &mut self,
        path: &str,
        _timeout: Duration,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>, FileTransferError> {
        self.ensure_up()?;
        if self.lost() {
            return Err(TransportError::Timeout.into());
        }
        let data = match path.split_once('?') {
            Some((PARAM_PACK_FILE, query)) => self
                .params
                .encode_pack(query.split('&').any(|q| q == "withdefaults=1")),
            None if path == PARAM_PACK_FILE => self.params.encode_pack(false),
            _ => self
                .files
                .get(path)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| remote_error(FTP_ERR_FILE_NOT_FOUND))?,
        };
        Self::transfer_progress(data.len(), progress);
        Ok(data)
    }

    fn write_file(
        &mut self,
        path: &str,
        data: &[u8],
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), FileTransferError> {
        self.ensure_up()?;
        self.files
            .insert(path, data.to_vec())
            .map_err(|_| remote_error(FTP_ERR_FAIL))?;
        Self::transfer_progress(data.len(), progress);
        Ok(())
    }

    fn list_directory(&mut self, path: &str) -> Result<Vec<DirEntry>, FileTransferError> {
        self.ensure_up()?;
        if !self.listing {
            return Err(remote_error(FTP_ERR_UNKNOWN_COMMAND));
        }
        self.files
            .list(path)
            .ok_or_else(|| remote_error(FTP_ERR_FILE_NOT_FOUND))
    }

    fn open_probe(&mut self, path: &str, _timeout: Duration) -> Result<bool, FileTransferError> {
        self.ensure_up()?;
        self.probes += 1;
        Ok(self.files.contains(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (MockTime, SimulatedFlightController) {
        let time = MockTime::new();
        let mut fc = SimulatedFlightController::new(time.clone());
        fc.add_parameter("BRD_BOOT_DELAY", 2000.0, 0.0).unwrap();
        fc.add_parameter("GPS_TYPE", 1.0, 1.0).unwrap();
        fc.add_parameter("INS_ACC_ID", 1234.0, 0.0).unwrap();
        (time, fc)
    }

    #[test]
    fn test_request_list_enumerates_all() {
        let (_time, mut fc) = controller();
        fc.request_list().unwrap();
        let mut seen = Vec::new();
        while let Some(msg) = fc.recv_value(Duration::ZERO).unwrap() {
            assert_eq!(msg.count, 3);
            seen.push((msg.index, msg.name));
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, "BRD_BOOT_DELAY".to_string()));
    }

    #[test]
    fn test_set_echoes_and_read_only_ignored() {
        let (_time, mut fc) = controller();
        fc.set_read_only("INS_ACC_ID").unwrap();
        fc.send_set("GPS_TYPE", 2.0).unwrap();
        fc.send_set("INS_ACC_ID", 1.0).unwrap();
        fc.send_set("UNKNOWN", 1.0).unwrap();

        let echo = fc.recv_value(Duration::ZERO).unwrap().unwrap();
        assert_eq!((echo.name.as_str(), echo.value), ("GPS_TYPE", 2.0));
        assert!(fc.recv_value(Duration::ZERO).unwrap().is_none());
        assert_eq!(fc.parameter("INS_ACC_ID"), Some(1234.0));
        assert_eq!(fc.sent_sets().len(), 3);
    }

    #[test]
    fn test_reboot_silences_until_boot_delay() {
        let (time, mut fc) = controller();
        fc.reboot().unwrap();
        assert_eq!(fc.reboot_count(), 1);
        assert!(fc.is_booting());
        assert_eq!(fc.request_list(), Err(TransportError::Disconnected));

        time.advance(2_000_000 + BASE_BOOT_TIME_US);
        assert!(!fc.is_booting());
        fc.request_list().unwrap();
    }

    #[test]
    fn test_empty_wait_advances_clock() {
        let (time, mut fc) = controller();
        assert!(fc.recv_value(Duration::from_millis(250)).unwrap().is_none());
        assert_eq!(time.now_us(), 250_000);
    }

    #[test]
    fn test_files_and_probes() {
        let (_time, mut fc) = controller();
        fc.add_logs(3, true).unwrap();
        let pointer = fc
            .read_file("/APM/LOGS/LASTLOG.TXT", Duration::from_secs(1), &mut |_| {})
            .unwrap();
        assert_eq!(pointer, b"3\r\n");
        assert!(fc.open_probe("/APM/LOGS/00000003.BIN", Duration::from_secs(1)).unwrap());
        assert!(!fc.open_probe("/APM/LOGS/00000004.BIN", Duration::from_secs(1)).unwrap());
        assert_eq!(fc.probe_count(), 2);
        assert!(fc
            .read_file("/nope", Duration::from_secs(1), &mut |_| {})
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_file_transfer_toggle() {
        let (_time, mut fc) = controller();
        assert!(fc.file_transfer().is_some());
        fc.set_file_transfer(false);
        assert!(!fc.supports_bulk_transfer());
        assert!(fc.file_transfer().is_none());
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let (_time, mut fc) = controller();
        fc.set_packet_loss(1.0, 7).unwrap();
        fc.request_list().unwrap();
        assert!(fc.recv_value(Duration::ZERO).unwrap().is_none());
        fc.send_set("GPS_TYPE", 5.0).unwrap();
        assert_eq!(fc.parameter("GPS_TYPE"), Some(1.0));
        assert!(fc.set_packet_loss(1.5, 0).is_err());
    }

    #[test]
    fn test_progress_reaches_one() {
        let (_time, mut fc) = controller();
        let mut fractions = Vec::new();
        let pack = fc
            .read_file("@PARAM/param.pck?withdefaults=1", Duration::from_secs(1), &mut |f| {
                fractions.push(f)
            })
            .unwrap();
        assert_eq!(&pack[..2], &0x671cu16.to_le_bytes());
        assert_eq!(fractions.last().copied(), Some(1.0));
    }
}
