//! MAVLink UDP link to a flight controller
//!
//! Implements [`ParamTransport`] and [`FileTransfer`] over MAVLink v2
//! datagrams. Every receive is bounded by a socket read timeout; incoming
//! messages are routed into per-service queues so a parameter broadcast
//! arriving during a file transfer is not lost.
//!
//! # Addresses
//!
//! - `udpin:0.0.0.0:14550` listens; the first sender becomes the peer
//! - `udpout:192.168.4.1:14550` sends to a fixed peer

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use mavlink::common::{
    MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavParamType, MavProtocolCapability, MavState,
    MavType, COMMAND_LONG_DATA, FILE_TRANSFER_PROTOCOL_DATA, HEARTBEAT_DATA,
    PARAM_REQUEST_LIST_DATA, PARAM_REQUEST_READ_DATA, PARAM_SET_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;

use ardu_configurator_core::traits::{
    DirEntry, FileTransfer, FileTransferError, ParamTransport, ParamValueMsg, TransportError,
};

use super::ftp::{FtpLink, FtpSession, FTP_PAYLOAD_LEN};

/// System id used by ground stations
const GCS_SYSTEM_ID: u8 = 255;

/// MAV_COMP_ID_MISSIONPLANNER
const GCS_COMPONENT_ID: u8 = 190;

/// AUTOPILOT_VERSION message id
const MSG_ID_AUTOPILOT_VERSION: f32 = 148.0;

/// Per-request wait of the MAVFTP session
const FTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for AUTOPILOT_VERSION after the heartbeat
const VERSION_TIMEOUT: Duration = Duration::from_secs(2);

fn io_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Io(e.to_string())
}

/// Decode a NUL padded 16 byte parameter id
fn decode_param_id(id: &[u8; 16]) -> String {
    let end = id.iter().position(|&b| b == 0).unwrap_or(id.len());
    String::from_utf8_lossy(&id[..end]).into_owned()
}

/// Encode a parameter name into a NUL padded 16 byte id
fn encode_param_id(name: &str) -> [u8; 16] {
    let mut id = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(16);
    id[..len].copy_from_slice(&bytes[..len]);
    id
}

/// True if a heartbeat comes from an autopilot rather than another ground station
fn is_vehicle_heartbeat(data: &HEARTBEAT_DATA) -> bool {
    data.mavtype != MavType::MAV_TYPE_GCS
        && data.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
}

/// Decode every MAVLink v2 message in one datagram
///
/// Frames with a bad checksum are skipped by the reader; frames that fail
/// to decode are logged and skipped so later frames still arrive.
fn parse_datagram(data: &[u8]) -> Vec<(MavHeader, MavMessage)> {
    let mut reader = PeekReader::new(Cursor::new(data));
    let mut messages = Vec::new();
    loop {
        match mavlink::read_v2_msg::<MavMessage, _>(&mut reader) {
            Ok(parsed) => messages.push(parsed),
            Err(MessageReadError::Parse(e)) => {
                crate::log_debug!("Skipping undecodable MAVLink frame: {}", e);
            }
            Err(MessageReadError::Io(_)) => break,
        }
    }
    messages
}

/// Socket plus message routing, shared by the parameter and FTP services
struct MavlinkLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    sequence: u8,
    target_system: u8,
    target_component: u8,
    pending_params: VecDeque<ParamValueMsg>,
    pending_ftp: VecDeque<Vec<u8>>,
    ftp_capable: Option<bool>,
    recv_buf: Vec<u8>,
}

impl MavlinkLink {
    fn send(&mut self, msg: &MavMessage) -> Result<(), TransportError> {
        let Some(addr) = self.peer else {
            return Err(TransportError::Disconnected);
        };
        let header = MavHeader {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = Cursor::new(Vec::with_capacity(280));
        mavlink::write_v2_msg(&mut buf, header, msg).map_err(|e| io_err(format!("{e:?}")))?;
        self.socket.send_to(&buf.into_inner(), addr).map_err(io_err)?;
        Ok(())
    }

    /// Receive one datagram and route its messages
    ///
    /// Returns `Ok(false)` if nothing arrived within `timeout`.
    fn pump(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        if timeout.is_zero() {
            self.socket.set_nonblocking(true).map_err(io_err)?;
        } else {
            self.socket.set_nonblocking(false).map_err(io_err)?;
            self.socket.set_read_timeout(Some(timeout)).map_err(io_err)?;
        }

        let (len, addr) = match self.socket.recv_from(&mut self.recv_buf) {
            Ok(received) => received,
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                return Ok(false)
            }
            Err(e) => return Err(io_err(e)),
        };
        if self.peer.is_none() {
            crate::log_info!("Flight controller link established with {}", addr);
            self.peer = Some(addr);
        }

        for (header, msg) in parse_datagram(&self.recv_buf[..len]) {
            self.route(header, msg);
        }
        Ok(true)
    }

    fn route(&mut self, header: MavHeader, msg: MavMessage) {
        if self.target_system != 0 && header.system_id != self.target_system {
            return;
        }
        match msg {
            MavMessage::HEARTBEAT(data)
                if self.target_system == 0 && is_vehicle_heartbeat(&data) =>
            {
                self.target_system = header.system_id;
                self.target_component = header.component_id;
            }
            MavMessage::PARAM_VALUE(data) => self.pending_params.push_back(ParamValueMsg {
                name: decode_param_id(&data.param_id),
                value: data.param_value as f64,
                index: data.param_index,
                count: data.param_count,
            }),
            MavMessage::FILE_TRANSFER_PROTOCOL(data) => {
                self.pending_ftp.push_back(data.payload.to_vec());
            }
            MavMessage::AUTOPILOT_VERSION(data) => {
                let ftp = data
                    .capabilities
                    .contains(MavProtocolCapability::MAV_PROTOCOL_CAPABILITY_FTP);
                self.ftp_capable = Some(ftp);
            }
            _ => {}
        }
    }

    /// Pump until `done` holds or `timeout` elapses
    fn pump_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&Self) -> bool,
    ) -> Result<bool, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if done(self) {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.pump(remaining)?;
        }
    }

    fn command_long(&mut self, command: MavCmd, param1: f32) -> Result<(), TransportError> {
        let msg = MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        });
        self.send(&msg)
    }
}

impl FtpLink for MavlinkLink {
    fn send_ftp(&mut self, payload: &[u8; FTP_PAYLOAD_LEN]) -> Result<(), TransportError> {
        let msg = MavMessage::FILE_TRANSFER_PROTOCOL(FILE_TRANSFER_PROTOCOL_DATA {
            target_network: 0,
            target_system: self.target_system,
            target_component: self.target_component,
            payload: *payload,
        });
        self.send(&msg)
    }

    fn recv_ftp(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        self.pump_until(timeout, |link| !link.pending_ftp.is_empty())?;
        Ok(self.pending_ftp.pop_front())
    }
}

/// MAVLink connection to a single flight controller
pub struct MavlinkTransport {
    link: MavlinkLink,
    ftp: FtpSession,
}

impl MavlinkTransport {
    /// Open the link and wait up to `timeout` for the flight controller's heartbeat
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        let (socket, peer) = match address.split_once(':') {
            Some(("udpin", bind)) => (UdpSocket::bind(bind).map_err(io_err)?, None),
            Some(("udpout", target)) => {
                let peer: SocketAddr = target.parse().map_err(io_err)?;
                (UdpSocket::bind("0.0.0.0:0").map_err(io_err)?, Some(peer))
            }
            _ => return Err(TransportError::Io(format!("unsupported address {address}"))),
        };

        let mut transport = Self {
            link: MavlinkLink {
                socket,
                peer,
                sequence: 0,
                target_system: 0,
                target_component: 0,
                pending_params: VecDeque::new(),
                pending_ftp: VecDeque::new(),
                ftp_capable: None,
                recv_buf: vec![0u8; 2048],
            },
            ftp: FtpSession::new(FTP_REQUEST_TIMEOUT),
        };
        transport.handshake(timeout)?;
        Ok(transport)
    }

    fn handshake(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.link.peer.is_some() {
            let heartbeat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
                custom_mode: 0,
                mavtype: MavType::MAV_TYPE_GCS,
                autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
                base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
                system_status: MavState::MAV_STATE_ACTIVE,
                mavlink_version: 3,
            });
            self.link.send(&heartbeat)?;
        }
        if !self.link.pump_until(timeout, |link| link.target_system != 0)? {
            return Err(TransportError::Timeout);
        }
        crate::log_info!(
            "Heartbeat from system {} component {}",
            self.link.target_system,
            self.link.target_component
        );

        self.link
            .command_long(MavCmd::MAV_CMD_REQUEST_MESSAGE, MSG_ID_AUTOPILOT_VERSION)?;
        if !self
            .link
            .pump_until(VERSION_TIMEOUT, |link| link.ftp_capable.is_some())?
        {
            crate::log_warn!("No AUTOPILOT_VERSION received, assuming no MAVFTP support");
        }
        Ok(())
    }

    /// System id of the connected flight controller
    pub fn target_system(&self) -> u8 {
        self.link.target_system
    }
}

impl ParamTransport for MavlinkTransport {
    fn request_list(&mut self) -> Result<(), TransportError> {
        self.link.pending_params.clear();
        let msg = MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
            target_system: self.link.target_system,
            target_component: self.link.target_component,
        });
        self.link.send(&msg)
    }

    fn request_read(&mut self, name: &str) -> Result<(), TransportError> {
        self.link.pending_params.clear();
        let msg = MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
            param_index: -1,
            target_system: self.link.target_system,
            target_component: self.link.target_component,
            param_id: encode_param_id(name),
        });
        self.link.send(&msg)
    }

    fn send_set(&mut self, name: &str, value: f64) -> Result<(), TransportError> {
        let msg = MavMessage::PARAM_SET(PARAM_SET_DATA {
            param_value: value as f32,
            target_system: self.link.target_system,
            target_component: self.link.target_component,
            param_id: encode_param_id(name),
            param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
        });
        self.link.send(&msg)
    }

    fn recv_value(&mut self, timeout: Duration) -> Result<Option<ParamValueMsg>, TransportError> {
        self.link
            .pump_until(timeout, |link| !link.pending_params.is_empty())?;
        if self.link.pending_params.is_empty() && timeout.is_zero() {
            self.link.pump(Duration::ZERO)?;
        }
        Ok(self.link.pending_params.pop_front())
    }

    fn supports_bulk_transfer(&self) -> bool {
        self.link.ftp_capable.unwrap_or(false)
    }

    fn reboot(&mut self) -> Result<(), TransportError> {
        crate::log_info!("Rebooting flight controller");
        self.link
            .command_long(MavCmd::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN, 1.0)
    }

    fn file_transfer(&mut self) -> Option<&mut dyn FileTransfer> {
        if self.supports_bulk_transfer() {
            Some(self)
        } else {
            None
        }
    }
}

impl FileTransfer for MavlinkTransport {
    fn read_file(
        &mut self,
        path: &str,
        timeout: Duration,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>, FileTransferError> {
        self.ftp.read_file(&mut self.link, path, timeout, progress)
    }

    fn write_file(
        &mut self,
        path: &str,
        data: &[u8],
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), FileTransferError> {
        self.ftp.write_file(&mut self.link, path, data, progress)
    }

    fn list_directory(&mut self, path: &str) -> Result<Vec<DirEntry>, FileTransferError> {
        self.ftp.list_directory(&mut self.link, path)
    }

    fn open_probe(&mut self, path: &str, timeout: Duration) -> Result<bool, FileTransferError> {
        self.ftp.open_probe(&mut self.link, path, timeout)
    }
}
