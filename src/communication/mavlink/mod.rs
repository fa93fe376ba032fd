//! MAVLink Parameter and File Communication
//!
//! This module talks to ArduPilot flight controllers over MAVLink 2.0.
//!
//! # Architecture
//!
//! - **Client**: Download/set/fetch of parameters and whole-file transfers,
//!   generic over any [`ParamTransport`](ardu_configurator_core::traits::ParamTransport)
//! - **Transport**: UDP MAVLink link routing PARAM_* and FILE_TRANSFER_PROTOCOL messages
//! - **FTP**: MAVFTP request/reply session
//! - **Param pack**: Decoder for `@PARAM/param.pck`

pub mod client; // Parameter and file client
pub mod ftp; // MAVFTP session
pub mod param_pack; // Packed parameter file decoder
pub mod transport; // UDP MAVLink transport

pub use client::{ClientConfig, FileTransferOutcome, PercentProgress, ProtocolClient};
pub use ftp::{FtpLink, FtpSession};
pub use param_pack::{decode_param_pack, PackedParameters, PARAM_PACK_PATH};
pub use transport::MavlinkTransport;
