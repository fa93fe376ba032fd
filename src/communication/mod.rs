//! Flight controller communication
//!
//! - **mavlink**: parameter protocol, MAVFTP and the packed parameter
//!   file over a MAVLink link, plus the transport independent
//!   [`ProtocolClient`](mavlink::ProtocolClient)
//! - **logs**: locating and downloading the newest flight log

pub mod logs;
pub mod mavlink;
