//! MAVFTP client session
//!
//! File access over FILE_TRANSFER_PROTOCOL messages. The session is
//! independent of how payloads travel; [`FtpLink`] carries them.
//!
//! # Payload layout (little endian)
//!
//! | Bytes  | Field            |
//! |--------|------------------|
//! | 0..2   | sequence number  |
//! | 2      | session id       |
//! | 3      | opcode           |
//! | 4      | data size        |
//! | 5      | request opcode   |
//! | 6      | burst complete   |
//! | 7      | padding          |
//! | 8..12  | offset           |
//! | 12..   | data (239 max)   |
//!
//! A reply carries the sequence number of its request plus one and the
//! request's opcode in `req_opcode`. A NAK carries the error code in the
//! first data byte.

use std::time::Duration;

use ardu_configurator_core::traits::{
    ftp_error_message, DirEntry, FileTransferError, RemoteError, TransportError, FTP_ERR_EOF,
    FTP_ERR_FAIL,
};

/// Size of the FILE_TRANSFER_PROTOCOL payload
pub const FTP_PAYLOAD_LEN: usize = 251;

/// Header bytes before the data field
pub const FTP_HEADER_LEN: usize = 12;

/// Maximum data bytes per packet
pub const FTP_MAX_DATA: usize = FTP_PAYLOAD_LEN - FTP_HEADER_LEN;

/// Attempts per request before giving up on a silent link
const MAX_ATTEMPTS: usize = 3;

/// MAVFTP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FtpOpcode {
    None = 0,
    TerminateSession = 1,
    ResetSessions = 2,
    ListDirectory = 3,
    OpenFileRO = 4,
    ReadFile = 5,
    CreateFile = 6,
    WriteFile = 7,
    Ack = 128,
    Nak = 129,
}

impl FtpOpcode {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => FtpOpcode::None,
            1 => FtpOpcode::TerminateSession,
            2 => FtpOpcode::ResetSessions,
            3 => FtpOpcode::ListDirectory,
            4 => FtpOpcode::OpenFileRO,
            5 => FtpOpcode::ReadFile,
            6 => FtpOpcode::CreateFile,
            7 => FtpOpcode::WriteFile,
            128 => FtpOpcode::Ack,
            129 => FtpOpcode::Nak,
            _ => return None,
        })
    }
}

/// One decoded MAVFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpPacket {
    pub seq: u16,
    pub session: u8,
    pub opcode: FtpOpcode,
    /// Data length, or the number of bytes wanted for a ReadFile request
    pub size: u8,
    pub req_opcode: FtpOpcode,
    pub burst_complete: bool,
    pub offset: u32,
    pub data: Vec<u8>,
}

impl FtpPacket {
    /// Request packet with no data
    pub fn request(opcode: FtpOpcode, session: u8, offset: u32) -> Self {
        Self {
            seq: 0,
            session,
            opcode,
            size: 0,
            req_opcode: FtpOpcode::None,
            burst_complete: false,
            offset,
            data: Vec::new(),
        }
    }

    /// Attach data, truncated to what fits in one packet
    pub fn with_data(mut self, data: &[u8]) -> Self {
        let len = data.len().min(FTP_MAX_DATA);
        self.data = data[..len].to_vec();
        self.size = len as u8;
        self
    }

    /// Encode into a fixed-size payload
    pub fn encode(&self) -> [u8; FTP_PAYLOAD_LEN] {
        let mut buf = [0u8; FTP_PAYLOAD_LEN];
        buf[0..2].copy_from_slice(&self.seq.to_le_bytes());
        buf[2] = self.session;
        buf[3] = self.opcode as u8;
        buf[4] = self.size;
        buf[5] = self.req_opcode as u8;
        buf[6] = self.burst_complete as u8;
        buf[8..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[FTP_HEADER_LEN..FTP_HEADER_LEN + self.data.len()].copy_from_slice(&self.data);
        buf
    }

    /// Decode a payload; `None` for unknown opcodes or short buffers
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FTP_HEADER_LEN {
            return None;
        }
        let size = (buf[4] as usize).min(buf.len() - FTP_HEADER_LEN);
        Some(Self {
            seq: u16::from_le_bytes([buf[0], buf[1]]),
            session: buf[2],
            opcode: FtpOpcode::from_u8(buf[3])?,
            size: buf[4],
            req_opcode: FtpOpcode::from_u8(buf[5])?,
            burst_complete: buf[6] != 0,
            offset: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            data: buf[FTP_HEADER_LEN..FTP_HEADER_LEN + size].to_vec(),
        })
    }

    fn nak_code(&self) -> u8 {
        self.data.first().copied().unwrap_or(FTP_ERR_FAIL)
    }
}

/// Carrier for MAVFTP payloads
pub trait FtpLink {
    /// Send one payload to the flight controller
    fn send_ftp(&mut self, payload: &[u8; FTP_PAYLOAD_LEN]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next payload from the flight controller
    fn recv_ftp(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

fn remote(code: u8) -> FileTransferError {
    FileTransferError::Remote(RemoteError {
        code,
        message: ftp_error_message(code).to_string(),
    })
}

/// Parse a ListDirectory reply body
///
/// Entries are NUL separated: `F<name>\t<size>`, `D<name>` or `S` (skip).
pub fn parse_directory_entries(data: &[u8]) -> Vec<DirEntry> {
    data.split(|&b| b == 0)
        .filter(|raw| !raw.is_empty())
        .filter_map(|raw| {
            let text = String::from_utf8_lossy(raw);
            let mut chars = text.chars();
            let kind = chars.next()?;
            let rest = chars.as_str();
            match kind {
                'F' => {
                    let (name, size) = rest.split_once('\t').unwrap_or((rest, "0"));
                    Some(DirEntry {
                        name: name.to_string(),
                        size: size.trim().parse().unwrap_or(0),
                        is_dir: false,
                    })
                }
                'D' => Some(DirEntry {
                    name: rest.to_string(),
                    size: 0,
                    is_dir: true,
                }),
                _ => None,
            }
        })
        .collect()
}

/// Client side MAVFTP state
#[derive(Debug, Default)]
pub struct FtpSession {
    seq: u16,
    request_timeout: Duration,
}

impl FtpSession {
    /// Create a session whose requests wait `request_timeout` per attempt
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            seq: 0,
            request_timeout,
        }
    }

    /// Send a request and wait for its ACK
    ///
    /// Retries on silence; a NAK is returned as a remote error.
    fn transact<L: FtpLink + ?Sized>(
        &mut self,
        link: &mut L,
        mut packet: FtpPacket,
        timeout: Duration,
    ) -> Result<FtpPacket, FileTransferError> {
        self.seq = self.seq.wrapping_add(1);
        packet.seq = self.seq;
        let payload = packet.encode();
        let expected_seq = self.seq.wrapping_add(1);

        for attempt in 1..=MAX_ATTEMPTS {
            link.send_ftp(&payload)?;
            while let Some(raw) = link.recv_ftp(timeout)? {
                let Some(reply) = FtpPacket::decode(&raw) else {
                    continue;
                };
                if reply.req_opcode != packet.opcode || reply.seq != expected_seq {
                    crate::log_trace!("Ignoring stale FTP reply seq {}", reply.seq);
                    continue;
                }
                self.seq = reply.seq;
                return match reply.opcode {
                    FtpOpcode::Ack => Ok(reply),
                    FtpOpcode::Nak => Err(remote(reply.nak_code())),
                    _ => Err(remote(FTP_ERR_FAIL)),
                };
            }
            crate::log_debug!(
                "FTP {:?} attempt {}/{} timed out",
                packet.opcode,
                attempt,
                MAX_ATTEMPTS
            );
        }
        Err(FileTransferError::Transport(TransportError::Timeout))
    }

    /// Drop every open session on the flight controller
    pub fn reset_sessions<L: FtpLink + ?Sized>(
        &mut self,
        link: &mut L,
    ) -> Result<(), FileTransferError> {
        let timeout = self.request_timeout;
        self.transact(link, FtpPacket::request(FtpOpcode::ResetSessions, 0, 0), timeout)
            .map(|_| ())
    }

    fn terminate<L: FtpLink + ?Sized>(&mut self, link: &mut L, session: u8) {
        let timeout = self.request_timeout;
        let packet = FtpPacket::request(FtpOpcode::TerminateSession, session, 0);
        if let Err(e) = self.transact(link, packet, timeout) {
            crate::log_debug!("FTP terminate of session {} failed: {}", session, e);
        }
    }

    /// Read a whole file
    pub fn read_file<L: FtpLink + ?Sized>(
        &mut self,
        link: &mut L,
        path: &str,
        timeout: Duration,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>, FileTransferError> {
        if let Err(e) = self.reset_sessions(link) {
            crate::log_debug!("FTP session reset failed: {}", e);
        }
        let open = FtpPacket::request(FtpOpcode::OpenFileRO, 0, 0).with_data(path.as_bytes());
        let ack = self.transact(link, open, timeout)?;
        let session = ack.session;
        let size = match ack.data.get(0..4) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize,
            None => 0,
        };

        let mut data = Vec::with_capacity(size);
        let result = loop {
            let mut read = FtpPacket::request(FtpOpcode::ReadFile, session, data.len() as u32);
            read.size = FTP_MAX_DATA as u8;
            match self.transact(link, read, timeout) {
                Ok(reply) if reply.data.is_empty() => break Ok(()),
                Ok(reply) => {
                    data.extend_from_slice(&reply.data);
                    if size > 0 {
                        progress((data.len() as f32 / size as f32).min(1.0));
                    }
                    if size > 0 && data.len() >= size {
                        break Ok(());
                    }
                }
                Err(FileTransferError::Remote(e)) if e.code == FTP_ERR_EOF => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.terminate(link, session);
        result?;
        progress(1.0);
        Ok(data)
    }

    /// Create or overwrite a file
    pub fn write_file<L: FtpLink + ?Sized>(
        &mut self,
        link: &mut L,
        path: &str,
        contents: &[u8],
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), FileTransferError> {
        let timeout = self.request_timeout;
        if let Err(e) = self.reset_sessions(link) {
            crate::log_debug!("FTP session reset failed: {}", e);
        }
        let create = FtpPacket::request(FtpOpcode::CreateFile, 0, 0).with_data(path.as_bytes());
        let session = self.transact(link, create, timeout)?.session;

        let mut result = Ok(());
        let mut offset = 0usize;
        for chunk in contents.chunks(FTP_MAX_DATA) {
            let write =
                FtpPacket::request(FtpOpcode::WriteFile, session, offset as u32).with_data(chunk);
            if let Err(e) = self.transact(link, write, timeout) {
                result = Err(e);
                break;
            }
            offset += chunk.len();
            progress(offset as f32 / contents.len() as f32);
        }
        self.terminate(link, session);
        result?;
        progress(1.0);
        Ok(())
    }

    /// List a directory
    pub fn list_directory<L: FtpLink + ?Sized>(
        &mut self,
        link: &mut L,
        path: &str,
    ) -> Result<Vec<DirEntry>, FileTransferError> {
        let timeout = self.request_timeout;
        let mut entries = Vec::new();
        let mut offset = 0u32;
        loop {
            let list = FtpPacket::request(FtpOpcode::ListDirectory, 0, offset)
                .with_data(path.as_bytes());
            match self.transact(link, list, timeout) {
                Ok(reply) => {
                    let raw_count = reply.data.split(|&b| b == 0).filter(|r| !r.is_empty()).count();
                    if raw_count == 0 {
                        break;
                    }
                    entries.extend(parse_directory_entries(&reply.data));
                    offset += raw_count as u32;
                }
                Err(FileTransferError::Remote(e)) if e.code == FTP_ERR_EOF => break,
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// Open then close a file to test for its existence
    pub fn open_probe<L: FtpLink + ?Sized>(
        &mut self,
        link: &mut L,
        path: &str,
        timeout: Duration,
    ) -> Result<bool, FileTransferError> {
        let open = FtpPacket::request(FtpOpcode::OpenFileRO, 0, 0).with_data(path.as_bytes());
        match self.transact(link, open, timeout) {
            Ok(ack) => {
                self.terminate(link, ack.session);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ardu_configurator_core::traits::FTP_ERR_FILE_NOT_FOUND;
    use std::collections::{BTreeMap, VecDeque};

    /// In-memory MAVFTP responder
    #[derive(Default)]
    struct FakeServer {
        files: BTreeMap<String, Vec<u8>>,
        open: BTreeMap<u8, String>,
        outbox: VecDeque<Vec<u8>>,
        drop_next: usize,
        requests: Vec<FtpOpcode>,
    }

    impl FakeServer {
        fn reply(&mut self, req: &FtpPacket, opcode: FtpOpcode, session: u8, data: &[u8]) {
            let mut pkt = FtpPacket::request(opcode, session, req.offset).with_data(data);
            pkt.seq = req.seq.wrapping_add(1);
            pkt.req_opcode = req.opcode;
            self.outbox.push_back(pkt.encode().to_vec());
        }

        fn nak(&mut self, req: &FtpPacket, code: u8) {
            self.reply(req, FtpOpcode::Nak, req.session, &[code]);
        }

        fn handle(&mut self, req: FtpPacket) {
            self.requests.push(req.opcode);
            let path = String::from_utf8_lossy(&req.data).to_string();
            match req.opcode {
                FtpOpcode::ResetSessions => {
                    self.open.clear();
                    self.reply(&req, FtpOpcode::Ack, 0, &[]);
                }
                FtpOpcode::TerminateSession => {
                    self.open.remove(&req.session);
                    self.reply(&req, FtpOpcode::Ack, req.session, &[]);
                }
                FtpOpcode::OpenFileRO => match self.files.get(&path) {
                    Some(contents) => {
                        let size = (contents.len() as u32).to_le_bytes();
                        self.open.insert(1, path);
                        self.reply(&req, FtpOpcode::Ack, 1, &size);
                    }
                    None => self.nak(&req, FTP_ERR_FILE_NOT_FOUND),
                },
                FtpOpcode::ReadFile => {
                    let Some(name) = self.open.get(&req.session).cloned() else {
                        return self.nak(&req, 4);
                    };
                    let len = self.files[&name].len();
                    let start = req.offset as usize;
                    if start >= len {
                        return self.nak(&req, FTP_ERR_EOF);
                    }
                    let end = (start + FTP_MAX_DATA).min(len);
                    let chunk = self.files[&name][start..end].to_vec();
                    self.reply(&req, FtpOpcode::Ack, req.session, &chunk);
                }
                FtpOpcode::CreateFile => {
                    self.files.insert(path.clone(), Vec::new());
                    self.open.insert(2, path);
                    self.reply(&req, FtpOpcode::Ack, 2, &[]);
                }
                FtpOpcode::WriteFile => {
                    let name = self.open[&req.session].clone();
                    let file = self.files.get_mut(&name).unwrap();
                    file.truncate(req.offset as usize);
                    file.extend_from_slice(&req.data);
                    self.reply(&req, FtpOpcode::Ack, req.session, &[]);
                }
                FtpOpcode::ListDirectory => {
                    let prefix = format!("{}/", path);
                    let names: Vec<String> = self
                        .files
                        .iter()
                        .filter(|(k, _)| k.starts_with(&prefix))
                        .map(|(k, v)| format!("F{}\t{}", &k[prefix.len()..], v.len()))
                        .collect();
                    let start = req.offset as usize;
                    if start >= names.len() {
                        return self.nak(&req, FTP_ERR_EOF);
                    }
                    // two entries per reply to exercise paging
                    let body: Vec<u8> = names[start..(start + 2).min(names.len())]
                        .iter()
                        .flat_map(|n| n.bytes().chain(std::iter::once(0)))
                        .collect();
                    self.reply(&req, FtpOpcode::Ack, 0, &body);
                }
                _ => self.nak(&req, 7),
            }
        }
    }

    impl FtpLink for FakeServer {
        fn send_ftp(&mut self, payload: &[u8; FTP_PAYLOAD_LEN]) -> Result<(), TransportError> {
            if self.drop_next > 0 {
                self.drop_next -= 1;
                return Ok(());
            }
            let req = FtpPacket::decode(payload).unwrap();
            self.handle(req);
            Ok(())
        }

        fn recv_ftp(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.outbox.pop_front())
        }
    }

    fn session() -> FtpSession {
        FtpSession::new(Duration::from_millis(100))
    }

    #[test]
    fn test_packet_layout() {
        let mut pkt = FtpPacket::request(FtpOpcode::ReadFile, 3, 0x0102_0304).with_data(b"ab");
        pkt.seq = 0x0a0b;
        let buf = pkt.encode();
        assert_eq!(&buf[0..2], &[0x0b, 0x0a]);
        assert_eq!(buf[2], 3);
        assert_eq!(buf[3], 5);
        assert_eq!(buf[4], 2);
        assert_eq!(&buf[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[12..14], b"ab");
        assert_eq!(FtpPacket::decode(&buf), Some(pkt));
    }

    #[test]
    fn test_directory_entry_parsing() {
        let entries = parse_directory_entries(b"F00000001.BIN\t1024\0DSUB\0S\0FLASTLOG.TXT\t2\0");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "00000001.BIN");
        assert_eq!(entries[0].size, 1024);
        assert!(entries[1].is_dir);
        assert_eq!(entries[2].name, "LASTLOG.TXT");
    }

    #[test]
    fn test_read_multi_chunk_file_with_progress() {
        let mut server = FakeServer::default();
        let contents: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
        server.files.insert("/APM/LOGS/00000003.BIN".into(), contents.clone());

        let mut fractions = Vec::new();
        let data = session()
            .read_file(
                &mut server,
                "/APM/LOGS/00000003.BIN",
                Duration::from_millis(100),
                &mut |f| fractions.push(f),
            )
            .unwrap();
        assert_eq!(data, contents);
        assert_eq!(fractions.last(), Some(&1.0));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert!(server.open.is_empty());
    }

    #[test]
    fn test_read_missing_file_is_not_found() {
        let mut server = FakeServer::default();
        let err = session()
            .read_file(&mut server, "/nope", Duration::from_millis(100), &mut |_| {})
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_retry_after_lost_request() {
        let mut server = FakeServer::default();
        server.files.insert("/a".into(), vec![1, 2, 3]);
        server.drop_next = 2;
        let mut ftp = session();
        assert!(ftp.open_probe(&mut server, "/a", Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_silent_link_times_out() {
        let mut server = FakeServer {
            drop_next: usize::MAX,
            ..Default::default()
        };
        let err = session()
            .open_probe(&mut server, "/a", Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, FileTransferError::Transport(TransportError::Timeout));
    }

    #[test]
    fn test_probe_missing_file() {
        let mut server = FakeServer::default();
        assert!(!session().open_probe(&mut server, "/x", Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_write_then_read_back() {
        let mut server = FakeServer::default();
        let contents = vec![7u8; 500];
        let mut ftp = session();
        let mut last = 0.0;
        ftp.write_file(&mut server, "/APM/upload.bin", &contents, &mut |f| last = f)
            .unwrap();
        assert_eq!(last, 1.0);
        assert_eq!(server.files["/APM/upload.bin"], contents);
        assert_eq!(
            server.requests.iter().filter(|op| **op == FtpOpcode::WriteFile).count(),
            3
        );
    }

    #[test]
    fn test_list_directory_pages() {
        let mut server = FakeServer::default();
        for n in 1..=5 {
            server.files.insert(format!("/APM/LOGS/{:08}.BIN", n), vec![0; n]);
        }
        let entries = session().list_directory(&mut server, "/APM/LOGS").unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[4].name, "00000005.BIN");
        assert_eq!(entries[4].size, 5);
    }
}
