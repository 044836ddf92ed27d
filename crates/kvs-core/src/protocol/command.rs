//! Command descriptor blocks and fixed-format response decoders.
//!
//! Each supported operation has a constructor that produces the exact CDB
//! bytes the device expects, together with the transfer direction and any
//! payload. Length fields are validated against their field width; a
//! payload that cannot be represented is rejected, never truncated.

use byteorder::{BigEndian, ByteOrder};
use std::time::Duration;
use thiserror::Error;

use super::constants::{
    BUFFER_STATUS_SIZE, INQUIRY_SIZE, MAX_CDB_TRANSFER_LENGTH, OP_GET_DATA_BUFFER_STATUS,
    OP_INQUIRY, OP_MAINTENANCE, OP_READ, OP_REQUEST_SENSE, OP_SCAN, OP_SET_WINDOW,
    OP_TEST_UNIT_READY, PICTURE_SIZE_RESPONSE, READ_IMAGE, READ_PICTURE_ELEMENT_SIZE, SENSE_SIZE,
    SIDE_BACK_BIT, SUB_STOP_ADF, WINDOW_HEADER_SIZE, WINDOW_SIZE, command_name,
};
use super::window::WindowDescriptor;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("transfer length {length} does not fit the {width}-byte CDB field")]
    LengthOverflow { length: usize, width: usize },

    #[error("{what} response too short: expected {expected} bytes, got {actual}")]
    ShortResponse {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Direction of the data phase, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataDirection {
    #[default]
    None,
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

/// Raw command descriptor block. KV commands use 6 or 10 byte CDBs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cdb {
    bytes: [u8; 12],
    len: usize,
}

impl Cdb {
    fn new_6() -> Self {
        Self {
            bytes: [0; 12],
            len: 6,
        }
    }

    fn new_10() -> Self {
        Self {
            bytes: [0; 12],
            len: 10,
        }
    }

    /// The active CDB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }
}

/// A fully-built command: CDB, direction, payload and timeout.
/// Immutable once built; transports only read it.
#[derive(Debug, Clone)]
pub struct Command {
    pub cdb: Cdb,
    pub direction: DataDirection,
    /// Host-to-device payload; empty unless `direction` is `Out`.
    pub payload: Vec<u8>,
    /// Expected device-to-host byte count; zero unless `direction` is `In`.
    pub response_len: usize,
    /// `None` leaves the transport's own default in effect.
    pub timeout: Option<Duration>,
}

impl Command {
    fn non_data(cdb: Cdb) -> Self {
        Self {
            cdb,
            direction: DataDirection::None,
            payload: Vec::new(),
            response_len: 0,
            timeout: None,
        }
    }

    fn read_from_device(cdb: Cdb, response_len: usize) -> Self {
        Self {
            cdb,
            direction: DataDirection::In,
            payload: Vec::new(),
            response_len,
            timeout: None,
        }
    }

    fn write_to_device(cdb: Cdb, payload: Vec<u8>) -> Self {
        Self {
            cdb,
            direction: DataDirection::Out,
            payload,
            response_len: 0,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human-readable name for log output.
    pub fn name(&self) -> &'static str {
        let sub = match self.cdb.opcode() {
            0xE0 | 0xE1 => self.cdb.bytes[2],
            _ => 0,
        };
        command_name(self.cdb.opcode(), sub)
    }

    /// TEST UNIT READY (0x00).
    pub fn test_unit_ready() -> Self {
        let mut cdb = Cdb::new_6();
        cdb.bytes[0] = OP_TEST_UNIT_READY;
        Self::non_data(cdb)
    }

    /// REQUEST SENSE (0x03), allocating the fixed report size.
    pub fn request_sense() -> Self {
        let mut cdb = Cdb::new_6();
        cdb.bytes[0] = OP_REQUEST_SENSE;
        cdb.bytes[4] = SENSE_SIZE as u8;
        Self::read_from_device(cdb, SENSE_SIZE)
    }

    /// INQUIRY (0x12) with the 96-byte allocation the KV models fill.
    pub fn inquiry() -> Self {
        let mut cdb = Cdb::new_6();
        cdb.bytes[0] = OP_INQUIRY;
        cdb.bytes[4] = INQUIRY_SIZE as u8;
        Self::read_from_device(cdb, INQUIRY_SIZE)
    }

    /// SCAN (0x1B): start scanning the configured windows.
    pub fn scan() -> Self {
        let mut cdb = Cdb::new_6();
        cdb.bytes[0] = OP_SCAN;
        Self::non_data(cdb)
    }

    /// STOP (0xE1/0x8B): stop the document feeder.
    pub fn stop() -> Self {
        let mut cdb = Cdb::new_10();
        cdb.bytes[0] = OP_MAINTENANCE;
        cdb.bytes[2] = SUB_STOP_ADF;
        Self::non_data(cdb)
    }

    /// RESET WINDOW (0x24 with zero transfer length).
    /// This resets more device state than just the windows.
    pub fn reset_window() -> Self {
        let mut cdb = Cdb::new_10();
        cdb.bytes[0] = OP_SET_WINDOW;
        Self::non_data(cdb)
    }

    /// SET WINDOW (0x24): window parameter header plus the 64-byte
    /// descriptor. `window_id` selects the target window; the back-side
    /// window of a duplex setup is `WINDOW_ID_BACK`.
    pub fn set_window(window: &WindowDescriptor, window_id: u8) -> Self {
        let mut payload = vec![0u8; WINDOW_HEADER_SIZE + WINDOW_SIZE];
        BigEndian::write_u16(&mut payload[6..8], WINDOW_SIZE as u16);
        payload[WINDOW_HEADER_SIZE..].copy_from_slice(&window.encode());
        payload[WINDOW_HEADER_SIZE] = window_id;

        let mut cdb = Cdb::new_10();
        cdb.bytes[0] = OP_SET_WINDOW;
        put_be24(&mut cdb.bytes[6..9], payload.len() as u32);
        Self::write_to_device(cdb, payload)
    }

    /// READ (0x28) sub-type IMAGE: up to `length` bytes of image data for
    /// the given hardware page index and side.
    pub fn read_image(page: u8, back: bool, length: usize) -> Result<Self, CommandError> {
        if length > MAX_CDB_TRANSFER_LENGTH {
            return Err(CommandError::LengthOverflow { length, width: 3 });
        }
        let cdb = read_cdb(READ_IMAGE, page, back, length as u32);
        Ok(Self::read_from_device(cdb, length))
    }

    /// READ (0x28) sub-type PICTURE ELEMENT SIZE: pixel dimensions of a
    /// buffered page/side.
    pub fn picture_element_size(page: u8, back: bool) -> Self {
        let cdb = read_cdb(
            READ_PICTURE_ELEMENT_SIZE,
            page,
            back,
            PICTURE_SIZE_RESPONSE as u32,
        );
        Self::read_from_device(cdb, PICTURE_SIZE_RESPONSE)
    }

    /// GET DATA BUFFER STATUS (0x34).
    pub fn buffer_status() -> Self {
        let mut cdb = Cdb::new_10();
        cdb.bytes[0] = OP_GET_DATA_BUFFER_STATUS;
        put_be24(&mut cdb.bytes[6..9], BUFFER_STATUS_SIZE as u32);
        Self::read_from_device(cdb, BUFFER_STATUS_SIZE)
    }
}

fn read_cdb(sub_type: u8, page: u8, back: bool, length: u32) -> Cdb {
    let mut cdb = Cdb::new_10();
    cdb.bytes[0] = OP_READ;
    cdb.bytes[2] = sub_type;
    cdb.bytes[4] = page;
    cdb.bytes[5] = if back { SIDE_BACK_BIT } else { 0 };
    put_be24(&mut cdb.bytes[6..9], length);
    cdb
}

fn put_be24(dest: &mut [u8], value: u32) {
    dest[0] = (value >> 16) as u8;
    dest[1] = (value >> 8) as u8;
    dest[2] = value as u8;
}

// ============================================================================
// Response decoders
// ============================================================================

/// True if an INQUIRY response identifies a KV-series scanner: the model
/// string at bytes 16..19 starts with "KV-". Anything else is simply not
/// this device.
pub fn inquiry_matches(data: &[u8]) -> bool {
    data.len() >= 19 && &data[16..19] == b"KV-"
}

/// Decoded GET DATA BUFFER STATUS response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    pub window_id: u8,
    /// Image bytes ready to be read.
    pub available: u32,
}

pub fn parse_buffer_status(data: &[u8]) -> Result<BufferStatus, CommandError> {
    if data.len() < BUFFER_STATUS_SIZE {
        return Err(CommandError::ShortResponse {
            what: "GET DATA BUFFER STATUS",
            expected: BUFFER_STATUS_SIZE,
            actual: data.len(),
        });
    }
    let available = (data[9] as u32) << 16 | (data[10] as u32) << 8 | data[11] as u32;
    Ok(BufferStatus {
        window_id: data[4],
        available,
    })
}

/// Decode a PICTURE ELEMENT SIZE response into (width, height) pixels.
pub fn parse_picture_size(data: &[u8]) -> Result<(u32, u32), CommandError> {
    if data.len() < PICTURE_SIZE_RESPONSE {
        return Err(CommandError::ShortResponse {
            what: "PICTURE ELEMENT SIZE",
            expected: PICTURE_SIZE_RESPONSE,
            actual: data.len(),
        });
    }
    Ok((
        BigEndian::read_u32(&data[0..4]),
        BigEndian::read_u32(&data[4..8]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::WINDOW_ID_BACK;
    use crate::protocol::window::WindowDescriptor;

    #[test]
    fn test_test_unit_ready_cdb() {
        let cmd = Command::test_unit_ready();
        assert_eq!(cmd.cdb.as_bytes(), &[0, 0, 0, 0, 0, 0]);
        assert_eq!(cmd.direction, DataDirection::None);
    }

    #[test]
    fn test_inquiry_cdb() {
        let cmd = Command::inquiry();
        assert_eq!(cmd.cdb.as_bytes(), &[0x12, 0, 0, 0, 0x60, 0]);
        assert_eq!(cmd.response_len, 96);
    }

    #[test]
    fn test_request_sense_cdb() {
        let cmd = Command::request_sense();
        assert_eq!(cmd.cdb.as_bytes(), &[0x03, 0, 0, 0, 20, 0]);
    }

    #[test]
    fn test_stop_cdb() {
        let cmd = Command::stop();
        assert_eq!(cmd.cdb.as_bytes(), &[0xe1, 0, 0x8b, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(cmd.name(), "STOP ADF");
    }

    #[test]
    fn test_read_image_cdb() {
        let cmd = Command::read_image(3, true, 0x10000).unwrap();
        assert_eq!(
            cmd.cdb.as_bytes(),
            &[0x28, 0, 0, 0, 3, 0x80, 0x01, 0x00, 0x00, 0]
        );
        assert_eq!(cmd.response_len, 0x10000);
    }

    #[test]
    fn test_read_image_rejects_oversize_length() {
        assert!(matches!(
            Command::read_image(0, false, 0x1_000_000),
            Err(CommandError::LengthOverflow { .. })
        ));
    }

    #[test]
    fn test_picture_element_size_cdb() {
        let cmd = Command::picture_element_size(2, false);
        assert_eq!(cmd.cdb.as_bytes(), &[0x28, 0, 0x80, 0, 2, 0, 0, 0, 16, 0]);
    }

    #[test]
    fn test_buffer_status_cdb() {
        let cmd = Command::buffer_status();
        assert_eq!(cmd.cdb.as_bytes(), &[0x34, 0, 0, 0, 0, 0, 0, 0, 12, 0]);
    }

    #[test]
    fn test_set_window_payload() {
        let window = WindowDescriptor::usb_defaults();
        let cmd = Command::set_window(&window, 0);
        assert_eq!(cmd.payload.len(), 72);
        // Transfer length mirrors the payload size.
        assert_eq!(cmd.cdb.as_bytes(), &[0x24, 0, 0, 0, 0, 0, 0, 0, 72, 0]);
        // Parameter header carries the descriptor length at bytes 6..8.
        assert_eq!(&cmd.payload[..8], &[0, 0, 0, 0, 0, 0, 0, 64]);
        assert_eq!(cmd.payload[8], 0);
    }

    #[test]
    fn test_set_window_back_side_id() {
        let window = WindowDescriptor::usb_defaults();
        let cmd = Command::set_window(&window, WINDOW_ID_BACK);
        assert_eq!(cmd.payload[8], 0x80);
        // Only the identifier differs between the two sides.
        let front = Command::set_window(&window, 0);
        assert_eq!(&cmd.payload[9..], &front.payload[9..]);
    }

    #[test]
    fn test_reset_window_has_no_payload() {
        let cmd = Command::reset_window();
        assert_eq!(cmd.cdb.as_bytes(), &[0x24, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(cmd.direction, DataDirection::None);
        assert!(cmd.payload.is_empty());
    }

    #[test]
    fn test_inquiry_match() {
        let mut data = [0u8; 96];
        data[16..21].copy_from_slice(b"KV-S3");
        assert!(inquiry_matches(&data));

        data[16..21].copy_from_slice(b"HP Sc");
        assert!(!inquiry_matches(&data));
        assert!(!inquiry_matches(&data[..10]));
    }

    #[test]
    fn test_parse_buffer_status() {
        let mut data = [0u8; 12];
        data[4] = 0x80;
        data[9] = 0x01;
        data[10] = 0x02;
        data[11] = 0x03;
        let status = parse_buffer_status(&data).unwrap();
        assert_eq!(status.window_id, 0x80);
        assert_eq!(status.available, 0x010203);

        assert!(parse_buffer_status(&data[..8]).is_err());
    }

    #[test]
    fn test_parse_picture_size() {
        let mut data = [0u8; 16];
        data[..4].copy_from_slice(&2550u32.to_be_bytes());
        data[4..8].copy_from_slice(&3300u32.to_be_bytes());
        assert_eq!(parse_picture_size(&data).unwrap(), (2550, 3300));
        assert!(parse_picture_size(&data[..8]).is_err());
    }
}
