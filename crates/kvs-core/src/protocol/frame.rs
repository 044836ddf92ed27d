//! USB bulk frame codec.
//!
//! Every exchange with the USB variant wraps its blocks in a 12-byte header.
//! A command block always carries a fixed 12-byte CDB region (zero padded);
//! data travels in a separate block, and the exchange ends with a 4-byte
//! big-endian status word following a response header.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::command::Command;
use super::constants::{
    COMMAND_BLOCK, COMMAND_CODE, DATA_BLOCK, DATA_CODE, FRAME_CDB_REGION, FRAME_HEADER_SIZE,
    STATUS_SIZE,
};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame too small: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Bulk block header (12 bytes, all fields big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total block length including this header.
    pub length: u32,
    /// Block type: command, data or response.
    pub block_type: u16,
    /// Block code: 0x9000 command, 0xb000 data, 0xa000 response.
    pub block_code: u16,
    pub transaction_id: u32,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        // Writes into a fixed array cannot fail.
        cursor.write_u32::<BigEndian>(self.length).unwrap();
        cursor.write_u16::<BigEndian>(self.block_type).unwrap();
        cursor.write_u16::<BigEndian>(self.block_code).unwrap();
        cursor.write_u32::<BigEndian>(self.transaction_id).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            length: cursor.read_u32::<BigEndian>().map_err(|_| FrameError::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })?,
            block_type: cursor.read_u16::<BigEndian>().unwrap_or(0),
            block_code: cursor.read_u16::<BigEndian>().unwrap_or(0),
            transaction_id: cursor.read_u32::<BigEndian>().unwrap_or(0),
        })
    }
}

/// Build the command block for a CDB: header plus the fixed-width CDB
/// region, padded with zero regardless of the actual CDB length.
pub fn command_frame(command: &Command, transaction_id: u32) -> Vec<u8> {
    let total = FrameHeader::SIZE + FRAME_CDB_REGION;
    let header = FrameHeader {
        length: total as u32,
        block_type: COMMAND_BLOCK,
        block_code: COMMAND_CODE,
        transaction_id,
    };
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(command.cdb.as_bytes());
    frame.resize(total, 0);
    frame
}

/// Build the data block carrying a host-to-device payload.
pub fn data_frame(payload: &[u8], transaction_id: u32) -> Vec<u8> {
    let total = FrameHeader::SIZE + payload.len();
    let header = FrameHeader {
        length: total as u32,
        block_type: DATA_BLOCK,
        block_code: DATA_CODE,
        transaction_id,
    };
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Extract the status word from the final response block
/// (header followed by a 4-byte big-endian status).
pub fn parse_status(response: &[u8]) -> Result<u32, FrameError> {
    let expected = FrameHeader::SIZE + STATUS_SIZE;
    if response.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            actual: response.len(),
        });
    }
    let mut cursor = Cursor::new(&response[FrameHeader::SIZE..]);
    Ok(cursor.read_u32::<BigEndian>().unwrap_or(0))
}
