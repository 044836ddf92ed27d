//! Sense report parsing and classification.
//!
//! Every failed command leaves a fixed 20-byte sense buffer describing what
//! went wrong. This module provides type-safe access to the interesting
//! fields and the KV-specific error string table.

use std::fmt;

use crate::protocol::constants::{
    CODE_ADF_STOPPED, CODE_INVALID_CDB_FIELD, CODE_OUT_OF_PAPER, SENSE_SIZE, TRANSIENT_ASCS,
};

/// Response code marking a current (as opposed to deferred) error.
const RESPONSE_CURRENT_ERROR: u8 = 0xf0;

/// Parsed sense report from the device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SenseReport {
    bytes: [u8; SENSE_SIZE],
}

/// A READ IMAGE that ended short because the page ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadShortfall {
    /// Bytes actually delivered into the buffer.
    pub delivered: usize,
    /// The last byte of the page is in the buffer.
    pub end_of_page: bool,
}

impl SenseReport {
    /// Create a report from raw sense bytes. Shorter buffers are zero
    /// padded; longer ones are truncated to the fixed report size.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut bytes = [0u8; SENSE_SIZE];
        let n = raw.len().min(SENSE_SIZE);
        bytes[..n].copy_from_slice(&raw[..n]);
        Self { bytes }
    }

    /// An all-zero report, as left behind by a successful command.
    pub const fn empty() -> Self {
        Self {
            bytes: [0; SENSE_SIZE],
        }
    }

    /// Raw report bytes.
    pub fn as_bytes(&self) -> &[u8; SENSE_SIZE] {
        &self.bytes
    }

    /// True if no sense information is present.
    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Sense key, the low nibble of byte 2.
    pub fn sense_key(&self) -> u8 {
        self.bytes[2] & 0x0f
    }

    /// Additional sense code.
    pub fn asc(&self) -> u8 {
        self.bytes[12]
    }

    /// Additional sense code qualifier.
    pub fn ascq(&self) -> u8 {
        self.bytes[13]
    }

    /// Combined 16-bit error code, `ASC << 8 | ASCQ`.
    ///
    /// See <http://www.t10.org/lists/asc-num.htm> for the standard values;
    /// codes 0x8000 and up are KV-specific.
    pub fn code(&self) -> u16 {
        (self.asc() as u16) << 8 | self.ascq() as u16
    }

    /// True if the condition is expected to clear on its own (unit
    /// attention or a unit still becoming ready). The SG transport retries
    /// these automatically.
    pub fn is_transient(&self) -> bool {
        TRANSIENT_ASCS.contains(&self.asc())
    }

    /// Out of paper: the feeder is empty. This ends the document, it does
    /// not fault the session.
    pub fn is_out_of_paper(&self) -> bool {
        self.sense_key() == 3 && self.code() == CODE_OUT_OF_PAPER
    }

    /// Invalid field in CDB. The scanner reports this when pages or sides
    /// are requested out of order.
    pub fn is_ordering_violation(&self) -> bool {
        self.sense_key() == 5 && self.code() == CODE_INVALID_CDB_FIELD
    }

    /// ADF stopped: a read issued after STOP drained the last buffered page.
    pub fn is_adf_stopped(&self) -> bool {
        self.sense_key() == 2 && self.code() == CODE_ADF_STOPPED
    }

    /// Decode the one sanctioned short-read condition.
    ///
    /// A READ IMAGE reaching the end of a page fails with a current error
    /// and the incorrect-length-indicator bit set; bytes 3..7 then carry the
    /// big-endian shortfall against the requested length, and the
    /// end-of-medium bit flags the final chunk of the page. Anything else
    /// returns `None` and stays a hard error.
    pub fn read_shortfall(&self, requested: usize) -> Option<ReadShortfall> {
        let current_error = self.bytes[0] == RESPONSE_CURRENT_ERROR;
        let ili = self.bytes[2] >> 5 & 1 == 1;
        if !current_error || !ili {
            return None;
        }
        let delta = u32::from_be_bytes([self.bytes[3], self.bytes[4], self.bytes[5], self.bytes[6]]);
        let delivered = requested.checked_sub(delta as usize)?;
        let end_of_page = self.bytes[2] >> 6 & 1 == 1;
        Some(ReadShortfall {
            delivered,
            end_of_page,
        })
    }

    /// Human-readable description of the condition, if the (sense key,
    /// code) pair is known. Table taken from the KV interface manual.
    pub fn message(&self) -> Option<&'static str> {
        let msg = match (self.sense_key(), self.code()) {
            (0, 0x0000) => "Sense code 0 returned",

            (2, 0x0000) => "Not ready",
            (2, 0x0401) => "Logical unit is in process of becoming ready",
            (2, 0x0480) => "Document lead door open",
            (2, 0x0481) => "Document discharge door open",
            (2, 0x0482) => "Post imprinter door open",
            (2, 0x8001) => "Scanner stopped",
            (2, 0x8002) => "ADF stopped",

            (3, 0x3a00) => "Out of paper",
            (3, 0x8001) => "Jammed at document lead",
            (3, 0x8002) => "Jammed at document discharge 1",
            (3, 0x8003) => "Jammed at document discharge 2",
            (3, 0x8004) => "Document internal rest",
            (3, 0x8006) => "Jammed at document feed 1",
            (3, 0x8007) => "Jammed at document feed 2",
            (3, 0x8008) => "Jammed at document feed 3",
            (3, 0x8009) => "Jammed at document feed 4",
            (3, 0x800a) => "Skew error",
            (3, 0x800b) => "Minimum media error",
            (3, 0x800c) => "Media length error",
            (3, 0x800d) => "Double feed error",
            (3, 0x800e) => "Barcode error",

            (4, 0x0880) => "Internal parameter error",
            (4, 0x0881) => "Internal DMA error",
            (4, 0x0882) => "Internal command error",
            (4, 0x8083) => "Internal communication error",
            (4, 0x4480) => "Internal RAM error",
            (4, 0x4481) => "Internal EEPROM error",
            (4, 0x4482) => "FPGA error",
            (4, 0x4700) => "SCSI parity error",
            (4, 0x8001) => "Lamp failure with regular temperature",
            (4, 0x8002) => "Document size detect error",
            (4, 0x8004) => "Document hopper error",
            (4, 0x8005) => "Document sensor adjust error",

            (5, 0x1a00) => "Parameter list length error",
            (5, 0x2000) => "Invalid command op code",
            (5, 0x2400) => "Invalid field in CDB",
            (5, 0x2500) => "Logical unit not supported",
            (5, 0x2600) => "Invalid field in parameter list",
            (5, 0x2c01) => "Too many windows",
            (5, 0x2c02) => "Invalid window combination",
            (5, 0x2c80) => "Out of memory",
            (5, 0x2c81) => "No back scanning unit",
            (5, 0x2c82) => "No imprinter unit",
            (5, 0x2c83) => "Pointer position error",
            (5, 0x2c84) => "Out of scanning page limit",
            (5, 0x2c85) => "Out of scanning length limit",
            (5, 0x2c86) => "Out of scanning resolution limit",
            (5, 0x2c87) => "Out of scanning line cycle limit",
            (5, 0x3d00) => "Invalid bits in identity message",

            (6, 0x2900) => "Unit attention",
            (6, 0x1b00) => "Sync data transfer error",
            (6, 0x4300) => "Message error",
            (6, 0x4900) => "Invalid message error",
            (6, 0x8001) => "Image data transfer error",

            _ => return None,
        };
        Some(msg)
    }
}

impl Default for SenseReport {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for SenseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SenseReport(key={} code={:04x} '{}')",
            self.sense_key(),
            self.code(),
            self.message().unwrap_or("unknown")
        )
    }
}

impl fmt::Display for SenseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{} (key {} code {:04x})", msg, self.sense_key(), self.code()),
            None => write!(f, "sense key {} code {:04x}", self.sense_key(), self.code()),
        }
    }
}

/// Build a sense buffer with the given key/ASC/ASCQ. Test scaffolding
/// shared by the transport and session tests.
#[cfg(test)]
pub(crate) fn sense(key: u8, asc: u8, ascq: u8) -> SenseReport {
    let mut bytes = [0u8; SENSE_SIZE];
    bytes[0] = 0xf0;
    bytes[2] = key & 0x0f;
    bytes[12] = asc;
    bytes[13] = ascq;
    SenseReport::from_bytes(&bytes)
}

/// Build the short-read sense: current error, ILI, optional EOM, delta.
#[cfg(test)]
pub(crate) fn shortfall_sense(delta: u32, end_of_medium: bool) -> SenseReport {
    let mut bytes = [0u8; SENSE_SIZE];
    bytes[0] = 0xf0;
    bytes[2] = 0x20 | if end_of_medium { 0x40 } else { 0 };
    bytes[3..7].copy_from_slice(&delta.to_be_bytes());
    SenseReport::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_extraction() {
        let s = sense(3, 0x3a, 0x00);
        assert_eq!(s.sense_key(), 3);
        assert_eq!(s.asc(), 0x3a);
        assert_eq!(s.ascq(), 0x00);
        assert_eq!(s.code(), 0x3a00);
    }

    #[test]
    fn test_out_of_paper_is_not_a_jam() {
        let paper = sense(3, 0x3a, 0x00);
        assert!(paper.is_out_of_paper());
        assert_eq!(paper.message(), Some("Out of paper"));

        let jam = sense(3, 0x80, 0x01);
        assert!(!jam.is_out_of_paper());
        assert_eq!(jam.message(), Some("Jammed at document lead"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(sense(6, 0x29, 0x00).is_transient());
        assert!(sense(6, 0x28, 0x00).is_transient());
        assert!(sense(2, 0x04, 0x01).is_transient());
        assert!(!sense(3, 0x3a, 0x00).is_transient());
    }

    #[test]
    fn test_ordering_violation() {
        let s = sense(5, 0x24, 0x00);
        assert!(s.is_ordering_violation());
        assert_eq!(s.message(), Some("Invalid field in CDB"));
    }

    #[test]
    fn test_adf_stopped_key_matters() {
        assert!(sense(2, 0x80, 0x02).is_adf_stopped());
        // Same code under sense key 3 is a jam, not a stop.
        assert!(!sense(3, 0x80, 0x02).is_adf_stopped());
    }

    #[test]
    fn test_unknown_code_has_no_message() {
        let s = sense(5, 0xee, 0xee);
        assert_eq!(s.message(), None);
        assert_eq!(s.to_string(), "sense key 5 code eeee");
    }

    #[test]
    fn test_read_shortfall() {
        let s = shortfall_sense(512, true);
        let short = s.read_shortfall(65536).unwrap();
        assert_eq!(short.delivered, 65024);
        assert!(short.end_of_page);
    }

    #[test]
    fn test_read_shortfall_without_eom() {
        let s = shortfall_sense(100, false);
        let short = s.read_shortfall(1000).unwrap();
        assert_eq!(short.delivered, 900);
        assert!(!short.end_of_page);
    }

    #[test]
    fn test_shortfall_requires_current_error_and_ili() {
        // Plain device error: no shortfall decode.
        assert!(sense(3, 0x3a, 0x00).read_shortfall(1000).is_none());
        // Delta larger than the request is not decodable.
        assert!(shortfall_sense(2000, true).read_shortfall(1000).is_none());
    }

    #[test]
    fn test_short_buffer_is_zero_padded() {
        let s = SenseReport::from_bytes(&[0xf0, 0, 0x63]);
        assert_eq!(s.sense_key(), 3);
        assert_eq!(s.code(), 0x0000);
    }
}
