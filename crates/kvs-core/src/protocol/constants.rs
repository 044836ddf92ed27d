//! Protocol constants for the Panasonic KV-series command set.
//!
//! Derived from the KV-S3105C/KV-SS905C SCSI interface specification
//! (KV-S3105CS3085_if-e.pdf).

// ============================================================================
// Device Identification
// ============================================================================

/// Panasonic (Matsushita) Vendor ID
pub const KV_VENDOR_ID: u16 = 0x04da;

/// KV-S3105C Product ID
pub const KVS3105_PRODUCT_ID: u16 = 0x1004;
/// KV-S70xx series Product ID (protocol compatible)
pub const KVS70XX_PRODUCT_ID: u16 = 0x100e;

/// All supported PIDs for device discovery
pub const SUPPORTED_PIDS: &[u16] = &[KVS3105_PRODUCT_ID, KVS70XX_PRODUCT_ID];

// ============================================================================
// SCSI Operation Codes
// ============================================================================

pub const OP_TEST_UNIT_READY: u8 = 0x00;
pub const OP_REQUEST_SENSE: u8 = 0x03;
pub const OP_INQUIRY: u8 = 0x12;
pub const OP_SCAN: u8 = 0x1B;
pub const OP_SET_WINDOW: u8 = 0x24;
pub const OP_READ: u8 = 0x28;
pub const OP_GET_DATA_BUFFER_STATUS: u8 = 0x34;
/// Vendor maintenance opcode; sub-command selects the operation.
pub const OP_MAINTENANCE: u8 = 0xE1;
/// Sub-command of [`OP_MAINTENANCE`] that stops the document feeder.
pub const SUB_STOP_ADF: u8 = 0x8B;

/// READ sub-type: image data for a page/side.
pub const READ_IMAGE: u8 = 0x00;
/// READ sub-type: pixel dimensions of a buffered page/side.
pub const READ_PICTURE_ELEMENT_SIZE: u8 = 0x80;

/// Byte 5 of a READ CDB selecting the back side of a duplex page.
pub const SIDE_BACK_BIT: u8 = 0x80;

// ============================================================================
// Size Constants
// ============================================================================

/// Sense report size. The device returns fixed-format sense in this many
/// bytes; shorter returns are zero-padded.
pub const SENSE_SIZE: usize = 20;

/// Maximum bytes requested by a single READ IMAGE.
pub const MAX_READ_SIZE: usize = 0x10000;

/// Serialized window descriptor size.
pub const WINDOW_SIZE: usize = 64;

/// The window parameter header preceding the descriptor in SET WINDOW.
pub const WINDOW_HEADER_SIZE: usize = 8;

/// INQUIRY allocation length; the model string lives at bytes 16..32.
pub const INQUIRY_SIZE: usize = 0x60;

/// GET DATA BUFFER STATUS response size.
pub const BUFFER_STATUS_SIZE: usize = 12;

/// PICTURE ELEMENT SIZE response size.
pub const PICTURE_SIZE_RESPONSE: usize = 16;

/// Window identifier byte selecting the back-side window.
pub const WINDOW_ID_BACK: u8 = 0x80;

/// Largest value a 3-byte CDB transfer-length field can carry.
pub const MAX_CDB_TRANSFER_LENGTH: usize = 0xFF_FFFF;

// ============================================================================
// USB Bulk Framing
// ============================================================================

/// Frame header size preceding every bulk block.
pub const FRAME_HEADER_SIZE: usize = 12;

/// The command block carries this many CDB bytes, zero padded.
pub const FRAME_CDB_REGION: usize = 12;

/// Status word size following the final response frame.
pub const STATUS_SIZE: usize = 4;

pub const COMMAND_BLOCK: u16 = 1;
pub const DATA_BLOCK: u16 = 2;
pub const RESPONSE_BLOCK: u16 = 3;

pub const COMMAND_CODE: u16 = 0x9000;
pub const DATA_CODE: u16 = 0xb000;
pub const RESPONSE_CODE: u16 = 0xa000;

/// SCSI status: command completed without error.
pub const STATUS_GOOD: u32 = 0;
/// SCSI status: sense data available.
pub const STATUS_CHECK_CONDITION: u32 = 2;

// ============================================================================
// Timeouts and Poll Intervals
// ============================================================================

/// Default command timeout on the USB transport.
pub const USB_TIMEOUT_MS: u64 = 10_000;
/// Default command timeout on the SCSI-generic transport.
pub const SG_TIMEOUT_MS: u64 = 30_000;

/// Buffer-status poll interval on the USB transport.
pub const USB_POLL_INTERVAL_MS: u64 = 50;
/// Buffer-status poll interval on the SCSI-generic transport.
pub const SG_POLL_INTERVAL_MS: u64 = 5;

/// Attempts for a command failing with a transient sense (SG transport).
pub const TRANSIENT_RETRY_ATTEMPTS: u32 = 5;
/// Sleep between transient retries.
pub const TRANSIENT_RETRY_DELAY_MS: u64 = 3_000;

// ============================================================================
// Per-Variant Window Defaults
// ============================================================================
// The two device variants ship different factory tunings for these knobs.
// They are deliberately kept as two constant pairs, not unified.

/// KV-S3105C (USB) default emphasis: no conversion.
pub const USB_DEFAULT_EMPHASIS: u8 = 0xf0;
/// KV-S3105C (USB) default chroma subsampling: 4:2:2.
pub const USB_DEFAULT_SUBSAMPLE: u8 = 3;

/// KV-SS905C (SCSI-generic) default emphasis: medium.
pub const SG_DEFAULT_EMPHASIS: u8 = 0x2f;
/// KV-SS905C (SCSI-generic) default chroma subsampling: 4:2:2.
pub const SG_DEFAULT_SUBSAMPLE: u8 = 3;

// ============================================================================
// Sense Codes
// ============================================================================

/// ASC/ASCQ: out of paper. End-of-document, not a fault.
pub const CODE_OUT_OF_PAPER: u16 = 0x3a00;
/// ASC/ASCQ: invalid field in CDB. The device reports this when pages or
/// sides are requested out of order.
pub const CODE_INVALID_CDB_FIELD: u16 = 0x2400;
/// ASC/ASCQ: ADF stopped (under sense key 2). Reads after STOP end here.
pub const CODE_ADF_STOPPED: u16 = 0x8002;

/// ASC values the SG transport treats as transient and retries.
pub const TRANSIENT_ASCS: &[u8] = &[0x28, 0x29, 0x04];

/// Human-readable command name for log output.
pub fn command_name(opcode: u8, subcommand: u8) -> &'static str {
    match opcode {
        0x00 => "TEST UNIT READY",
        0x03 => "REQUEST SENSE",
        0x12 => "INQUIRY",
        0x16 => "RESERVE UNIT",
        0x17 => "RELEASE UNIT",
        0x1B => "SCAN",
        0x1D => "SEND DIAGNOSTIC",
        0x24 => "SET WINDOW",
        0x28 => "READ",
        0x2A => "SEND",
        0x31 => "OBJECT POSITION",
        0x34 => "GET DATA BUFFER STATUS",
        0xC0 => "SET SUBWINDOW",
        0xE0 => match subcommand {
            0x83 => "GET VERSION",
            0x86 => "GET COUNTER",
            0x90 => "GET WARNING",
            0xA0 => "GET BACKGROUND LEVEL",
            _ => "UNKNOWN 0xE0 COMMAND",
        },
        0xE1 => match subcommand {
            0x05 | 0x07 => "HOPPER DOWN",
            0x85 => "SET TIME",
            0x8B => "STOP ADF",
            0x8D => "SET TIMEOUT",
            0x91 => "CLEAR WARNING",
            _ => "UNKNOWN 0xE1 COMMAND",
        },
        0xE4 => "SET IMPRINTER",
        0xE6 => "SET BARCODE",
        _ => "UNKNOWN COMMAND",
    }
}
