//! Scan window descriptor and its 64-byte wire encoding.
//!
//! The window carries every scan setting: geometry, colour mode,
//! compression, and some thirty device tuning knobs. A window can be set
//! for the front and the back of the page independently (duplex); this
//! driver always programs both sides with the same settings.
//!
//! The device interprets the descriptor strictly by byte position, so the
//! encoder reproduces the documented layout exactly; a field written one
//! bit off desynchronizes the device's view of every neighbouring field.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::Cursor;

use super::constants::{
    SG_DEFAULT_EMPHASIS, SG_DEFAULT_SUBSAMPLE, USB_DEFAULT_EMPHASIS, USB_DEFAULT_SUBSAMPLE,
    WINDOW_SIZE,
};

/// Units of the geometry fields: 1200ths of an inch.
pub const UNITS_PER_INCH: u32 = 1200;

/// `pages_to_scan` value selecting continuous scanning until the feeder
/// runs out of paper.
pub const PAGES_CONTINUOUS: u8 = 0xff;

/// Document size code for US letter.
pub const DOCUMENT_SIZE_LETTER: u8 = 7;

/// Image data colour composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Composition {
    Binary = 0,
    Grayscale = 2,
    #[default]
    Colour = 5,
}

/// Image compression. The KV firmware selects JPEG with the vendor code
/// 0x81, not the generic code 4 from the command documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    /// MH, group 3 one-dimensional.
    ModifiedHuffman = 1,
    /// MR, group 3 two-dimensional. The argument is the K parameter.
    ModifiedRead = 2,
    /// MMR, group 4.
    ModifiedModifiedRead = 3,
    /// The argument is the JPEG quality, 1..=100.
    #[default]
    Jpeg = 0x81,
}

impl Compression {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::ModifiedHuffman),
            2 => Some(Self::ModifiedRead),
            3 => Some(Self::ModifiedModifiedRead),
            0x81 => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// Scan configuration, one window's worth.
///
/// Geometry is in 1200ths of an inch. The interesting fields for callers
/// are the resolutions, `width`/`length` with their `document_*`
/// counterparts, `composition`/`bpp`, the compression pair and
/// `pages_to_scan`; everything else can be left at its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    pub xres: u16,
    pub yres: u16,
    /// Scan origin.
    pub x1: u32,
    pub y1: u32,
    /// Scanned area.
    pub width: u32,
    pub length: u32,
    /// 0 normal, 1 lightest .. 0xff darkest.
    pub brightness: u8,
    /// Binary threshold; 0 means 0x80.
    pub threshold: u8,
    /// 0 means 0x80; 1 lowest .. 0xff highest.
    pub contrast: u8,
    pub composition: Composition,
    /// 1 binary, 8 grayscale, 24 colour.
    pub bpp: u8,
    /// Not actually supported by the hardware.
    pub halftone_pattern: u16,
    /// Invert a binary image.
    pub reverse_image: bool,
    /// Uncompressed data only: 0 LSB first, 1 MSB first.
    pub bit_ordering: u16,
    pub compression: Compression,
    /// K parameter for MR, quality for JPEG.
    pub compression_argument: u8,
    pub flatbed: bool,
    pub stop_on_skew: bool,
    pub disable_buffering: bool,
    pub continue_on_double_feed: bool,
    /// 0 none, 0x80 left-right mirror.
    pub mirror_image: u8,
    pub emphasis: u8,
    pub gamma_correction: u8,
    /// Drop-out colour comes from a SEND command instead of `lamp`.
    pub multi_colour_dropout: bool,
    /// 0 white, 1 red, 2 green, 3 blue.
    pub lamp: u8,
    /// 0 normal, 1 high, 2 low.
    pub double_feed_sensitivity: u8,
    pub remove_moire: bool,
    /// 0 = 4:4:4, 1 = 4:1:1, 3 = 4:2:2.
    pub subsample: u8,
    /// Output with sRGB, disabling gamma correction.
    pub colour_match: bool,
    /// Standard size code; effective width/length fields override it when
    /// the standard-size bit (bit 7) is clear.
    pub document_size: u8,
    pub document_width: u32,
    pub document_length: u32,
    pub ahead_disable: bool,
    /// 0 off, 1 detect only, 2 correct.
    pub deskew: u8,
    pub double_feed_detector: bool,
    /// Scan the whole page and scale to the requested size.
    pub full_size_scan: bool,
    pub feed_slow: bool,
    pub remove_shadow: bool,
    /// 1..=254 pages per SCAN, or [`PAGES_CONTINUOUS`].
    pub pages_to_scan: u8,
    /// 0 static, 0x11..=0x1f dynamic lightest..darkest.
    pub threshold_mode: u8,
    pub separation_mode: u8,
    pub standard_white_level: u8,
    pub blackwhite_noise_reduction: bool,
    pub noise_reduction: u8,
    pub manual_feed: bool,
    pub additional_space_top: bool,
    pub additional_space_bottom: bool,
    pub detect_separation_sheet: bool,
    pub halt_at_separation_sheet: bool,
    pub detect_control_sheet: bool,
    pub stop_mode: u8,
    /// Carried for completeness; the device window block has no slot for
    /// the chroma pair and they are never transmitted.
    pub red_chroma: u8,
    pub blue_chroma: u8,
}

impl WindowDescriptor {
    pub const SIZE: usize = WINDOW_SIZE;

    fn base_defaults() -> Self {
        Self {
            xres: 300,
            yres: 300,
            x1: 0,
            y1: 0,
            width: (8.5 * UNITS_PER_INCH as f64) as u32,
            length: 11 * UNITS_PER_INCH,
            brightness: 0,
            threshold: 0,
            contrast: 0,
            composition: Composition::Colour,
            bpp: 24,
            halftone_pattern: 0,
            reverse_image: false,
            bit_ordering: 0,
            compression: Compression::Jpeg,
            compression_argument: 85,
            flatbed: false,
            stop_on_skew: false,
            disable_buffering: false,
            continue_on_double_feed: false,
            mirror_image: 0,
            emphasis: 0,
            gamma_correction: 0,
            multi_colour_dropout: false,
            lamp: 0,
            double_feed_sensitivity: 0,
            remove_moire: false,
            subsample: 0,
            colour_match: false,
            document_size: DOCUMENT_SIZE_LETTER,
            document_width: (8.5 * UNITS_PER_INCH as f64) as u32,
            document_length: 11 * UNITS_PER_INCH,
            ahead_disable: false,
            deskew: 0,
            double_feed_detector: true,
            full_size_scan: false,
            feed_slow: false,
            remove_shadow: false,
            pages_to_scan: PAGES_CONTINUOUS,
            threshold_mode: 0,
            separation_mode: 0,
            standard_white_level: 0,
            blackwhite_noise_reduction: false,
            noise_reduction: 0,
            manual_feed: false,
            additional_space_top: false,
            additional_space_bottom: false,
            detect_separation_sheet: false,
            halt_at_separation_sheet: false,
            detect_control_sheet: false,
            stop_mode: 0,
            red_chroma: 0,
            blue_chroma: 0,
        }
    }

    /// Factory defaults for the USB variant (KV-S3105C).
    pub fn usb_defaults() -> Self {
        Self {
            emphasis: USB_DEFAULT_EMPHASIS,
            subsample: USB_DEFAULT_SUBSAMPLE,
            ..Self::base_defaults()
        }
    }

    /// Factory defaults for the SCSI-generic variant (KV-SS905C).
    pub fn sg_defaults() -> Self {
        Self {
            emphasis: SG_DEFAULT_EMPHASIS,
            subsample: SG_DEFAULT_SUBSAMPLE,
            ..Self::base_defaults()
        }
    }

    /// Set the scanned and document page size in inches.
    pub fn set_page_size_inches(&mut self, width: f64, height: f64) {
        self.width = (width * UNITS_PER_INCH as f64) as u32;
        self.document_width = self.width;
        self.length = (height * UNITS_PER_INCH as f64) as u32;
        self.document_length = self.length;
    }

    /// Serialize to the fixed 64-byte wire layout.
    ///
    /// Byte 0 is the window identifier and is left zero here; SET WINDOW
    /// overwrites it when programming the back-side window.
    pub fn encode(&self) -> [u8; WINDOW_SIZE] {
        let mut buf = [0u8; WINDOW_SIZE];
        let mut w = Cursor::new(&mut buf[..]);

        // Writes into a fixed array cannot fail.
        w.write_u16::<BigEndian>(0).unwrap(); // window identifier, reserved
        w.write_u16::<BigEndian>(self.xres).unwrap();
        w.write_u16::<BigEndian>(self.yres).unwrap();
        w.write_u32::<BigEndian>(self.x1).unwrap();
        w.write_u32::<BigEndian>(self.y1).unwrap();
        w.write_u32::<BigEndian>(self.width).unwrap();
        w.write_u32::<BigEndian>(self.length).unwrap();
        w.write_u8(self.brightness).unwrap();
        w.write_u8(self.threshold).unwrap();
        w.write_u8(self.contrast).unwrap();
        w.write_u8(self.composition as u8).unwrap();
        w.write_u8(self.bpp).unwrap();
        w.write_u16::<BigEndian>(self.halftone_pattern).unwrap();
        w.write_u8(if self.reverse_image { 0x80 } else { 0 }).unwrap();
        w.write_u16::<BigEndian>(self.bit_ordering).unwrap();
        w.write_u8(self.compression as u8).unwrap();
        w.write_u8(self.compression_argument).unwrap();
        w.set_position(w.position() + 7); // bytes 34..41 reserved
        w.write_u8(
            bit(self.flatbed, 7)
                | bit(self.stop_on_skew, 4)
                | bit(self.disable_buffering, 3)
                | bit(self.continue_on_double_feed, 0),
        )
        .unwrap();
        w.write_u8(self.mirror_image).unwrap();
        w.write_u8(self.emphasis).unwrap();
        w.write_u8(self.gamma_correction).unwrap();
        w.write_u8(
            bit(self.multi_colour_dropout, 7)
                | (self.lamp & 0x7) << 4
                | self.double_feed_sensitivity & 0x7,
        )
        .unwrap();
        w.write_u8(
            bit(self.remove_moire, 6) | (self.subsample & 0x3) << 4 | bit(self.colour_match, 0),
        )
        .unwrap();
        w.write_u8(self.document_size).unwrap();
        w.write_u32::<BigEndian>(self.document_width).unwrap();
        w.write_u32::<BigEndian>(self.document_length).unwrap();
        w.write_u8(
            bit(self.ahead_disable, 7)
                | (self.deskew & 0x3) << 5
                | bit(self.double_feed_detector, 4)
                | bit(self.full_size_scan, 2)
                | bit(self.feed_slow, 1)
                | bit(self.remove_shadow, 0),
        )
        .unwrap();
        w.write_u8(self.pages_to_scan).unwrap();
        w.write_u8(self.threshold_mode).unwrap();
        w.write_u8(self.separation_mode).unwrap();
        w.write_u8(self.standard_white_level).unwrap();
        w.write_u8(bit(self.blackwhite_noise_reduction, 7) | self.noise_reduction & 0x7f)
            .unwrap();
        w.write_u8(
            bit(self.manual_feed, 6)
                | bit(self.additional_space_top, 5)
                | bit(self.additional_space_bottom, 4)
                | bit(self.detect_separation_sheet, 3)
                | bit(self.halt_at_separation_sheet, 2)
                | bit(self.detect_control_sheet, 1),
        )
        .unwrap();
        w.write_u8(self.stop_mode).unwrap();
        // red_chroma and blue_chroma have no wire slot and stay host-side.

        debug_assert_eq!(w.position() as usize, WINDOW_SIZE);
        buf
    }
}

fn bit(flag: bool, position: u8) -> u8 {
    (flag as u8) << position
}
