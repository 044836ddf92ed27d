//! KVS-Core: userspace driver for Panasonic KV-series bulk document
//! scanners.
//!
//! The KV-S3105C and KV-SS905C speak a vendor SCSI command set over two
//! different transports: SCSI tunneled in a USB bulk framing, and SCSI
//! issued through the kernel's generic passthrough ioctl. This crate
//! implements the protocol engine shared by both.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: CDB builders, the 64-byte window descriptor, USB frame
//!   codec, response decoders
//! - **Sense**: error-report parsing and classification
//! - **Transport**: command execution abstraction (usb, sg, mock)
//! - **Session**: the multi-page/duplex scan state machine
//! - **Config**: TOML-loadable scan settings
//!
//! # Example
//!
//! ```no_run
//! use kvs_core::protocol::window::WindowDescriptor;
//! use kvs_core::session::ScanSession;
//! use kvs_core::transport::usb::UsbTransport;
//!
//! let transport = UsbTransport::open(None).expect("no scanner attached");
//! let mut window = WindowDescriptor::usb_defaults();
//! window.pages_to_scan = 1;
//!
//! let mut session = ScanSession::new(transport, window, false);
//! session.set_windows().expect("window setup failed");
//! session.start_scan().expect("no document loaded?");
//! let page = session.read_side().expect("read failed");
//! println!("scanned {}x{}, {} bytes", page.width, page.height, page.data.len());
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod sense;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::{ConfigError, ScanConfig};
pub use error::ScanError;
pub use protocol::command::{BufferStatus, Command};
pub use protocol::window::{Composition, Compression, WindowDescriptor};
pub use sense::{ReadShortfall, SenseReport};
pub use session::{Chunk, PageImage, ScanSession, SessionState, Side};
pub use transport::mock::MockTransport;
#[cfg(target_os = "linux")]
pub use transport::sg::SgTransport;
pub use transport::usb::UsbTransport;
pub use transport::{ExecutionResult, ScsiTransport, Status, TransportError};
