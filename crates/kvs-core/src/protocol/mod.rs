//! Protocol module - KV command set definitions.

pub mod command;
pub mod constants;
pub mod frame;
pub mod window;

pub use command::{BufferStatus, Command, CommandError, DataDirection};
pub use frame::{FrameError, FrameHeader};
pub use window::{Composition, Compression, WindowDescriptor};
