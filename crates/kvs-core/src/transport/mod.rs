//! Transport layer abstraction.
//!
//! Defines the `ScsiTransport` trait for executing commands against a
//! device, with interchangeable implementations: USB bulk framing, the
//! kernel SCSI-generic passthrough, and a scripted mock for tests.

pub mod mock;
#[cfg(target_os = "linux")]
pub mod sg;
pub mod usb;

use std::time::Duration;
use thiserror::Error;

use crate::protocol::command::Command;
use crate::protocol::constants::{STATUS_CHECK_CONDITION, STATUS_GOOD};
use crate::sense::SenseReport;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device not found")]
    DeviceNotFound,

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("endpoint not found: {direction} bulk")]
    EndpointNotFound { direction: &'static str },

    #[error("device did not become ready")]
    NotReady,

    #[error("failed to send command: {0}")]
    CommandSend(String),

    /// The data phase fell short. Mid-scan this can simply mean the paper
    /// ran out; the session treats it as recoverable.
    #[error("data transfer failed: {0}")]
    DataTransfer(String),

    #[error("failed to read status word: {0}")]
    StatusRead(String),

    #[error("passthrough ioctl failed: {0}")]
    Ioctl(#[from] std::io::Error),
}

impl TransportError {
    /// Failures that can occur mid-page without poisoning the device
    /// handle. Everything else faults the session.
    pub fn is_data_transfer(&self) -> bool {
        matches!(self, TransportError::DataTransfer(_))
    }
}

/// Command completion status, the SCSI status byte reduced to the two
/// values this device produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Good,
    /// Sense data describes the condition.
    CheckCondition,
    /// Any other non-zero status byte.
    Other(u32),
}

impl Status {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            STATUS_GOOD => Status::Good,
            STATUS_CHECK_CONDITION => Status::CheckCondition,
            other => Status::Other(other),
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, Status::Good)
    }
}

/// Outcome of one executed command.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: Status,
    /// Device-to-host payload; empty for non-IN commands. May be shorter
    /// than requested when sense explains the shortfall.
    pub data: Vec<u8>,
    /// Sense report; all zero when `status` is good.
    pub sense: SenseReport,
}

impl ExecutionResult {
    pub fn good(data: Vec<u8>) -> Self {
        Self {
            status: Status::Good,
            data,
            sense: SenseReport::empty(),
        }
    }

    pub fn check_condition(sense: SenseReport, data: Vec<u8>) -> Self {
        Self {
            status: Status::CheckCondition,
            data,
            sense,
        }
    }
}

/// Abstract command transport.
///
/// Implementations block until the command completes, times out, or the
/// bus fails; there is never more than one command in flight per device.
pub trait ScsiTransport {
    /// Execute a command and return its status, payload and sense.
    ///
    /// A non-good status is not an `Err`: device-level conditions travel in
    /// the `ExecutionResult` so callers can decode the sense. `Err` is
    /// reserved for bus-level failures with no device information.
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult, TransportError>;

    /// Sleep between GET DATA BUFFER STATUS polls. The scanner offers no
    /// readiness notification, so waiting is a fixed-interval poll.
    fn poll_interval(&self) -> Duration;

    /// Address or path of the underlying device, for log output.
    fn describe(&self) -> String;
}
