//! Crate-level error taxonomy.
//!
//! Callers pattern-match on `ScanError` instead of inspecting status
//! integers: bus failures, device-reported conditions (with their raw
//! sense), short transfers, ordering violations and malformed responses
//! are all distinct variants.

use thiserror::Error;

use crate::protocol::command::CommandError;
use crate::sense::SenseReport;
use crate::session::SessionState;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Bus or ioctl failure; no device-level information is available.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device reported a check condition. The sense report carries
    /// the raw bytes and, where known, a decoded message.
    #[error("device error: {0}")]
    Device(SenseReport),

    /// The payload fell short of the request with no sense explanation.
    #[error("data transfer incomplete: got {received} of {requested} bytes")]
    DataTransfer { requested: usize, received: usize },

    /// The device rejected an out-of-sequence page or side request.
    #[error("page or side requested out of order: {0}")]
    OrderingViolation(SenseReport),

    /// Malformed or undersized response, or a length no CDB can encode.
    #[error(transparent)]
    Protocol(#[from] CommandError),

    #[error("{operation} is not valid in the {state:?} state")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl ScanError {
    /// The sense report behind this error, when the device produced one.
    pub fn sense(&self) -> Option<&SenseReport> {
        match self {
            ScanError::Device(sense) | ScanError::OrderingViolation(sense) => Some(sense),
            _ => None,
        }
    }

    /// Out of paper: the feeder is empty. The usual way a continuous scan
    /// ends; the session stays usable.
    pub fn is_end_of_document(&self) -> bool {
        matches!(self, ScanError::Device(sense) if sense.is_out_of_paper())
    }

    /// The feeder drained after STOP; no more buffered pages remain.
    pub fn is_adf_stopped(&self) -> bool {
        matches!(self, ScanError::Device(sense) if sense.is_adf_stopped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sense::sense;

    #[test]
    fn test_end_of_document_classification() {
        let err = ScanError::Device(sense(3, 0x3a, 0x00));
        assert!(err.is_end_of_document());
        assert!(!err.is_adf_stopped());
        assert_eq!(err.sense().unwrap().code(), 0x3a00);

        let jam = ScanError::Device(sense(3, 0x80, 0x01));
        assert!(!jam.is_end_of_document());
    }

    #[test]
    fn test_ordering_violation_carries_sense() {
        let err = ScanError::OrderingViolation(sense(5, 0x24, 0x00));
        assert_eq!(err.sense().unwrap().code(), 0x2400);
    }
}
