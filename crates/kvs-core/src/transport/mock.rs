//! Scripted transport for unit-testing the session logic.

use std::collections::VecDeque;
use std::time::Duration;

use super::{ExecutionResult, ScsiTransport, Status, TransportError};
use crate::protocol::command::Command;
use crate::sense::SenseReport;

/// Canned reply for one executed command.
#[derive(Debug)]
pub enum MockReply {
    /// Good status with a device-to-host payload.
    Good(Vec<u8>),
    /// Check condition carrying sense and whatever data arrived before it.
    Check {
        sense: SenseReport,
        data: Vec<u8>,
    },
    /// Bus-level failure.
    Bus(TransportError),
}

/// Transport that replays a scripted reply per command and records every
/// command it executed.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: VecDeque<MockReply>,
    executed: Vec<Command>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a good completion with no payload.
    pub fn queue_ok(&mut self) {
        self.replies.push_back(MockReply::Good(Vec::new()));
    }

    /// Queue a good completion delivering `data`.
    pub fn queue_data(&mut self, data: Vec<u8>) {
        self.replies.push_back(MockReply::Good(data));
    }

    /// Queue a check condition with the given sense.
    pub fn queue_check(&mut self, sense: SenseReport) {
        self.replies.push_back(MockReply::Check {
            sense,
            data: Vec::new(),
        });
    }

    /// Queue a check condition that still delivered partial data.
    pub fn queue_check_with_data(&mut self, sense: SenseReport, data: Vec<u8>) {
        self.replies.push_back(MockReply::Check { sense, data });
    }

    /// Queue a bus failure.
    pub fn queue_bus_error(&mut self, error: TransportError) {
        self.replies.push_back(MockReply::Bus(error));
    }

    /// Every command executed so far, in order.
    pub fn executed(&self) -> &[Command] {
        &self.executed
    }

    /// CDB byte strings of the executed commands with the given opcode.
    pub fn executed_cdbs(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.executed
            .iter()
            .filter(|c| c.cdb.opcode() == opcode)
            .map(|c| c.cdb.as_bytes().to_vec())
            .collect()
    }

    pub fn replies_remaining(&self) -> usize {
        self.replies.len()
    }
}

impl ScsiTransport for MockTransport {
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult, TransportError> {
        self.executed.push(command.clone());
        match self.replies.pop_front() {
            Some(MockReply::Good(data)) => Ok(ExecutionResult::good(data)),
            Some(MockReply::Check { sense, data }) => {
                Ok(ExecutionResult {
                    status: Status::CheckCondition,
                    data,
                    sense,
                })
            }
            Some(MockReply::Bus(error)) => Err(error),
            None => Err(TransportError::CommandSend(format!(
                "mock reply queue empty for {}",
                command.name()
            ))),
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sense::sense;

    #[test]
    fn test_replies_are_consumed_in_order() {
        let mut mock = MockTransport::new();
        mock.queue_data(vec![1]);
        mock.queue_check(sense(3, 0x3a, 0x00));

        let first = mock.execute(&Command::test_unit_ready()).unwrap();
        assert!(first.status.is_good());
        assert_eq!(first.data, vec![1]);

        let second = mock.execute(&Command::scan()).unwrap();
        assert!(!second.status.is_good());
        assert!(second.sense.is_out_of_paper());

        // Empty queue is a bus error, not a panic.
        assert!(mock.execute(&Command::scan()).is_err());
    }

    #[test]
    fn test_command_log() {
        let mut mock = MockTransport::new();
        mock.queue_ok();
        mock.queue_ok();
        mock.execute(&Command::scan()).unwrap();
        mock.execute(&Command::stop()).unwrap();

        assert_eq!(mock.executed().len(), 2);
        assert_eq!(mock.executed_cdbs(0x1b).len(), 1);
        assert_eq!(mock.executed_cdbs(0xe1).len(), 1);
    }
}
