//! USB bulk-framing transport (nusb based).
//!
//! The KV scanners tunnel SCSI over USB bulk pipes. Every command travels
//! as a framed command block; payloads follow in their own data block, and
//! a response block closes the exchange with a 4-byte status word. A
//! non-zero status is resolved into sense data with a REQUEST SENSE
//! round-trip over the same pipes.

use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{ExecutionResult, ScsiTransport, Status, TransportError};
use crate::protocol::command::{Command, DataDirection};
use crate::protocol::constants::{
    FRAME_HEADER_SIZE, KV_VENDOR_ID, STATUS_SIZE, SUPPORTED_PIDS, USB_POLL_INTERVAL_MS,
};
use crate::protocol::frame::{FrameHeader, command_frame, data_frame, parse_status};
use crate::sense::SenseReport;

/// Probes before giving up on a freshly-opened device.
const READY_ATTEMPTS: u32 = 10;
const READY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// USB bulk-framing transport for a claimed scanner.
pub struct UsbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    address: String,
    transaction_id: u32,
}

impl UsbTransport {
    /// Open a scanner. `name` selects a specific device by its
    /// `"<bus>:<device>"` address; `None` takes the first match.
    ///
    /// The device is probed with TEST UNIT READY until it answers; scanners
    /// take a few seconds to come up after power-on.
    #[instrument(level = "info")]
    pub fn open(name: Option<&str>) -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if !is_kv_scanner(&device_info) {
                continue;
            }
            let address = address_of(&device_info);
            if let Some(wanted) = name
                && wanted != address
            {
                continue;
            }
            let mut transport = Self::open_device_info(device_info, address)?;
            transport.wait_until_ready()?;
            return Ok(transport);
        }

        Err(TransportError::DeviceNotFound)
    }

    /// Addresses of all attached KV scanners, as `"<bus>:<device>"`.
    pub fn list_addresses() -> Result<Vec<String>, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        Ok(devices.filter(is_kv_scanner).map(|d| address_of(&d)).collect())
    }

    fn open_device_info(
        device_info: nusb::DeviceInfo,
        address: String,
    ) -> Result<Self, TransportError> {
        info!(
            vendor_id = %format!("{:04x}", device_info.vendor_id()),
            product_id = %format!("{:04x}", device_info.product_id()),
            address = %address,
            "Found scanner"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface =
            device
                .claim_interface(0)
                .wait()
                .map_err(|e| TransportError::ClaimInterfaceFailed {
                    interface: 0,
                    message: e.to_string(),
                })?;

        // Find the bulk endpoint pair
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == 0 {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound { direction: "in" });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound { direction: "out" });
        }

        debug!(
            in_ep = %format!("0x{:02x}", in_endpoint),
            out_ep = %format!("0x{:02x}", out_endpoint),
            "Scanner opened"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            address,
            transaction_id: 0,
        })
    }

    fn wait_until_ready(&mut self) -> Result<(), TransportError> {
        for attempt in 0..READY_ATTEMPTS {
            match self.execute(&Command::test_unit_ready()) {
                Ok(result) if result.status.is_good() => return Ok(()),
                Ok(result) => {
                    debug!(attempt, sense = %result.sense, "Unit not ready yet");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "TEST UNIT READY failed");
                }
            }
            thread::sleep(READY_RETRY_DELAY);
        }
        Err(TransportError::NotReady)
    }

    fn bulk_write(&self, data: &[u8]) -> Result<(), String> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| e.to_string())?;

        let mut writer = ep.writer(data.len().max(512));
        writer.write_all(data).map_err(|e| e.to_string())?;
        writer.flush().map_err(|e| e.to_string())?;
        Ok(())
    }

    fn bulk_read(&self, max_len: usize) -> Result<Vec<u8>, String> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| e.to_string())?;

        let mut reader = ep.reader(max_len.max(512));
        let mut buf = vec![0u8; max_len];
        let n = reader.read(&mut buf).map_err(|e| e.to_string())?;
        buf.truncate(n);
        Ok(buf)
    }

    /// One framed exchange: command block, data phase, status word.
    /// Returns the raw payload and status; sense resolution happens in
    /// `execute`.
    fn exchange(&mut self, command: &Command) -> Result<(Vec<u8>, u32), TransportError> {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let txid = self.transaction_id;

        debug!(command = command.name(), txid, "Sending command block");
        self.bulk_write(&command_frame(command, txid))
            .map_err(TransportError::CommandSend)?;

        let mut data = Vec::new();
        match command.direction {
            DataDirection::Out if !command.payload.is_empty() => {
                self.bulk_write(&data_frame(&command.payload, txid))
                    .map_err(TransportError::DataTransfer)?;
            }
            DataDirection::In if command.response_len > 0 => {
                let raw = self
                    .bulk_read(FRAME_HEADER_SIZE + command.response_len)
                    .map_err(TransportError::DataTransfer)?;
                if raw.len() < FRAME_HEADER_SIZE {
                    return Err(TransportError::DataTransfer(format!(
                        "data block truncated at {} bytes",
                        raw.len()
                    )));
                }
                // Whatever arrived beyond the header is the real payload;
                // the device legitimately sends less than requested when a
                // transfer is cut short mid-page.
                data = raw[FRAME_HEADER_SIZE..].to_vec();
            }
            _ => {}
        }

        let response = self
            .bulk_read(FrameHeader::SIZE + STATUS_SIZE)
            .map_err(TransportError::StatusRead)?;
        let status = parse_status(&response).map_err(|e| TransportError::StatusRead(e.to_string()))?;

        debug!(command = command.name(), status, received = data.len(), "Exchange complete");
        Ok((data, status))
    }
}

impl ScsiTransport for UsbTransport {
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult, TransportError> {
        let (data, status) = self.exchange(command)?;
        if status == 0 {
            return Ok(ExecutionResult::good(data));
        }

        // The device holds sense data for the failed command; fetch it
        // before anything else touches the unit.
        let (sense_data, sense_status) = self.exchange(&Command::request_sense())?;
        if sense_data.is_empty() {
            return Err(TransportError::StatusRead(
                "REQUEST SENSE returned no data".into(),
            ));
        }
        if sense_status != 0 {
            warn!(status = sense_status, "REQUEST SENSE itself reported bad status");
        }

        let sense = SenseReport::from_bytes(&sense_data);
        debug!(status, sense = %sense, "Command ended with check condition");
        Ok(ExecutionResult {
            status: Status::from_raw(status),
            data,
            sense,
        })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(USB_POLL_INTERVAL_MS)
    }

    fn describe(&self) -> String {
        format!("usb:{}", self.address)
    }
}

fn is_kv_scanner(info: &nusb::DeviceInfo) -> bool {
    info.vendor_id() == KV_VENDOR_ID && SUPPORTED_PIDS.contains(&info.product_id())
}

fn address_of(info: &nusb::DeviceInfo) -> String {
    let bus = info.bus_id();
    let bus = bus
        .parse::<u32>()
        .map(|b| b.to_string())
        .unwrap_or_else(|_| bus.to_string());
    format!("{}:{}", bus, info.device_address())
}
