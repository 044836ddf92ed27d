//! Kernel SCSI-generic passthrough transport.
//!
//! Drives the scanner through `/dev/sg*` with the `SG_IO` ioctl. The
//! kernel performs auto-sense, so a failed command comes back with the
//! sense buffer already filled. Transient conditions (unit attention,
//! unit becoming ready) are retried here before anything is surfaced.
//!
//! See <http://www.tldp.org/HOWTO/SCSI-Generic-HOWTO/index.html>.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{ExecutionResult, ScsiTransport, Status, TransportError};
use crate::protocol::command::{Command, DataDirection, inquiry_matches};
use crate::protocol::constants::{
    SENSE_SIZE, SG_POLL_INTERVAL_MS, SG_TIMEOUT_MS, TRANSIENT_RETRY_ATTEMPTS,
    TRANSIENT_RETRY_DELAY_MS,
};
use crate::sense::SenseReport;

const SG_IO: libc::c_ulong = 0x2285;
const SG_INTERFACE_ID: libc::c_int = 'S' as libc::c_int;
const SG_DXFER_NONE: libc::c_int = -1;
const SG_DXFER_TO_DEV: libc::c_int = -2;
const SG_DXFER_FROM_DEV: libc::c_int = -3;

/// `struct sg_io_hdr` from `<scsi/sg.h>`. The kernel reads and fills the
/// whole struct; only a few fields are inspected on this side.
#[repr(C)]
#[allow(dead_code)]
struct SgIoHdr {
    interface_id: libc::c_int,
    dxfer_direction: libc::c_int,
    cmd_len: libc::c_uchar,
    mx_sb_len: libc::c_uchar,
    iovec_count: libc::c_ushort,
    dxfer_len: libc::c_uint,
    dxferp: *mut libc::c_void,
    cmdp: *mut libc::c_uchar,
    sbp: *mut libc::c_uchar,
    timeout: libc::c_uint,
    flags: libc::c_uint,
    pack_id: libc::c_int,
    usr_ptr: *mut libc::c_void,
    status: libc::c_uchar,
    masked_status: libc::c_uchar,
    msg_status: libc::c_uchar,
    sb_len_wr: libc::c_uchar,
    host_status: libc::c_ushort,
    driver_status: libc::c_ushort,
    resid: libc::c_int,
    duration: libc::c_uint,
    info: libc::c_uint,
}

/// SCSI-generic passthrough transport for an opened `/dev/sg*` node.
pub struct SgTransport {
    file: File,
    path: String,
}

impl SgTransport {
    /// Find the scanner by opening SCSI generic devices in order and
    /// INQUIRY-probing each one. Permission errors skip to the next node;
    /// running out of nodes means no scanner is attached.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let mut index = 0u32;
        loop {
            let path = format!("/dev/sg{index}");
            index += 1;
            let file = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(TransportError::DeviceNotFound);
                }
                Err(_) => continue,
            };
            let mut candidate = Self { file, path };
            if candidate.detect() {
                info!(device = %candidate.path, "Found scanner");
                return Ok(candidate);
            }
        }
    }

    /// Open a specific SCSI generic node and verify it is a KV scanner.
    #[instrument(level = "info")]
    pub fn open_path(path: &str) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TransportError::OpenFailed(format!("{path}: {e}")))?;
        let mut transport = Self {
            file,
            path: path.to_string(),
        };
        if !transport.detect() {
            return Err(TransportError::DeviceNotFound);
        }
        Ok(transport)
    }

    /// True if the device answers INQUIRY with a KV model string.
    fn detect(&mut self) -> bool {
        match self.issue(&Command::inquiry()) {
            Ok(result) => result.status.is_good() && inquiry_matches(&result.data),
            Err(_) => false,
        }
    }

    /// One SG_IO round-trip, no retry.
    fn issue(&mut self, command: &Command) -> Result<ExecutionResult, TransportError> {
        let mut data = match command.direction {
            DataDirection::In => vec![0u8; command.response_len],
            DataDirection::Out => command.payload.clone(),
            DataDirection::None => Vec::new(),
        };
        let mut sense_buf = [0u8; SENSE_SIZE];
        let mut cdb = command.cdb.as_bytes().to_vec();

        let timeout = command
            .timeout
            .map(|t| t.as_millis() as libc::c_uint)
            .unwrap_or(SG_TIMEOUT_MS as libc::c_uint);

        let mut hdr = SgIoHdr {
            interface_id: SG_INTERFACE_ID,
            dxfer_direction: match command.direction {
                DataDirection::None => SG_DXFER_NONE,
                DataDirection::In => SG_DXFER_FROM_DEV,
                DataDirection::Out => SG_DXFER_TO_DEV,
            },
            cmd_len: cdb.len() as libc::c_uchar,
            mx_sb_len: SENSE_SIZE as libc::c_uchar,
            iovec_count: 0,
            dxfer_len: data.len() as libc::c_uint,
            dxferp: data.as_mut_ptr().cast(),
            cmdp: cdb.as_mut_ptr(),
            sbp: sense_buf.as_mut_ptr(),
            timeout,
            flags: 0,
            pack_id: 0,
            usr_ptr: std::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };

        // SAFETY: hdr points at buffers that outlive the ioctl call.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), SG_IO, &mut hdr) };
        if rc != 0 {
            return Err(TransportError::Ioctl(io::Error::last_os_error()));
        }

        if command.direction == DataDirection::In {
            let delivered = (hdr.dxfer_len as usize).saturating_sub(hdr.resid.max(0) as usize);
            data.truncate(delivered);
        } else {
            data.clear();
        }

        // Any non-zero masked status comes with kernel auto-sense attached.
        if hdr.masked_status != 0 {
            let sense = SenseReport::from_bytes(&sense_buf);
            debug!(command = command.name(), status = hdr.masked_status, sense = %sense, "Check condition");
            return Ok(ExecutionResult {
                status: Status::CheckCondition,
                data,
                sense,
            });
        }

        Ok(ExecutionResult::good(data))
    }
}

impl ScsiTransport for SgTransport {
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult, TransportError> {
        run_with_transient_retry(
            TRANSIENT_RETRY_ATTEMPTS,
            Duration::from_millis(TRANSIENT_RETRY_DELAY_MS),
            || self.issue(command),
        )
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(SG_POLL_INTERVAL_MS)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

/// Retry policy for transient sense conditions.
///
/// Re-issues the command while it fails with a transient sense, sleeping
/// between attempts. The last attempt's outcome is returned whether or not
/// the condition cleared; bus errors abort immediately.
fn run_with_transient_retry<F>(
    attempts: u32,
    delay: Duration,
    mut issue: F,
) -> Result<ExecutionResult, TransportError>
where
    F: FnMut() -> Result<ExecutionResult, TransportError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = issue()?;
        if result.status.is_good() || !result.sense.is_transient() || attempt == attempts {
            return Ok(result);
        }
        debug!(attempt, sense = %result.sense, "Transient condition, retrying");
        thread::sleep(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sense::sense;

    fn transient_result() -> ExecutionResult {
        ExecutionResult::check_condition(sense(6, 0x28, 0x00), Vec::new())
    }

    #[test]
    fn test_retry_exhausts_on_persistent_transient() {
        let mut calls = 0;
        let result = run_with_transient_retry(5, Duration::ZERO, || {
            calls += 1;
            Ok(transient_result())
        })
        .unwrap();
        assert_eq!(calls, 5);
        assert!(!result.status.is_good());
        assert!(result.sense.is_transient());
    }

    #[test]
    fn test_retry_stops_on_success() {
        let mut calls = 0;
        let result = run_with_transient_retry(5, Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Ok(transient_result())
            } else {
                Ok(ExecutionResult::good(Vec::new()))
            }
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert!(result.status.is_good());
    }

    #[test]
    fn test_non_transient_error_returns_immediately() {
        let mut calls = 0;
        let result = run_with_transient_retry(5, Duration::ZERO, || {
            calls += 1;
            Ok(ExecutionResult::check_condition(
                sense(3, 0x3a, 0x00),
                Vec::new(),
            ))
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert!(result.sense.is_out_of_paper());
    }

    #[test]
    fn test_good_result_passes_through() {
        let mut calls = 0;
        let result = run_with_transient_retry(5, Duration::ZERO, || {
            calls += 1;
            Ok(ExecutionResult::good(vec![1, 2, 3]))
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(result.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_bus_error_aborts_retry() {
        let mut calls = 0;
        let result: Result<ExecutionResult, TransportError> =
            run_with_transient_retry(5, Duration::ZERO, || {
                calls += 1;
                Err(TransportError::Ioctl(io::Error::other("bus gone")))
            });
        assert_eq!(calls, 1);
        assert!(result.is_err());
    }
}
