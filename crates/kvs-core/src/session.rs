//! Scan session state machine.
//!
//! A session owns one device transport and sequences a multi-page,
//! optionally duplex scan:
//!
//! 1. `set_windows` programs the scan windows (front, and back for duplex)
//! 2. `start_scan` feeds a block of pages into the scanner pipeline
//! 3. per page and side: `wait_for_buffer`, `picture_size`, then
//!    `read_chunk` until the end-of-page flag (`read_side` does all three)
//! 4. after `block_size` pages the session returns to idle and the caller
//!    repeats from step 1 for the next block
//!
//! Pages must be read in increasing order, front before back; the device
//! itself polices this and the session surfaces its verdict verbatim.
//! Running out of paper is the normal end of a continuous scan, not a
//! fault.

use std::thread;
use tracing::{debug, info, instrument, warn};

use crate::error::ScanError;
use crate::protocol::command::{Command, CommandError, parse_buffer_status, parse_picture_size};
use crate::protocol::constants::{MAX_READ_SIZE, WINDOW_ID_BACK};
use crate::protocol::window::{PAGES_CONTINUOUS, WindowDescriptor};
use crate::sense::SenseReport;
use crate::transport::{ExecutionResult, ScsiTransport};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Windows are programmed; SCAN may be issued.
    WindowsSet,
    /// A block of pages is moving through the scanner.
    Scanning,
    /// STOP was issued; already-buffered pages stay readable until the
    /// device reports the feeder has drained.
    Stopped,
    /// Unrecoverable; tear the session down and reopen the device.
    Faulted,
}

/// Which face of the sheet a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
}

impl Side {
    pub fn is_back(self) -> bool {
        matches!(self, Side::Back)
    }

    /// Single-letter tag used in file names and logs.
    pub fn tag(self) -> &'static str {
        match self {
            Side::Front => "A",
            Side::Back => "B",
        }
    }
}

/// One READ IMAGE result.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub bytes: Vec<u8>,
    /// The last byte of this page side is included.
    pub end_of_page: bool,
}

/// A fully assembled page side.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Logical page number, monotonic across blocks.
    pub page: u32,
    pub side: Side,
    /// Pixel dimensions reported by the device.
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A scan session owning an exclusive device transport.
pub struct ScanSession<T: ScsiTransport> {
    transport: T,
    window: WindowDescriptor,
    duplex: bool,
    state: SessionState,
    /// Logical page cursor, monotonic for the life of the session.
    page: u32,
    side: Side,
    /// Logical page number at the start of the current SCAN cycle. The
    /// hardware addresses pages relative to this with a wrapping 8-bit
    /// index.
    cycle_base: u32,
    /// Pages per SCAN cycle; `None` when scanning continuously.
    block_pages: Option<u32>,
}

impl<T: ScsiTransport> ScanSession<T> {
    pub fn new(transport: T, window: WindowDescriptor, duplex: bool) -> Self {
        info!(device = %transport.describe(), duplex, "Session opened");
        Self {
            transport,
            window,
            duplex,
            state: SessionState::Idle,
            page: 0,
            side: Side::Front,
            cycle_base: 0,
            block_pages: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn duplex(&self) -> bool {
        self.duplex
    }

    /// Logical page the next read will address.
    pub fn current_page(&self) -> u32 {
        self.page
    }

    pub fn current_side(&self) -> Side {
        self.side
    }

    pub fn window(&self) -> &WindowDescriptor {
        &self.window
    }

    /// Window settings for the next `set_windows`. Changes take effect
    /// when the windows are re-programmed.
    pub fn window_mut(&mut self) -> &mut WindowDescriptor {
        &mut self.window
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the device. The transport's teardown releases the
    /// interface or file handle on every exit path.
    pub fn close(self) {
        info!(device = %self.transport.describe(), "Session closed");
    }

    /// Program the scan windows from the current descriptor: RESET WINDOW
    /// followed by SET WINDOW, re-sent with the back-side identifier when
    /// scanning duplex.
    #[instrument(skip(self), fields(device = %self.transport.describe()))]
    pub fn set_windows(&mut self) -> Result<(), ScanError> {
        self.ensure("SET WINDOW", &[SessionState::Idle, SessionState::WindowsSet])?;

        let result = self.run(&Command::reset_window())?;
        self.check_good(result)?;

        let result = self.run(&Command::set_window(&self.window, 0))?;
        self.check_good(result)?;

        if self.duplex {
            let result = self.run(&Command::set_window(&self.window, WINDOW_ID_BACK))?;
            self.check_good(result)?;
        }

        self.block_pages = match self.window.pages_to_scan {
            PAGES_CONTINUOUS => None,
            0 | 1 => Some(1),
            n => Some(n as u32),
        };
        self.state = SessionState::WindowsSet;
        debug!(block = ?self.block_pages, "Windows programmed");
        Ok(())
    }

    /// Start scanning the next block of pages. Out-of-paper here means no
    /// document is loaded; it is reported but leaves the session reusable.
    #[instrument(skip(self), fields(device = %self.transport.describe()))]
    pub fn start_scan(&mut self) -> Result<(), ScanError> {
        self.ensure("SCAN", &[SessionState::WindowsSet])?;

        let result = self.run(&Command::scan())?;
        self.check_good(result)?;

        self.cycle_base = self.page;
        self.side = Side::Front;
        self.state = SessionState::Scanning;
        debug!(first_page = self.page, "Scan started");
        Ok(())
    }

    /// Poll GET DATA BUFFER STATUS until image data is available; returns
    /// the available byte count. There is no retry ceiling: the scanner,
    /// not the driver, bounds how long a page takes to arrive.
    pub fn wait_for_buffer(&mut self) -> Result<u32, ScanError> {
        self.ensure(
            "GET DATA BUFFER STATUS",
            &[SessionState::Scanning, SessionState::Stopped],
        )?;

        loop {
            let result = self.run(&Command::buffer_status())?;
            self.check_good(result.clone())?;
            let status = parse_buffer_status(&result.data).map_err(|e| self.protocol(e))?;
            if status.available > 0 {
                debug!(window_id = status.window_id, available = status.available, "Buffer ready");
                return Ok(status.available);
            }
            thread::sleep(self.transport.poll_interval());
        }
    }

    /// Pixel dimensions of a buffered page side. Asking about a page that
    /// is not valid yet (out of order) is rejected by the device.
    pub fn picture_size(&mut self, page: u32, side: Side) -> Result<(u32, u32), ScanError> {
        self.ensure(
            "PICTURE ELEMENT SIZE",
            &[SessionState::Scanning, SessionState::Stopped],
        )?;

        let command = Command::picture_element_size(self.hw_page(page), side.is_back());
        let result = self.run(&command)?;
        self.check_good(result.clone())?;
        let (width, height) = parse_picture_size(&result.data).map_err(|e| self.protocol(e))?;
        debug!(page, side = side.tag(), width, height, "Picture size");
        Ok((width, height))
    }

    /// Read up to `max_len` bytes of image data for a page side. The
    /// request is capped at the device's transfer limit; the end-of-page
    /// flag reports when the last byte has been delivered.
    pub fn read_chunk(&mut self, page: u32, side: Side, max_len: usize) -> Result<Chunk, ScanError> {
        self.ensure(
            "READ IMAGE",
            &[SessionState::Scanning, SessionState::Stopped],
        )?;

        let request = max_len.min(MAX_READ_SIZE);
        let command = Command::read_image(self.hw_page(page), side.is_back(), request)?;
        let result = self.run(&command)?;

        if result.status.is_good() {
            if result.data.len() < request {
                let received = result.data.len();
                self.state = SessionState::Faulted;
                return Err(ScanError::DataTransfer {
                    requested: request,
                    received,
                });
            }
            return Ok(Chunk {
                bytes: result.data,
                end_of_page: false,
            });
        }

        // The one sanctioned short read: current error + ILI means the
        // page ended inside this request.
        if let Some(short) = result.sense.read_shortfall(request) {
            let mut bytes = result.data;
            bytes.truncate(short.delivered);
            return Ok(Chunk {
                bytes,
                end_of_page: short.end_of_page,
            });
        }

        Err(self.classify(result.sense))
    }

    /// Read one complete page side at the session's cursor: wait for the
    /// buffer, query the dimensions, then drain the image in chunks. The
    /// cursor advances front-to-back, then to the next page; completing a
    /// block returns the session to idle for the next cycle.
    pub fn read_side(&mut self) -> Result<PageImage, ScanError> {
        let page = self.page;
        let side = self.side;

        self.wait_for_buffer()?;
        let (width, height) = self.picture_size(page, side)?;

        let mut data = Vec::new();
        loop {
            let chunk = self.read_chunk(page, side, MAX_READ_SIZE)?;
            data.extend_from_slice(&chunk.bytes);
            if chunk.end_of_page {
                break;
            }
        }

        info!(page, side = side.tag(), bytes = data.len(), "Page side read");
        self.advance();
        Ok(PageImage {
            page,
            side,
            width,
            height,
            data,
        })
    }

    /// Stop the feeder. Buffered pages remain readable; a later read
    /// reporting ADF-stopped marks the true end.
    #[instrument(skip(self), fields(device = %self.transport.describe()))]
    pub fn stop(&mut self) -> Result<(), ScanError> {
        self.ensure("STOP", &[SessionState::Scanning])?;

        let result = self.run(&Command::stop())?;
        self.check_good(result)?;
        self.state = SessionState::Stopped;
        info!("Feeder stopped; draining buffered pages");
        Ok(())
    }

    /// Remaining pages in the current block, if it is bounded.
    pub fn pages_left_in_block(&self) -> Option<u32> {
        self.block_pages
            .map(|block| block.saturating_sub(self.page - self.cycle_base))
    }

    fn advance(&mut self) {
        if self.duplex && self.side == Side::Front {
            self.side = Side::Back;
            return;
        }
        self.side = Side::Front;
        self.page += 1;

        if let Some(block) = self.block_pages
            && self.state == SessionState::Scanning
            && self.page - self.cycle_base >= block
        {
            debug!(pages = block, "Block complete");
            self.state = SessionState::Idle;
        }
    }

    /// Map a logical page number onto the 8-bit index the hardware
    /// understands: relative to the current cycle, wrapping past 255 when
    /// a continuous scan runs long.
    fn hw_page(&self, page: u32) -> u8 {
        page.wrapping_sub(self.cycle_base) as u8
    }

    fn ensure(&self, operation: &'static str, valid: &[SessionState]) -> Result<(), ScanError> {
        if valid.contains(&self.state) {
            return Ok(());
        }
        Err(ScanError::InvalidState {
            operation,
            state: self.state,
        })
    }

    /// Execute a command, faulting the session on unrecoverable bus
    /// errors. A data-transfer failure can simply mean the paper ran out
    /// mid-read and leaves the session state alone.
    fn run(&mut self, command: &Command) -> Result<ExecutionResult, ScanError> {
        match self.transport.execute(command) {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_data_transfer() {
                    warn!(command = command.name(), error = %e, "Data transfer failed");
                } else {
                    warn!(command = command.name(), error = %e, "Transport failed; session faulted");
                    self.state = SessionState::Faulted;
                }
                Err(e.into())
            }
        }
    }

    fn check_good(&mut self, result: ExecutionResult) -> Result<(), ScanError> {
        if result.status.is_good() {
            Ok(())
        } else {
            Err(self.classify(result.sense))
        }
    }

    /// Turn a check condition into the right error, adjusting the session
    /// state: out-of-paper and a drained feeder end the scan cycle and
    /// leave the session reusable; everything else faults it.
    fn classify(&mut self, sense: SenseReport) -> ScanError {
        if sense.is_out_of_paper() {
            info!("Out of paper; end of document");
            self.state = SessionState::Idle;
            return ScanError::Device(sense);
        }
        if sense.is_adf_stopped() && self.state == SessionState::Stopped {
            info!("Feeder drained after stop");
            self.state = SessionState::Idle;
            return ScanError::Device(sense);
        }
        if sense.is_ordering_violation() {
            warn!(sense = %sense, "Out-of-order page request");
            self.state = SessionState::Faulted;
            return ScanError::OrderingViolation(sense);
        }
        warn!(sense = %sense, "Device error; session faulted");
        self.state = SessionState::Faulted;
        ScanError::Device(sense)
    }

    fn protocol(&mut self, error: CommandError) -> ScanError {
        self.state = SessionState::Faulted;
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{
        OP_GET_DATA_BUFFER_STATUS, OP_READ, OP_SCAN, OP_SET_WINDOW,
    };
    use crate::sense::{sense, shortfall_sense};
    use crate::transport::TransportError;
    use crate::transport::mock::MockTransport;

    fn session(window: WindowDescriptor, duplex: bool) -> ScanSession<MockTransport> {
        ScanSession::new(MockTransport::new(), window, duplex)
    }

    fn window_with_pages(pages: u8) -> WindowDescriptor {
        let mut window = WindowDescriptor::usb_defaults();
        window.pages_to_scan = pages;
        window
    }

    /// Queue the replies for one complete page side: buffer status with
    /// data available, picture size, and a single short read ending the
    /// page.
    fn queue_page_side(mock: &mut MockTransport) {
        let mut status = vec![0u8; 12];
        status[11] = 0x40;
        mock.queue_data(status);

        let mut size = vec![0u8; 16];
        size[..4].copy_from_slice(&100u32.to_be_bytes());
        size[4..8].copy_from_slice(&200u32.to_be_bytes());
        mock.queue_data(size);

        let body = vec![0xAB; 1024];
        mock.queue_check_with_data(
            shortfall_sense((MAX_READ_SIZE - 1024) as u32, true),
            body,
        );
    }

    fn setup_and_scan(session: &mut ScanSession<MockTransport>) {
        let windows = if session.duplex() { 3 } else { 2 };
        session.transport_mut().queue_ok(); // RESET WINDOW
        for _ in 0..windows - 1 {
            session.transport_mut().queue_ok(); // SET WINDOW
        }
        session.transport_mut().queue_ok(); // SCAN
        session.set_windows().unwrap();
        session.start_scan().unwrap();
    }

    #[test]
    fn test_set_windows_simplex_sends_reset_then_set() {
        let mut s = session(window_with_pages(1), false);
        s.transport_mut().queue_ok();
        s.transport_mut().queue_ok();
        s.set_windows().unwrap();
        assert_eq!(s.state(), SessionState::WindowsSet);

        let cdbs = s.transport().executed_cdbs(OP_SET_WINDOW);
        assert_eq!(cdbs.len(), 2);
        // RESET WINDOW carries no transfer length, SET WINDOW carries 72.
        assert_eq!(cdbs[0][8], 0);
        assert_eq!(cdbs[1][8], 72);
    }

    #[test]
    fn test_set_windows_duplex_programs_both_sides() {
        let mut s = session(window_with_pages(1), true);
        s.transport_mut().queue_ok();
        s.transport_mut().queue_ok();
        s.transport_mut().queue_ok();
        s.set_windows().unwrap();

        let windows: Vec<_> = s
            .transport()
            .executed()
            .iter()
            .filter(|c| !c.payload.is_empty())
            .map(|c| c.payload[8])
            .collect();
        assert_eq!(windows, vec![0, WINDOW_ID_BACK]);
    }

    #[test]
    fn test_scan_without_windows_is_rejected() {
        let mut s = session(window_with_pages(1), false);
        let err = s.start_scan().unwrap_err();
        assert!(matches!(err, ScanError::InvalidState { .. }));
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_scan_out_of_paper_leaves_session_reusable() {
        let mut s = session(window_with_pages(1), false);
        s.transport_mut().queue_ok();
        s.transport_mut().queue_ok();
        s.set_windows().unwrap();

        s.transport_mut().queue_check(sense(3, 0x3a, 0x00));
        let err = s.start_scan().unwrap_err();
        assert!(err.is_end_of_document());
        assert_eq!(s.state(), SessionState::Idle);

        // A fresh cycle still works.
        s.transport_mut().queue_ok();
        s.transport_mut().queue_ok();
        s.set_windows().unwrap();
        assert_eq!(s.state(), SessionState::WindowsSet);
    }

    #[test]
    fn test_wait_for_buffer_polls_until_data() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);

        for _ in 0..3 {
            s.transport_mut().queue_data(vec![0u8; 12]);
        }
        let mut ready = vec![0u8; 12];
        ready[10] = 0x12;
        ready[11] = 0x34;
        s.transport_mut().queue_data(ready);

        assert_eq!(s.wait_for_buffer().unwrap(), 0x1234);
        let polls = s.transport().executed_cdbs(OP_GET_DATA_BUFFER_STATUS);
        assert_eq!(polls.len(), 4);
        assert_eq!(s.transport().replies_remaining(), 0);
    }

    #[test]
    fn test_block_visits_pages_in_order() {
        for pages in 1u8..=254 {
            let mut s = session(window_with_pages(pages), false);
            setup_and_scan(&mut s);

            for _ in 0..pages {
                queue_page_side(s.transport_mut());
                let image = s.read_side().unwrap();
                assert_eq!(image.width, 100);
                assert_eq!(image.height, 200);
                assert_eq!(image.data.len(), 1024);
            }

            let reads = s.transport().executed_cdbs(OP_READ);
            let visited: Vec<u8> = reads
                .iter()
                .filter(|cdb| cdb[2] == 0)
                .map(|cdb| cdb[4])
                .collect();
            let expected: Vec<u8> = (0..pages).collect();
            assert_eq!(visited, expected, "pages for block of {pages}");
            assert_eq!(s.state(), SessionState::Idle, "block of {pages} completes");
        }
    }

    #[test]
    fn test_duplex_reads_front_before_back() {
        let mut s = session(window_with_pages(2), true);
        setup_and_scan(&mut s);

        for _ in 0..4 {
            queue_page_side(s.transport_mut());
            s.read_side().unwrap();
        }

        let reads = s.transport().executed_cdbs(OP_READ);
        let sides: Vec<(u8, u8)> = reads
            .iter()
            .filter(|cdb| cdb[2] == 0)
            .map(|cdb| (cdb[4], cdb[5]))
            .collect();
        assert_eq!(sides, vec![(0, 0), (0, 0x80), (1, 0), (1, 0x80)]);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_out_of_order_page_surfaces_device_verdict() {
        let mut s = session(window_with_pages(5), false);
        setup_and_scan(&mut s);

        // Ask for page 1 before page 0: the device rejects it.
        s.transport_mut().queue_check(sense(5, 0x24, 0x00));
        let err = s.read_chunk(1, Side::Front, 4096).unwrap_err();
        match err {
            ScanError::OrderingViolation(sense) => assert_eq!(sense.code(), 0x2400),
            other => panic!("expected ordering violation, got {other:?}"),
        }
        assert_eq!(s.state(), SessionState::Faulted);
    }

    #[test]
    fn test_read_shortfall_yields_partial_chunk_and_eop() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);

        s.transport_mut()
            .queue_check_with_data(shortfall_sense(512, true), vec![0u8; 65024]);
        let chunk = s.read_chunk(0, Side::Front, 65536).unwrap();
        assert_eq!(chunk.bytes.len(), 65024);
        assert!(chunk.end_of_page);
    }

    #[test]
    fn test_good_short_read_without_sense_is_hard_error() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);

        s.transport_mut().queue_data(vec![0u8; 100]);
        let err = s.read_chunk(0, Side::Front, 4096).unwrap_err();
        assert!(matches!(
            err,
            ScanError::DataTransfer {
                requested: 4096,
                received: 100
            }
        ));
        assert_eq!(s.state(), SessionState::Faulted);
    }

    #[test]
    fn test_read_chunk_caps_request_at_transfer_limit() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);

        s.transport_mut()
            .queue_check_with_data(shortfall_sense(MAX_READ_SIZE as u32, true), Vec::new());
        s.read_chunk(0, Side::Front, usize::MAX).unwrap();

        let reads = s.transport().executed_cdbs(OP_READ);
        assert_eq!(&reads[0][6..9], &[0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_data_transfer_failure_does_not_fault() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);

        s.transport_mut()
            .queue_bus_error(TransportError::DataTransfer("short bulk transfer".into()));
        let err = s.read_chunk(0, Side::Front, 4096).unwrap_err();
        assert!(matches!(err, ScanError::Transport(ref t) if t.is_data_transfer()));
        assert_eq!(s.state(), SessionState::Scanning);
    }

    #[test]
    fn test_command_send_failure_faults_session() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);

        s.transport_mut()
            .queue_bus_error(TransportError::CommandSend("pipe broke".into()));
        s.read_chunk(0, Side::Front, 4096).unwrap_err();
        assert_eq!(s.state(), SessionState::Faulted);
    }

    #[test]
    fn test_stop_then_drain_until_adf_stopped() {
        let mut s = session(window_with_pages(PAGES_CONTINUOUS), false);
        setup_and_scan(&mut s);

        s.transport_mut().queue_ok();
        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Stopped);

        // A buffered page is still readable after STOP.
        queue_page_side(s.transport_mut());
        let image = s.read_side().unwrap();
        assert_eq!(image.page, 0);

        // The next read hits the drained feeder.
        s.transport_mut().queue_check(sense(2, 0x80, 0x02));
        let err = s.read_chunk(1, Side::Front, 4096).unwrap_err();
        assert!(err.is_adf_stopped());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_jam_faults_session() {
        let mut s = session(window_with_pages(PAGES_CONTINUOUS), false);
        setup_and_scan(&mut s);

        s.transport_mut().queue_check(sense(3, 0x80, 0x01));
        let err = s.read_chunk(0, Side::Front, 4096).unwrap_err();
        assert!(!err.is_end_of_document());
        assert_eq!(err.sense().unwrap().message(), Some("Jammed at document lead"));
        assert_eq!(s.state(), SessionState::Faulted);
    }

    #[test]
    fn test_hardware_page_index_wraps_at_256() {
        let mut s = session(window_with_pages(PAGES_CONTINUOUS), false);
        setup_and_scan(&mut s);

        assert_eq!(s.hw_page(0), 0);
        assert_eq!(s.hw_page(255), 255);
        assert_eq!(s.hw_page(256), 0);
        assert_eq!(s.hw_page(300), 44);
    }

    #[test]
    fn test_hardware_page_index_is_cycle_relative() {
        let mut s = session(window_with_pages(2), false);
        setup_and_scan(&mut s);
        for _ in 0..2 {
            queue_page_side(s.transport_mut());
            s.read_side().unwrap();
        }
        assert_eq!(s.state(), SessionState::Idle);

        // Second block: logical pages 2..4 map onto hardware 0..2 again.
        setup_and_scan(&mut s);
        for _ in 0..2 {
            queue_page_side(s.transport_mut());
            s.read_side().unwrap();
        }

        let reads = s.transport().executed_cdbs(OP_READ);
        let visited: Vec<u8> = reads
            .iter()
            .filter(|cdb| cdb[2] == 0)
            .map(|cdb| cdb[4])
            .collect();
        assert_eq!(visited, vec![0, 1, 0, 1]);
        assert_eq!(s.current_page(), 4);
    }

    #[test]
    fn test_scan_issues_the_scan_opcode_once_per_cycle() {
        let mut s = session(window_with_pages(1), false);
        setup_and_scan(&mut s);
        assert_eq!(s.transport().executed_cdbs(OP_SCAN).len(), 1);
    }
}
