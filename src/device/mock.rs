use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

use super::{BufferState, DecoderService, InitParams};
use crate::error::{HwDecError, Result};

/// Scripted outcome of one [`DecoderService::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockWrite {
    /// Accept everything offered.
    Accept,
    /// Accept at most this many bytes.
    Partial(usize),
    /// Report a full ring buffer.
    WouldBlock,
    /// Report a hard I/O error.
    Fail,
}

/// How often each lifecycle call reached the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct CallCounts {
    pub init: usize,
    pub close: usize,
    pub reset: usize,
    pub pause: usize,
    pub resume: usize,
    pub poll: usize,
    pub sync_thresholds: usize,
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<MockWrite>,
    stream: Vec<u8>,
    writes: Vec<Vec<u8>>,
    checkins: Vec<i64>,
    init_params: Vec<InitParams>,
    calls: CallCounts,
    buffer: BufferState,
    fail_init: bool,
    reject_checkins: bool,
}

/// Decoder service double: scripted write results, everything recorded.
///
/// Writes with an empty script are accepted in full.
#[derive(Debug)]
pub struct MockDecoderService {
    state: Mutex<MockState>,
    poll_interval: Duration,
}

impl Default for MockDecoderService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDecoderService {
    /// A decoder with a 1 MB, empty ring buffer.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                script: VecDeque::new(),
                stream: Vec::new(),
                writes: Vec::new(),
                checkins: Vec::new(),
                init_params: Vec::new(),
                calls: CallCounts::default(),
                buffer: BufferState {
                    capacity: 1_000_000,
                    data_len: 0,
                },
                fail_init: false,
                reject_checkins: false,
            }),
            poll_interval: Duration::from_millis(2),
        }
    }

    /// Makes `init` fail.
    pub fn failing_init(self) -> Self {
        self.state.lock().fail_init = true;
        self
    }

    /// Makes every timestamp check-in fail.
    pub fn rejecting_checkins(self) -> Self {
        self.state.lock().reject_checkins = true;
        self
    }

    /// Queues write outcomes.
    pub fn push_writes(&self, outcomes: impl IntoIterator<Item = MockWrite>) {
        self.state.lock().script.extend(outcomes);
    }

    /// Sets what `buffer_state` reports.
    pub fn set_buffer_state(&self, buffer: BufferState) {
        self.state.lock().buffer = buffer;
    }

    /// Concatenation of every accepted byte.
    pub fn stream(&self) -> Vec<u8> {
        self.state.lock().stream.clone()
    }

    /// Accepted bytes per successful write call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Checked-in timestamps, in order.
    pub fn checkins(&self) -> Vec<i64> {
        self.state.lock().checkins.clone()
    }

    /// Parameters of every `init` call.
    pub fn init_params(&self) -> Vec<InitParams> {
        self.state.lock().init_params.clone()
    }

    /// Lifecycle call counts.
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Forgets recorded writes and check-ins.
    pub fn clear_recorded(&self) {
        let mut state = self.state.lock();
        state.stream.clear();
        state.writes.clear();
        state.checkins.clear();
    }
}

impl DecoderService for MockDecoderService {
    fn init(&self, params: &InitParams) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.init += 1;
        state.init_params.push(params.clone());
        if state.fail_init {
            return Err(HwDecError::Init("mock decoder refused init".into()));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().calls.close += 1;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.state.lock().calls.reset += 1;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.state.lock().calls.pause += 1;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.state.lock().calls.resume += 1;
        Ok(())
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let accepted = match state.script.pop_front().unwrap_or(MockWrite::Accept) {
            MockWrite::Accept => data.len(),
            MockWrite::Partial(n) => n.min(data.len()),
            MockWrite::WouldBlock => return Err(io::ErrorKind::WouldBlock.into()),
            MockWrite::Fail => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"))
            }
        };
        state.stream.extend_from_slice(&data[..accepted]);
        state.writes.push(data[..accepted].to_vec());
        debug!("mock accepted {} of {} bytes", accepted, data.len());
        Ok(accepted)
    }

    fn checkin_pts(&self, pts: i64) -> Result<()> {
        let mut state = self.state.lock();
        if state.reject_checkins {
            return Err(HwDecError::Timestamp(format!("mock rejected pts {}", pts)));
        }
        state.checkins.push(pts);
        Ok(())
    }

    fn buffer_state(&self) -> Result<BufferState> {
        Ok(self.state.lock().buffer)
    }

    fn poll_control(&self) -> Result<bool> {
        self.state.lock().calls.poll += 1;
        thread::sleep(self.poll_interval);
        Ok(true)
    }

    fn set_sync_thresholds(&self, _av_threshold: u32, _sync_threshold: u32) -> Result<()> {
        self.state.lock().calls.sync_thresholds += 1;
        Ok(())
    }
}
