//! Header and payload submission with bounded backpressure.

use std::hint;
use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, error, warn};

use super::clock::TimestampCoordinator;
use crate::av::AccessUnit;
use crate::config::Config;
use crate::device::DecoderService;
use crate::error::{HwDecError, Result};

/// Per-session write counters and flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteProgress {
    /// Units handed to the writer.
    pub accepted: u64,
    /// Units whose payload was fully written.
    pub submitted: u64,
    /// Units given up on.
    pub dropped: u64,
    /// Consecutive payload writes that found the ring buffer full.
    pub blocked: u32,
    /// No more input will arrive.
    pub input_ended: bool,
    /// Set together with `reset_requested` when the decoder stalled.
    pub stream_ended: bool,
    /// The decoder stalled and must be reset.
    pub reset_requested: bool,
}

/// Outcome of one [`PacketWriter::submit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The unit is fully written, or nothing was left to write.
    Written,
    /// The decoder is full; call again with the same unit.
    RetryLater,
    /// Input has ended and every accepted unit is accounted for.
    Finished,
}

/// Pumps access units into a [`DecoderService`].
///
/// Headers are written to completion, retrying a full buffer without bound.
/// Payload writes that find the buffer full sleep and return
/// [`WriteStatus::RetryLater`], keeping the unit's cursor; after more than
/// `threshold` consecutive stalls with no room reported a reset is requested.
#[derive(Debug)]
pub struct PacketWriter {
    progress: WriteProgress,
    threshold: u32,
    retry_wait: Duration,
}

impl PacketWriter {
    /// A writer that requests a reset after more than `threshold` stalls and
    /// sleeps `retry_wait` after each.
    pub fn new(threshold: u32, retry_wait: Duration) -> Self {
        Self {
            progress: WriteProgress::default(),
            threshold,
            retry_wait,
        }
    }

    /// A writer tuned from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.blocked_write_threshold, config.write_retry_wait)
    }

    /// Stalls tolerated before a reset is requested.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Current counters.
    pub fn progress(&self) -> &WriteProgress {
        &self.progress
    }

    /// Counts a unit handed over for writing.
    pub fn note_accepted(&mut self) {
        self.progress.accepted += 1;
    }

    /// Counts a unit that will never be written.
    pub fn note_dropped(&mut self) {
        self.progress.dropped += 1;
    }

    /// Records that no more input will arrive.
    pub fn end_input(&mut self) {
        self.progress.input_ended = true;
    }

    /// True when a stall asked for a decoder reset.
    pub fn reset_requested(&self) -> bool {
        self.progress.reset_requested
    }

    /// Zeroes every counter and flag.
    pub fn clear(&mut self) {
        self.progress = WriteProgress::default();
    }

    /// Input has ended and every accepted unit was written or dropped.
    pub fn is_finished(&self) -> bool {
        let p = &self.progress;
        p.input_ended && p.submitted + p.dropped == p.accepted
    }

    /// Writes `unit`'s pending header and as much payload as the decoder
    /// takes.
    ///
    /// The timestamp is checked in and the header written once per unit;
    /// a retried unit resumes at its payload cursor.
    pub fn submit(
        &mut self,
        unit: &mut AccessUnit,
        service: &dyn DecoderService,
        timestamps: &mut TimestampCoordinator,
    ) -> Result<WriteStatus> {
        if unit.pending_header() {
            if unit.is_valid() {
                timestamps.check_in(unit, service)?;
            }
            write_header(unit, service)?;
            unit.clear_pending_header();
        }

        if unit.is_valid() && unit.payload().is_empty() {
            self.consumed(unit);
        }

        while unit.is_valid() {
            let remaining = unit.remaining().len();
            match service.write(unit.remaining()) {
                Ok(0) => return Ok(self.stalled(remaining, service)),
                Ok(n) if n > remaining => {
                    self.progress.blocked = 0;
                    error!("decoder claims {} bytes of {}", n, remaining);
                    return Err(HwDecError::WriteFailed(format!(
                        "decoder accepted {} of {} bytes",
                        n, remaining
                    )));
                }
                Ok(n) => {
                    self.progress.blocked = 0;
                    unit.advance(n);
                    if n == remaining {
                        self.consumed(unit);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(self.stalled(remaining, service));
                }
                Err(e) => {
                    self.progress.blocked = 0;
                    error!("payload write failed: {}", e);
                    return Err(HwDecError::WriteFailed(e.to_string()));
                }
            }
        }

        if self.is_finished() {
            debug!("all {} units written", self.progress.accepted);
            return Ok(WriteStatus::Finished);
        }
        Ok(WriteStatus::Written)
    }

    fn consumed(&mut self, unit: &mut AccessUnit) {
        self.progress.submitted += 1;
        unit.mark_consumed();
    }

    fn stalled(&mut self, remaining: usize, service: &dyn DecoderService) -> WriteStatus {
        let room = matches!(service.buffer_state(), Ok(state) if state.free() >= remaining);
        if room {
            self.progress.blocked = 0;
        } else {
            self.progress.blocked += 1;
        }

        if self.progress.blocked > self.threshold {
            warn!(
                "write blocked {} times in a row, decoder needs a reset",
                self.progress.blocked
            );
            self.progress.blocked = 0;
            self.progress.reset_requested = true;
            self.progress.stream_ended = true;
        }

        if !self.retry_wait.is_zero() {
            thread::sleep(self.retry_wait);
        }
        debug!("decoder full, {} bytes pending", remaining);
        WriteStatus::RetryLater
    }
}

fn write_header(unit: &mut AccessUnit, service: &dyn DecoderService) -> Result<()> {
    let len = unit.header_remaining().len();
    write_blocking(service, unit.header_remaining())?;
    unit.advance_header(len);
    Ok(())
}

/// Writes all of `data`, spinning while the decoder is full. Any other
/// error is fatal.
pub(crate) fn write_blocking(service: &dyn DecoderService, data: &[u8]) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        let remaining = data.len() - pos;
        match service.write(&data[pos..]) {
            Ok(n) if n > remaining => {
                return Err(HwDecError::WriteFailed(format!(
                    "decoder accepted {} of {} header bytes",
                    n, remaining
                )));
            }
            Ok(0) => hint::spin_loop(),
            Ok(n) => pos += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => hint::spin_loop(),
            Err(e) => {
                error!("header write failed: {}", e);
                return Err(HwDecError::WriteFailed(e.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::HeaderBlob;
    use crate::device::{BufferState, MockDecoderService, MockWrite};
    use pretty_assertions::assert_eq;

    fn writer() -> PacketWriter {
        PacketWriter::new(50, Duration::ZERO)
    }

    fn full() -> BufferState {
        BufferState {
            capacity: 1000,
            data_len: 1000,
        }
    }

    fn filled(payload: &[u8]) -> AccessUnit {
        let mut unit = AccessUnit::new();
        unit.fill(payload, None, Some(9000), 0, true).unwrap();
        unit
    }

    #[test]
    fn header_then_payload_across_short_writes() {
        let service = MockDecoderService::new();
        service.push_writes([
            MockWrite::WouldBlock,
            MockWrite::Partial(2),
            MockWrite::Accept,
            MockWrite::Partial(3),
            MockWrite::Accept,
        ]);
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);
        let mut unit = filled(&[1, 2, 3, 4, 5, 6, 7]);
        unit.attach_header(HeaderBlob::new(vec![0xa, 0xb, 0xc, 0xd]));
        w.note_accepted();

        assert_eq!(w.submit(&mut unit, &service, &mut ts).unwrap(), WriteStatus::Written);
        assert_eq!(service.stream(), vec![0xa, 0xb, 0xc, 0xd, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(service.checkins(), vec![9000]);
        assert!(!unit.is_valid());
        assert_eq!(w.progress().submitted, 1);
    }

    #[test]
    fn retry_resumes_at_cursor_without_second_check_in() {
        let service = MockDecoderService::new();
        service.set_buffer_state(full());
        service.push_writes([MockWrite::Partial(2), MockWrite::WouldBlock]);
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);
        let mut unit = filled(&[1, 2, 3, 4]);

        assert_eq!(w.submit(&mut unit, &service, &mut ts).unwrap(), WriteStatus::RetryLater);
        assert!(unit.is_valid());
        assert_eq!(w.progress().blocked, 1);

        assert_eq!(w.submit(&mut unit, &service, &mut ts).unwrap(), WriteStatus::Written);
        assert_eq!(service.stream(), vec![1, 2, 3, 4]);
        assert_eq!(service.checkins(), vec![9000]);
        assert_eq!(w.progress().blocked, 0);
    }

    fn stall(times: usize) -> PacketWriter {
        let service = MockDecoderService::new();
        service.set_buffer_state(full());
        service.push_writes(std::iter::repeat(MockWrite::WouldBlock).take(times));
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);
        let mut unit = filled(&[1, 2, 3]);
        for _ in 0..times {
            assert_eq!(w.submit(&mut unit, &service, &mut ts).unwrap(), WriteStatus::RetryLater);
        }
        w
    }

    #[test]
    fn fifty_stalls_do_not_request_reset() {
        let w = stall(50);
        assert_eq!(w.progress().blocked, 50);
        assert!(!w.reset_requested());
        assert!(!w.progress().stream_ended);
    }

    #[test]
    fn fifty_first_stall_requests_reset() {
        let w = stall(51);
        assert_eq!(w.progress().blocked, 0);
        assert!(w.reset_requested());
        assert!(w.progress().stream_ended);
    }

    #[test]
    fn room_in_buffer_keeps_counter_at_zero() {
        let service = MockDecoderService::new();
        service.push_writes(std::iter::repeat(MockWrite::WouldBlock).take(60));
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);
        let mut unit = filled(&[1, 2, 3]);
        for _ in 0..60 {
            w.submit(&mut unit, &service, &mut ts).unwrap();
        }
        assert_eq!(w.progress().blocked, 0);
        assert!(!w.reset_requested());
    }

    #[test]
    fn hard_error_fails_packet_and_clears_counter() {
        let service = MockDecoderService::new();
        service.set_buffer_state(full());
        service.push_writes([MockWrite::WouldBlock, MockWrite::Fail]);
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);
        let mut unit = filled(&[1, 2, 3]);
        w.submit(&mut unit, &service, &mut ts).unwrap();
        assert_eq!(w.progress().blocked, 1);
        assert!(matches!(
            w.submit(&mut unit, &service, &mut ts),
            Err(HwDecError::WriteFailed(_))
        ));
        assert_eq!(w.progress().blocked, 0);
    }

    #[test]
    fn header_error_is_fatal() {
        let service = MockDecoderService::new();
        service.push_writes([MockWrite::Fail]);
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);
        let mut unit = filled(&[1]);
        unit.attach_header(HeaderBlob::new(vec![9u8; 4]));
        assert!(w.submit(&mut unit, &service, &mut ts).is_err());
        assert!(service.stream().is_empty());
    }

    #[test]
    fn finished_once_input_ends_and_all_units_are_accounted() {
        let service = MockDecoderService::new();
        let mut w = writer();
        let mut ts = TimestampCoordinator::new(true);

        let mut unit = filled(&[1, 2]);
        w.note_accepted();
        assert_eq!(w.submit(&mut unit, &service, &mut ts).unwrap(), WriteStatus::Written);

        unit.fill(&[], None, None, 0, false).unwrap();
        w.note_accepted();
        w.end_input();
        assert_eq!(w.submit(&mut unit, &service, &mut ts).unwrap(), WriteStatus::Finished);
        assert_eq!(w.progress().submitted, 2);
    }
}
