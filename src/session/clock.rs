//! Timestamp check-in and output clock bookkeeping.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::av::time::{pts_to_seconds, seconds_to_pts, PTS_FREQ};
use crate::av::AccessUnit;
use crate::device::{paths, ControlSurface, DecoderService};
use crate::error::{HwDecError, Result};

/// Buffered durations above this are reported as this.
pub const MAX_BUFFERED_SECS: f64 = 7.0;

/// The player's master clock and playback state, as seen by the poller.
pub trait PlayerClock: Send + Sync {
    /// Current master clock in seconds, 0.0 when there is none.
    fn clock_seconds(&self) -> f64;

    /// Whether a player is running at all.
    fn is_playing(&self) -> bool;

    /// Whether the running player is paused.
    fn is_paused(&self) -> bool;

    /// Render pipeline latency in seconds.
    fn display_latency(&self) -> f64 {
        0.0
    }

    /// User configured audio delay in seconds.
    fn audio_delay(&self) -> f64 {
        0.0
    }
}

/// A clock with no player behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClock;

impl PlayerClock for NullClock {
    fn clock_seconds(&self) -> f64 {
        0.0
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn is_paused(&self) -> bool {
        false
    }
}

/// A settable clock for driving sessions without a player.
#[derive(Debug, Default)]
pub struct ManualClock {
    seconds: AtomicU64,
    latency: AtomicU64,
    audio_delay: AtomicU64,
    state: AtomicI64,
}

impl ManualClock {
    const STOPPED: i64 = 0;
    const PLAYING: i64 = 1;
    const PAUSED: i64 = 2;

    /// A stopped clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the master clock.
    pub fn set_seconds(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::Release);
    }

    /// Sets display latency and audio delay.
    pub fn set_offsets(&self, latency: f64, audio_delay: f64) {
        self.latency.store(latency.to_bits(), Ordering::Release);
        self.audio_delay.store(audio_delay.to_bits(), Ordering::Release);
    }

    /// Marks the player running, paused or not.
    pub fn set_playing(&self, paused: bool) {
        let state = if paused { Self::PAUSED } else { Self::PLAYING };
        self.state.store(state, Ordering::Release);
    }

    /// Marks the player stopped.
    pub fn stop(&self) {
        self.state.store(Self::STOPPED, Ordering::Release);
    }
}

impl PlayerClock for ManualClock {
    fn clock_seconds(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Acquire))
    }

    fn is_playing(&self) -> bool {
        self.state.load(Ordering::Acquire) != Self::STOPPED
    }

    fn is_paused(&self) -> bool {
        self.state.load(Ordering::Acquire) == Self::PAUSED
    }

    fn display_latency(&self) -> f64 {
        f64::from_bits(self.latency.load(Ordering::Acquire))
    }

    fn audio_delay(&self) -> f64 {
        f64::from_bits(self.audio_delay.load(Ordering::Acquire))
    }
}

/// Auto-reset event: one `set` releases one successful wait.
#[derive(Debug, Default)]
pub struct ReadyEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl ReadyEvent {
    /// An unsignaled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event, waking any waiter.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    /// Clears a pending signal.
    pub fn clear(&self) {
        *self.signaled.lock() = false;
    }

    /// Waits up to `timeout` for the event and consumes it. Returns false on
    /// timeout.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signaled, false)
    }
}

/// Timing values shared between the caller's thread and the poller.
///
/// Each value has a single writer: `first_pts` and `last_pts` are written by
/// the decode path, `cur_pts` and the picture counter by the poller.
#[derive(Debug, Default)]
pub struct ClockState {
    first_pts: AtomicI64,
    last_pts: AtomicI64,
    cur_pts: AtomicI64,
    picture_count: AtomicU64,
    ready: ReadyEvent,
}

impl ClockState {
    /// Zeroed state.
    pub fn new() -> Self {
        Self::default()
    }

    /// First timestamp checked in since open or reset, 0 before that.
    pub fn first_pts(&self) -> i64 {
        self.first_pts.load(Ordering::Acquire)
    }

    /// Latches the first checked-in timestamp once it is known.
    pub fn note_first_pts(&self, pts: i64) {
        if self.first_pts() == 0 {
            self.first_pts.store(pts, Ordering::Release);
        }
    }

    /// Last timestamp checked in.
    pub fn last_pts(&self) -> i64 {
        self.last_pts.load(Ordering::Acquire)
    }

    /// Mirrors the access unit's last checked-in timestamp.
    pub fn set_last_pts(&self, pts: i64) {
        self.last_pts.store(pts, Ordering::Release);
    }

    /// Decoder output clock as of the last poll, 0 until output starts.
    pub fn cur_pts(&self) -> i64 {
        self.cur_pts.load(Ordering::Acquire)
    }

    /// Pictures seen by the poller since open or reset.
    pub fn picture_count(&self) -> u64 {
        self.picture_count.load(Ordering::Acquire)
    }

    /// Records a new output clock value, counts a picture and signals it.
    pub fn record_picture(&self, pts: i64) -> u64 {
        self.cur_pts.store(pts, Ordering::Release);
        let count = self.picture_count.fetch_add(1, Ordering::AcqRel) + 1;
        self.ready.set();
        count
    }

    /// Waits up to `timeout` for the next picture signal.
    pub fn wait_picture(&self, timeout: Duration) -> bool {
        self.ready.wait_for(timeout)
    }

    /// Zeroes the timing accumulators. `last_pts` is zeroed as well when
    /// `include_last` is set.
    pub fn reset(&self, include_last: bool) {
        self.first_pts.store(0, Ordering::Release);
        self.cur_pts.store(0, Ordering::Release);
        self.picture_count.store(0, Ordering::Release);
        if include_last {
            self.last_pts.store(0, Ordering::Release);
        }
        self.ready.clear();
    }

    /// Buffered seconds for the current values.
    pub fn buffered_duration(&self) -> f64 {
        buffered_duration(self.last_pts(), self.first_pts(), self.cur_pts())
    }
}

/// Seconds between the last checked-in timestamp and the output clock, or
/// the first checked-in timestamp while output has not started. Clamped to
/// `0.0..=7.0`; the consuming pipeline misbehaves above 8 seconds.
pub fn buffered_duration(last_pts: i64, first_pts: i64, cur_pts: i64) -> f64 {
    let base = if cur_pts == 0 { first_pts } else { cur_pts };
    let secs = last_pts.saturating_sub(base) as f64 / PTS_FREQ as f64;
    secs.clamp(0.0, MAX_BUFFERED_SECS)
}

/// Returns the player time to push into the decoder when the decoder's
/// output clock (`pts_video`, ticks) has drifted from `app_secs` by more
/// than `threshold` seconds.
pub fn clock_correction(pts_video: i64, app_secs: f64, threshold: f64) -> Option<i64> {
    if (pts_to_seconds(pts_video) - app_secs).abs() > threshold {
        Some(seconds_to_pts(app_secs))
    } else {
        None
    }
}

/// Reads the decoder's output clock (hex text, optional `0x`).
pub fn read_output_clock(control: &dyn ControlSurface) -> Result<i64> {
    let raw = control.read(paths::PTS_VIDEO)?;
    let text = raw.trim().trim_end_matches('\0');
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    Ok(i64::from_str_radix(digits, 16)?)
}

/// Writes the decoder's free-running clock register.
pub fn write_output_clock(control: &dyn ControlSurface, pts: i64) -> Result<()> {
    control.set_str(paths::PTS_PCRSCR, &format!("0x{:x}", pts as u64))
}

/// Assigns decoder timestamps to access units on their first submission.
#[derive(Debug)]
pub struct TimestampCoordinator {
    elementary: bool,
    first_checked_in: bool,
    carry_duration: i64,
}

impl TimestampCoordinator {
    /// Check-ins only happen for elementary streams.
    pub fn new(elementary: bool) -> Self {
        Self {
            elementary,
            first_checked_in: false,
            carry_duration: 1,
        }
    }

    /// Duration multiplier applied to the next dts-only unit.
    pub fn carry_duration(&self) -> i64 {
        self.carry_duration
    }

    /// Checks in the unit's timestamp.
    ///
    /// A present pts is used as is. A dts alone is scaled by the duration
    /// carried from the previous dts-only unit, which then carries this
    /// unit's duration (1 when unknown). With neither, 0 is checked in for
    /// the first unit only. Only positive values become the unit's last pts.
    pub fn check_in(&mut self, unit: &mut AccessUnit, service: &dyn DecoderService) -> Result<()> {
        if !self.elementary {
            return Ok(());
        }

        let mut pts = 0;
        if let Some(value) = unit.pts() {
            pts = value;
            service.checkin_pts(pts).map_err(|e| timestamp_error("pts", e))?;
        } else if let Some(dts) = unit.dts() {
            pts = dts.wrapping_mul(self.carry_duration);
            service.checkin_pts(pts).map_err(|e| timestamp_error("dts", e))?;
            self.carry_duration = if unit.duration() != 0 { unit.duration() } else { 1 };
        } else if !self.first_checked_in {
            service.checkin_pts(0).map_err(|e| timestamp_error("initial", e))?;
        }
        self.first_checked_in = true;

        if pts > 0 {
            unit.set_last_pts(pts);
        }
        debug!("checked in pts {}", pts);
        Ok(())
    }
}

fn timestamp_error(which: &str, err: HwDecError) -> HwDecError {
    warn!("{} check-in rejected: {}", which, err);
    match err {
        HwDecError::Timestamp(_) => err,
        other => HwDecError::Timestamp(other.to_string()),
    }
}
