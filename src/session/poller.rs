//! Background activity that follows the decoder's output clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};

use super::clock::{
    clock_correction, read_output_clock, write_output_clock, ClockState, PlayerClock, ReadyEvent,
};
use crate::config::Config;
use crate::device::{ControlSurface, DecoderService};
use crate::error::Result;

/// Remembers the last pause state pushed to the decoder so repeated states
/// are not re-sent. Starts unknown, so the first state always applies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PauseLatch {
    applied: Option<bool>,
}

impl PauseLatch {
    /// A latch with nothing applied yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses or resumes the decoder unless `paused` is already applied.
    /// Returns whether a call was made.
    pub fn apply(&mut self, paused: bool, service: &dyn DecoderService) -> bool {
        if self.applied == Some(paused) {
            return false;
        }
        self.applied = Some(paused);
        let result = if paused { service.pause() } else { service.resume() };
        if let Err(e) = result {
            warn!("decoder {} failed: {}", if paused { "pause" } else { "resume" }, e);
        }
        true
    }
}

/// Everything one poll cycle touches.
#[derive(Clone)]
pub struct PollContext {
    /// Decoder whose control events are awaited.
    pub service: Arc<dyn DecoderService>,
    /// Surface carrying the output clock registers.
    pub control: Arc<dyn ControlSurface>,
    /// Player master clock and playback state.
    pub clock: Arc<dyn PlayerClock>,
    /// Shared timing values.
    pub timing: Arc<ClockState>,
    /// Drift in seconds above which the decoder clock is corrected.
    pub correction_threshold: f64,
    /// Sleep when idle or when the control poll times out.
    pub idle_wait: Duration,
}

/// What one poll cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing checked in yet; slept.
    Idle,
    /// The output clock did not move or could not be read.
    Unchanged,
    /// A new picture was counted; carries the correction written, if any.
    Picture(Option<i64>),
}

/// Runs one cycle: wait for a control event, mirror the player's pause
/// state, and count a picture when the output clock moved, correcting the
/// decoder clock when it drifted from the player's.
pub fn poll_once(ctx: &PollContext, latch: &mut PauseLatch) -> PollOutcome {
    if ctx.timing.last_pts() <= 0 {
        thread::sleep(ctx.idle_wait);
        return PollOutcome::Idle;
    }

    // blocks for about one vsync
    match ctx.service.poll_control() {
        Ok(true) => {}
        Ok(false) => thread::sleep(ctx.idle_wait),
        Err(e) => {
            debug!("control poll failed: {}", e);
            thread::sleep(ctx.idle_wait);
        }
    }

    if ctx.clock.is_playing() {
        latch.apply(ctx.clock.is_paused(), ctx.service.as_ref());
    }

    let pts_video = match read_output_clock(ctx.control.as_ref()) {
        Ok(pts) => pts,
        Err(e) => {
            error!("cannot read output clock: {}", e);
            return PollOutcome::Unchanged;
        }
    };
    if pts_video == ctx.timing.cur_pts() {
        return PollOutcome::Unchanged;
    }

    // readers wait on these, publish before anything slow
    ctx.timing.record_picture(pts_video);

    let app_secs =
        ctx.clock.clock_seconds() + ctx.clock.display_latency() - ctx.clock.audio_delay();
    let correction = clock_correction(pts_video, app_secs, ctx.correction_threshold);
    if let Some(pts) = correction {
        debug!("output clock {} drifted, correcting to {}", pts_video, pts);
        if let Err(e) = write_output_clock(ctx.control.as_ref(), pts) {
            error!("cannot correct output clock: {}", e);
        }
    }
    PollOutcome::Picture(correction)
}

/// The poll loop on its own thread.
pub struct Poller {
    stop: Arc<AtomicBool>,
    exited: Arc<ReadyEvent>,
    handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl Poller {
    /// Starts polling on a thread named `hwvdec-poll`.
    pub fn spawn(ctx: PollContext, config: &Config) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(ReadyEvent::new());

        // runs at normal priority; std has no portable way to raise it
        let handle = {
            let stop = stop.clone();
            let exited = exited.clone();
            thread::Builder::new()
                .name("hwvdec-poll".into())
                .spawn(move || {
                    debug!("poller started");
                    let mut latch = PauseLatch::new();
                    while !stop.load(Ordering::Acquire) {
                        poll_once(&ctx, &mut latch);
                    }
                    debug!("poller stopped");
                    exited.set();
                })?
        };

        Ok(Self {
            stop,
            exited,
            handle: Some(handle),
            join_timeout: config.poller_join_timeout,
        })
    }

    /// Asks the loop to stop and joins it, waiting at most the configured
    /// timeout. A loop stuck in the decoder is detached.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        if self.exited.wait_for(self.join_timeout) {
            if handle.join().is_err() {
                error!("poller panicked");
            }
        } else {
            warn!("poller did not stop within {:?}, detaching", self.join_timeout);
        }
    }

    /// Whether the loop is still owned by this handle.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("running", &self.is_running())
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}
