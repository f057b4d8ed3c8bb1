//! The decoder session: lifecycle, packet flow and picture timing.
//!
//! A [`DecoderSession`] composes the header synthesizer, the packet writer
//! and the timestamp coordinator on the caller's thread, and a [`Poller`]
//! thread that follows the decoder's output clock. Lifecycle calls
//! (`open`, `close`, `reset`) and `decode` all take `&mut self`, so they
//! are serialized by construction.

pub mod clock;
pub mod display;
pub mod poller;
pub mod writer;

use std::sync::Arc;

use log::{debug, error, info, warn};

pub use clock::{
    buffered_duration, ClockState, ManualClock, NullClock, PlayerClock, ReadyEvent,
    TimestampCoordinator,
};
pub use display::{DisplayControl, Rect, RenderFeature, VideoSettings};
pub use poller::{PauseLatch, PollContext, PollOutcome, Poller};
pub use writer::{PacketWriter, WriteProgress, WriteStatus};

use crate::av::time::{player_to_pts, units_to_player, PLAYER_TIME_BASE};
use crate::av::{AccessUnit, StreamDescriptor, StreamHints, StreamKind};
use crate::codec::HeaderSynthesizer;
use crate::config::{self, Config};
use crate::device::{paths, ControlSurface, DecoderService, InitParams, AV_SYNC_THRESHOLD};
use crate::error::{HwDecError, Result};

/// What the caller should do after a `decode` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Keep feeding packets.
    NeedMoreData,
    /// A new picture is due; fetch it with [`DecoderSession::picture`].
    HavePicture,
    /// A new picture is due and the decoder could take more input.
    HavePictureNeedMoreData,
}

impl DecodeStatus {
    /// Whether a picture is due.
    pub fn has_picture(self) -> bool {
        !matches!(self, DecodeStatus::NeedMoreData)
    }

    /// Whether more input is wanted.
    pub fn needs_data(self) -> bool {
        !matches!(self, DecodeStatus::HavePicture)
    }
}

/// Lifecycle state as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stream is open.
    Closed,
    /// A stream is open and playing.
    Decoding,
    /// A stream is open and the player is paused.
    Paused,
}

/// Timing of a picture produced on the decoder's own output path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPicture {
    /// Presentation time in player ticks (microseconds).
    pub pts: f64,
    /// Frame duration in player ticks.
    pub duration: f64,
    /// No pixel buffer is handed out; the picture never leaves the decoder.
    pub bypass: bool,
}

/// One demuxed packet with player-domain timestamps (microseconds).
#[derive(Debug, Clone, Copy)]
pub struct DemuxPacket<'a> {
    /// Compressed payload.
    pub data: &'a [u8],
    /// Decode timestamp.
    pub dts: Option<f64>,
    /// Presentation timestamp.
    pub pts: Option<f64>,
    /// Frame duration in decoder ticks, when the demuxer knows it.
    pub duration: Option<i64>,
    /// Whether the demuxer flagged a keyframe.
    pub keyframe: bool,
}

impl<'a> DemuxPacket<'a> {
    /// A packet with no timestamps.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            dts: None,
            pts: None,
            duration: None,
            keyframe: false,
        }
    }

    /// Sets the decode timestamp.
    pub fn with_dts(mut self, dts: f64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: f64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the frame duration in decoder ticks.
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Marks the packet as a keyframe.
    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }
}

/// Per-stream state, alive from open to close.
#[derive(Debug)]
struct OpenStream {
    descriptor: StreamDescriptor,
    params: InitParams,
    headers: HeaderSynthesizer,
    unit: AccessUnit,
    writer: PacketWriter,
    timestamps: TimestampCoordinator,
    poller: Poller,
    vbuf_size: usize,
    seen_pictures: u64,
    last_write: Option<WriteStatus>,
}

impl OpenStream {
    /// Writes the stream header up front, unless the family carries it per
    /// frame.
    fn prefeed(&mut self, service: &dyn DecoderService) {
        if self.descriptor.defers_header_to_frames() {
            return;
        }
        match self.headers.stream_header() {
            Ok(Some(header)) => {
                if let Err(e) = writer::write_blocking(service, header.as_bytes()) {
                    error!("stream header not written: {}", e);
                } else {
                    debug!("pre-fed {} header bytes", header.len());
                }
            }
            Ok(None) => {}
            Err(e) => error!("cannot build stream header: {}", e),
        }
    }

    /// Frames and makes one write attempt for a packet. Whatever the decoder
    /// did not take is dropped. `None` means the packet never reached the
    /// writer or failed there.
    fn feed(
        &mut self,
        packet: &DemuxPacket<'_>,
        service: &dyn DecoderService,
    ) -> Option<WriteStatus> {
        self.writer.note_accepted();

        let dts = packet.dts.map(player_to_pts);
        let pts = packet.pts.map(player_to_pts);
        let duration = packet.duration.unwrap_or(0);
        if let Err(e) = self
            .unit
            .fill(packet.data, dts, pts, duration, packet.keyframe)
        {
            warn!("dropping {} byte packet: {}", packet.data.len(), e);
            self.writer.note_dropped();
            return None;
        }

        match self.headers.prepare(&mut self.unit) {
            Ok(()) => {}
            Err(HwDecError::Unsupported(reason)) => {
                debug!("{}, writing packet as is", reason);
            }
            Err(e) => {
                warn!("dropping {} byte packet: {}", packet.data.len(), e);
                self.unit.discard();
                self.writer.note_dropped();
                return None;
            }
        }

        // one attempt per packet; the stall counter carries over to the next call
        let status = match self
            .writer
            .submit(&mut self.unit, service, &mut self.timestamps)
        {
            Ok(WriteStatus::Finished) => {
                info!("all input written");
                return Some(WriteStatus::Finished);
            }
            Ok(status) => Some(status),
            Err(e) => {
                warn!("packet failed: {}", e);
                None
            }
        };

        if self.unit.is_valid() {
            warn!("dropping {} unwritten bytes", self.unit.remaining().len());
            self.unit.discard();
            self.writer.note_dropped();
        }
        status
    }
}

/// Drives one hardware decoder.
pub struct DecoderSession {
    config: Config,
    service: Arc<dyn DecoderService>,
    control: Arc<dyn ControlSurface>,
    clock: Arc<dyn PlayerClock>,
    display: DisplayControl,
    timing: Arc<ClockState>,
    stream: Option<OpenStream>,
}

impl DecoderSession {
    /// A closed session using the process-wide config.
    pub fn new(
        service: Arc<dyn DecoderService>,
        control: Arc<dyn ControlSurface>,
        clock: Arc<dyn PlayerClock>,
    ) -> Self {
        Self::with_config(service, control, clock, config::current())
    }

    /// A closed session with its own config.
    pub fn with_config(
        service: Arc<dyn DecoderService>,
        control: Arc<dyn ControlSurface>,
        clock: Arc<dyn PlayerClock>,
        config: Config,
    ) -> Self {
        Self {
            display: DisplayControl::new(control.clone()),
            config,
            service,
            control,
            clock,
            timing: Arc::new(ClockState::new()),
            stream: None,
        }
    }

    /// Opens the decoder for a stream. On failure the session stays closed.
    ///
    /// Opening an open session closes it first.
    pub fn open(&mut self, hints: &StreamHints) -> Result<()> {
        if self.stream.is_some() {
            self.close();
        }

        let descriptor = StreamDescriptor::from_hints(hints);
        let params = InitParams::from_descriptor(&descriptor);
        info!(
            "opening {:?} {:?}/{:?} {}x{}",
            descriptor.codec, descriptor.format, descriptor.subtype, descriptor.width, descriptor.height
        );

        self.timing.reset(true);
        self.display.reset_latches();
        if let Err(e) = self.display.show_main_video(false) {
            warn!("cannot hide video: {}", e);
        }

        if let Err(e) = self.service.init(&params) {
            error!("decoder init failed: {}", e);
            return Err(match e {
                HwDecError::Init(_) | HwDecError::Unsupported(_) => e,
                other => HwDecError::Init(other.to_string()),
            });
        }

        if let Err(e) = self.service.set_sync_thresholds(AV_SYNC_THRESHOLD, 0) {
            warn!("cannot set sync thresholds: {}", e);
        }
        // video timing is driven from here, not by the system a/v sync
        if let Err(e) = self.control.set_int(paths::TSYNC_ENABLE, 0) {
            warn!("cannot disable tsync: {}", e);
        }

        let poller = match Poller::spawn(self.poll_context(), &self.config) {
            Ok(poller) => poller,
            Err(e) => {
                error!("cannot start poller: {}", e);
                if let Err(e) = self.service.close() {
                    warn!("decoder close failed: {}", e);
                }
                return Err(e);
            }
        };

        let mut stream = OpenStream {
            headers: HeaderSynthesizer::new(&descriptor),
            timestamps: TimestampCoordinator::new(descriptor.kind == StreamKind::Elementary),
            writer: PacketWriter::from_config(&self.config),
            unit: AccessUnit::new(),
            vbuf_size: self.config.default_vbuf_size,
            seen_pictures: 0,
            last_write: None,
            descriptor,
            params,
            poller,
        };
        stream.prefeed(self.service.as_ref());
        self.stream = Some(stream);
        Ok(())
    }

    /// Stops the poller, closes the decoder and hands timing back to the
    /// system. Closing a closed session does nothing.
    pub fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        info!("closing decoder");
        stream.poller.stop();

        if let Err(e) = self.service.close() {
            warn!("decoder close failed: {}", e);
        }
        drop(stream);

        if let Err(e) = self.control.set_int(paths::TSYNC_ENABLE, 1) {
            warn!("cannot re-enable tsync: {}", e);
        }
        if let Err(e) = self.display.show_main_video(false) {
            warn!("cannot hide video: {}", e);
        }
        self.timing.reset(true);
    }

    /// Flushes the decoder and starts the stream over, keeping the last
    /// frame on screen.
    pub fn reset(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        info!("resetting decoder");

        let blackout = match self.control.get_int(paths::BLACKOUT_POLICY) {
            Ok(policy) => Some(policy),
            Err(e) => {
                warn!("cannot read blackout policy: {}", e);
                None
            }
        };
        if let Err(e) = self.control.set_int(paths::BLACKOUT_POLICY, 0) {
            warn!("cannot hold last frame: {}", e);
        }

        if let Err(e) = self.service.reset() {
            error!("decoder reset failed: {}", e);
        }

        stream.unit.release();
        stream.headers.rewind();
        stream.writer.clear();
        stream.prefeed(self.service.as_ref());

        self.timing.reset(true);
        stream.seen_pictures = 0;

        if let Some(policy) = blackout {
            if let Err(e) = self.control.set_int(paths::BLACKOUT_POLICY, policy) {
                warn!("cannot restore blackout policy: {}", e);
            }
        }
    }

    /// Feeds one packet (`None` just polls for pictures) and reports what
    /// the caller should do next. Timestamps are player ticks.
    ///
    /// Failures are logged and the packet dropped; this never errors.
    pub fn decode(&mut self, data: Option<&[u8]>, dts: Option<f64>, pts: Option<f64>) -> DecodeStatus {
        let packet = data.map(|data| DemuxPacket {
            data,
            dts,
            pts,
            duration: None,
            keyframe: false,
        });
        self.step(packet.as_ref())
    }

    /// Like [`decode`](Self::decode) with a duration and keyframe flag.
    pub fn decode_packet(&mut self, packet: DemuxPacket<'_>) -> DecodeStatus {
        self.step(Some(&packet))
    }

    fn step(&mut self, packet: Option<&DemuxPacket<'_>>) -> DecodeStatus {
        let Some(stream) = self.stream.as_mut() else {
            warn!("decode on a closed session");
            return DecodeStatus::NeedMoreData;
        };

        if let Some(packet) = packet {
            stream.last_write = stream.feed(packet, self.service.as_ref());
            let last_pts = stream.unit.last_pts();
            self.timing.set_last_pts(last_pts);
            // the output clock lags after a seek; measure from here until it moves
            self.timing.note_first_pts(last_pts);

            if stream.writer.reset_requested() {
                warn!("decoder stalled, forcing a reset");
                self.reset();
            }
        }

        if self.timing.buffered_duration() < self.config.low_water_secs {
            return DecodeStatus::NeedMoreData;
        }

        self.timing.wait_picture(self.config.picture_wait);

        let count = self.timing.picture_count();
        let Some(stream) = self.stream.as_mut() else {
            return DecodeStatus::NeedMoreData;
        };
        if count == stream.seen_pictures {
            return DecodeStatus::NeedMoreData;
        }
        stream.seen_pictures = count;

        let low_volume = self.buffered_data_size() < self.vbuf_size() / 3;
        if self.timing.buffered_duration() < self.config.high_water_secs && low_volume {
            DecodeStatus::HavePictureNeedMoreData
        } else {
            DecodeStatus::HavePicture
        }
    }

    /// Marks the end of input; once every accepted packet is written the
    /// writer reports the stream finished.
    pub fn signal_end_of_stream(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.writer.end_input();
        }
    }

    /// True once input has ended and every accepted packet is accounted for.
    pub fn is_finished(&self) -> bool {
        self.stream
            .as_ref()
            .map_or(false, |stream| stream.writer.is_finished())
    }

    /// Timing of the picture most recently signalled. Its pts runs two frames
    /// ahead of the master clock so it is never considered late.
    pub fn picture(&self) -> DecodedPicture {
        let rate = self.stream.as_ref().map_or(0, |s| s.descriptor.rate);
        let duration = units_to_player(rate);
        let pts = self.clock.clock_seconds() * PLAYER_TIME_BASE + 2.0 * duration;
        DecodedPicture {
            pts,
            duration,
            bypass: true,
        }
    }

    /// Bytes queued in the decoder's input buffer. Also refreshes the known
    /// buffer capacity.
    pub fn buffered_data_size(&mut self) -> usize {
        match self.service.buffer_state() {
            Ok(state) => {
                if let Some(stream) = self.stream.as_mut() {
                    stream.vbuf_size = state.capacity;
                }
                state.data_len
            }
            Err(e) => {
                debug!("buffer state unavailable: {}", e);
                0
            }
        }
    }

    /// Seconds of input queued ahead of the output clock, `0.0..=7.0`.
    pub fn buffered_duration(&self) -> f64 {
        self.timing.buffered_duration()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match &self.stream {
            None => SessionState::Closed,
            Some(_) if self.clock.is_playing() && self.clock.is_paused() => SessionState::Paused,
            Some(_) => SessionState::Decoding,
        }
    }

    /// Video layer controls.
    pub fn display(&self) -> &DisplayControl {
        &self.display
    }

    /// The open stream's descriptor.
    pub fn descriptor(&self) -> Option<&StreamDescriptor> {
        self.stream.as_ref().map(|s| &s.descriptor)
    }

    /// Parameters the decoder was opened with.
    pub fn init_params(&self) -> Option<&InitParams> {
        self.stream.as_ref().map(|s| &s.params)
    }

    /// The writer's counters for the open stream.
    pub fn write_progress(&self) -> Option<WriteProgress> {
        self.stream.as_ref().map(|s| *s.writer.progress())
    }

    /// Outcome of the last packet's write attempt. `RetryLater` means the
    /// decoder was full and the packet was dropped; back off before feeding
    /// more.
    pub fn last_write_status(&self) -> Option<WriteStatus> {
        self.stream.as_ref().and_then(|s| s.last_write)
    }

    /// Shared timing values.
    pub fn timing(&self) -> &ClockState {
        &self.timing
    }

    fn vbuf_size(&self) -> usize {
        self.stream
            .as_ref()
            .map_or(self.config.default_vbuf_size, |s| s.vbuf_size)
    }

    fn poll_context(&self) -> PollContext {
        PollContext {
            service: self.service.clone(),
            control: self.control.clone(),
            clock: self.clock.clone(),
            timing: self.timing.clone(),
            correction_threshold: self.config.clock_correction_threshold,
            idle_wait: self.config.poll_idle_wait,
        }
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("config", &self.config)
            .field("stream", &self.stream)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_helpers() {
        assert!(DecodeStatus::HavePicture.has_picture());
        assert!(!DecodeStatus::HavePicture.needs_data());
        assert!(DecodeStatus::HavePictureNeedMoreData.has_picture());
        assert!(DecodeStatus::HavePictureNeedMoreData.needs_data());
        assert!(!DecodeStatus::NeedMoreData.has_picture());
    }

    #[test]
    fn packet_builder() {
        let data = [1u8, 2, 3];
        let packet = DemuxPacket::new(&data)
            .with_pts(40_000.0)
            .with_duration(3600)
            .keyframe();
        assert_eq!(packet.pts, Some(40_000.0));
        assert_eq!(packet.dts, None);
        assert_eq!(packet.duration, Some(3600));
        assert!(packet.keyframe);
    }
}
