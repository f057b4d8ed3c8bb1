//! The decoder service and control surfaces the session drives.
//!
//! Both are capabilities injected into the session: the real vendor binding
//! lives behind the `amcodec` feature, [`MockDecoderService`] and
//! [`MemoryControl`] stand in for hardware in tests.

#[cfg(feature = "amcodec")]
#[cfg_attr(docsrs, doc(cfg(feature = "amcodec")))]
pub mod amcodec;
mod mock;
mod params;
mod sysfs;

use std::io;

use crate::error::Result;

pub use mock::{CallCounts, MockDecoderService, MockWrite};
pub use params::{InitParams, EXTERNAL_PTS, SYNC_OUTSIDE};
pub use sysfs::{MemoryControl, SysfsControl};

/// A/V sync threshold handed to the decoder after init: 30 s of 90 kHz ticks.
pub const AV_SYNC_THRESHOLD: u32 = 90_000 * 30;

/// Fill level of the decoder's input ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferState {
    /// Ring buffer capacity in bytes.
    pub capacity: usize,
    /// Bytes queued and not yet consumed by the decoder.
    pub data_len: usize,
}

impl BufferState {
    /// Bytes that can still be written.
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.data_len)
    }
}

/// Call contract of the fixed-function decoder.
///
/// Methods take `&self`: the session's write path and the background poller
/// call in concurrently, so implementations synchronize internally.
pub trait DecoderService: Send + Sync {
    /// Opens a decoding session with `params`.
    fn init(&self, params: &InitParams) -> Result<()>;

    /// Tears the session down.
    fn close(&self) -> Result<()>;

    /// Flushes the decoder, keeping the session open.
    fn reset(&self) -> Result<()>;

    /// Freezes output.
    fn pause(&self) -> Result<()>;

    /// Resumes output.
    fn resume(&self) -> Result<()>;

    /// Writes bitstream bytes, returning how many were accepted. A full ring
    /// buffer is reported as [`io::ErrorKind::WouldBlock`].
    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Associates `pts` (90 kHz ticks) with the next bytes written.
    fn checkin_pts(&self, pts: i64) -> Result<()>;

    /// Current fill of the input ring buffer.
    fn buffer_state(&self) -> Result<BufferState>;

    /// Blocks until the next control event (about one vsync). `Ok(false)`
    /// means the wait timed out.
    fn poll_control(&self) -> Result<bool>;

    /// Sets the A/V and sync thresholds.
    fn set_sync_thresholds(&self, _av_threshold: u32, _sync_threshold: u32) -> Result<()> {
        Ok(())
    }
}

/// Text key/value surfaces such as sysfs attributes. Keys are paths relative
/// to the surface root; see [`paths`].
pub trait ControlSurface: Send + Sync {
    /// Reads the raw value of `key`.
    fn read(&self, key: &str) -> Result<String>;

    /// Writes `value` to `key`.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Reads a decimal integer.
    fn get_int(&self, key: &str) -> Result<i64> {
        Ok(self.read(key)?.trim().parse()?)
    }

    /// Writes a decimal integer.
    fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.write(key, &value.to_string())
    }

    /// Writes a string.
    fn set_str(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, value)
    }
}

/// Control surface keys, relative to the sysfs class root.
pub mod paths {
    /// System A/V timestamp synchronization, 0 or 1.
    pub const TSYNC_ENABLE: &str = "tsync/enable";
    /// Decoder output clock, hex, read only.
    pub const PTS_VIDEO: &str = "tsync/pts_video";
    /// Decoder free-running clock register, hex.
    pub const PTS_PCRSCR: &str = "tsync/pts_pcrscr";
    /// Video layer disable, 0 or 1.
    pub const DISABLE_VIDEO: &str = "video/disable_video";
    /// Whether the last frame is blanked on reset.
    pub const BLACKOUT_POLICY: &str = "video/blackout_policy";
    /// Zoom percentage.
    pub const ZOOM: &str = "video/zoom";
    /// Contrast, -255..=255.
    pub const CONTRAST: &str = "video/contrast";
    /// Brightness, -127..=127.
    pub const BRIGHTNESS: &str = "video/brightness";
    /// Saturation, -127..=127.
    pub const SATURATION: &str = "video/saturation";
    /// Video window, `x1 y1 x2 y2` inclusive.
    pub const AXIS: &str = "video/axis";
}
