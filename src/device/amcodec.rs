//! Dynamic binding to the vendor decoder library.
//!
//! The library is opened at runtime and its `codec_*` entry points resolved
//! into plain function pointers; nothing links against it at build time.

use std::cell::UnsafeCell;
use std::ffi::{c_int, c_uint, c_ulong, c_void};
use std::io;
use std::path::Path;

use log::{debug, error, info};
use parking_lot::Mutex;

use super::{BufferState, DecoderService, InitParams};
use crate::error::{HwDecError, Result};

/// Default library name, resolved through the dynamic loader search path.
pub const LIBRARY_NAME: &str = "libamplayer.so";

const AUDIO_EXTRA_DATA_SIZE: usize = 4096;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct DecSysinfo {
    format: c_uint,
    width: c_uint,
    height: c_uint,
    rate: c_uint,
    extra: c_uint,
    status: c_uint,
    ratio: c_uint,
    param: *mut c_void,
    ratio64: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct AudioInfo {
    valid: c_int,
    sample_rate: c_int,
    channels: c_int,
    bitrate: c_int,
    codec_id: c_int,
    block_align: c_int,
    extradata_size: c_int,
    extradata: [u8; AUDIO_EXTRA_DATA_SIZE],
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct CodecPara {
    handle: c_int,
    cntl_handle: c_int,
    sub_handle: c_int,
    stream_type: c_int,
    // has_video:1 has_audio:1 has_sub:1 noblock:1
    flags: c_uint,
    video_type: c_int,
    audio_type: c_int,
    sub_type: c_int,
    video_pid: c_int,
    audio_pid: c_int,
    sub_pid: c_int,
    audio_channels: c_int,
    audio_samplerate: c_int,
    vbuf_size: c_int,
    abuf_size: c_int,
    am_sysinfo: DecSysinfo,
    audio_info: AudioInfo,
    packet_size: c_int,
    avsync_threshold: c_int,
    adec_priv: *mut c_void,
    _reserved: [u8; 64],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct BufStatus {
    size: c_int,
    data_len: c_int,
    free_len: c_int,
    read_pointer: c_uint,
    write_pointer: c_uint,
}

const HAS_VIDEO: c_uint = 1;

type CodecFn = unsafe extern "C" fn(*mut CodecPara) -> c_int;
type CodecWriteFn = unsafe extern "C" fn(*mut CodecPara, *mut c_void, c_int) -> c_int;
type CodecCheckinPtsFn = unsafe extern "C" fn(*mut CodecPara, c_ulong) -> c_int;
type CodecVbufStateFn = unsafe extern "C" fn(*mut CodecPara, *mut BufStatus) -> c_int;
type CodecThresholdFn = unsafe extern "C" fn(*mut CodecPara, c_uint) -> c_int;

struct Symbols {
    init: CodecFn,
    close: CodecFn,
    reset: CodecFn,
    pause: CodecFn,
    resume: CodecFn,
    write: CodecWriteFn,
    checkin_pts: CodecCheckinPtsFn,
    get_vbuf_state: CodecVbufStateFn,
    poll_cntl: CodecFn,
    set_avthresh: CodecThresholdFn,
    set_syncthresh: CodecThresholdFn,
}

/// Session parameters plus the pointee of `am_sysinfo.param` for RealVideo.
struct Session {
    para: UnsafeCell<CodecPara>,
    real_sizes: UnsafeCell<[u16; 9]>,
}

/// [`DecoderService`] backed by the vendor's `libamplayer.so`.
///
/// The library synchronizes calls on one codec handle itself; `init` and
/// `close` are additionally serialized here since they rewrite the
/// parameter block the other calls read.
pub struct AmCodecService {
    symbols: Symbols,
    session: Box<Session>,
    lifecycle: Mutex<()>,
    _lib: libloading::Library,
}

// The parameter block is only rewritten under `lifecycle`, with the poller
// and writer stopped by the session controller.
unsafe impl Send for AmCodecService {}
unsafe impl Sync for AmCodecService {}

impl AmCodecService {
    /// Loads [`LIBRARY_NAME`] from the default search path.
    pub fn load() -> Result<Self> {
        Self::load_from(LIBRARY_NAME)
    }

    /// Loads the decoder library from `path` and resolves its entry points.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let lib = unsafe { libloading::Library::new(path) }?;
        let symbols = unsafe {
            Symbols {
                init: *lib.get::<CodecFn>(b"codec_init\0")?,
                close: *lib.get::<CodecFn>(b"codec_close\0")?,
                reset: *lib.get::<CodecFn>(b"codec_reset\0")?,
                pause: *lib.get::<CodecFn>(b"codec_pause\0")?,
                resume: *lib.get::<CodecFn>(b"codec_resume\0")?,
                write: *lib.get::<CodecWriteFn>(b"codec_write\0")?,
                checkin_pts: *lib.get::<CodecCheckinPtsFn>(b"codec_checkin_pts\0")?,
                get_vbuf_state: *lib.get::<CodecVbufStateFn>(b"codec_get_vbuf_state\0")?,
                poll_cntl: *lib.get::<CodecFn>(b"codec_poll_cntl\0")?,
                set_avthresh: *lib.get::<CodecThresholdFn>(b"codec_set_cntl_avthresh\0")?,
                set_syncthresh: *lib.get::<CodecThresholdFn>(b"codec_set_cntl_syncthresh\0")?,
            }
        };
        info!("loaded decoder library {}", path.display());

        // SAFETY: CodecPara is plain data; all-zero is its documented reset state.
        let para = unsafe { std::mem::zeroed::<CodecPara>() };
        Ok(Self {
            symbols,
            session: Box::new(Session {
                para: UnsafeCell::new(para),
                real_sizes: UnsafeCell::new([0; 9]),
            }),
            lifecycle: Mutex::new(()),
            _lib: lib,
        })
    }

    fn para(&self) -> *mut CodecPara {
        self.session.para.get()
    }

    fn call(&self, name: &str, f: CodecFn) -> Result<()> {
        let ret = unsafe { f(self.para()) };
        if ret != 0 {
            error!("{} failed: {}", name, ret);
            return Err(service_error(name, ret));
        }
        Ok(())
    }
}

fn service_error(name: &str, ret: c_int) -> HwDecError {
    HwDecError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("{} returned {}", name, ret),
    ))
}

impl DecoderService for AmCodecService {
    fn init(&self, params: &InitParams) -> Result<()> {
        let _guard = self.lifecycle.lock();
        unsafe {
            let para = &mut *self.para();
            *para = std::mem::zeroed();
            para.flags = HAS_VIDEO;
            para.video_pid = params.video_pid;
            para.video_type = params.video_type as c_int;
            para.stream_type = params.stream_type.routing_code();
            para.am_sysinfo.format = params.format as c_uint;
            para.am_sysinfo.width = params.width;
            para.am_sysinfo.height = params.height;
            para.am_sysinfo.rate = params.rate;
            para.am_sysinfo.ratio = params.ratio;
            para.am_sysinfo.ratio64 = params.ratio64;
            para.am_sysinfo.extra = params.extra;
            para.am_sysinfo.param = match params.real_sizes {
                Some(table) => {
                    // the table pointer replaces the flag word; rotation rides on top
                    *self.session.real_sizes.get() = table;
                    let base = self.session.real_sizes.get() as usize;
                    (base | params.param as usize) as *mut c_void
                }
                None => params.param as usize as *mut c_void,
            };
        }

        let ret = unsafe { (self.symbols.init)(self.para()) };
        if ret != 0 {
            error!("codec_init failed: {:#x}", -ret);
            return Err(HwDecError::Init(format!("codec_init returned {:#x}", -ret)));
        }
        debug!("codec_init ok, pid {}", params.video_pid);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock();
        self.call("codec_close", self.symbols.close)
    }

    fn reset(&self) -> Result<()> {
        self.call("codec_reset", self.symbols.reset)
    }

    fn pause(&self) -> Result<()> {
        self.call("codec_pause", self.symbols.pause)
    }

    fn resume(&self) -> Result<()> {
        self.call("codec_resume", self.symbols.resume)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let len = c_int::try_from(data.len()).unwrap_or(c_int::MAX);
        let ret = unsafe { (self.symbols.write)(self.para(), data.as_ptr() as *mut c_void, len) };
        if ret < 0 || ret > len {
            // EAGAIN surfaces as ErrorKind::WouldBlock
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }

    fn checkin_pts(&self, pts: i64) -> Result<()> {
        let ret = unsafe { (self.symbols.checkin_pts)(self.para(), pts as c_ulong) };
        if ret != 0 {
            return Err(HwDecError::Timestamp(format!("codec_checkin_pts returned {}", ret)));
        }
        Ok(())
    }

    fn buffer_state(&self) -> Result<BufferState> {
        let mut status = BufStatus::default();
        let ret = unsafe { (self.symbols.get_vbuf_state)(self.para(), &mut status) };
        if ret < 0 {
            return Err(service_error("codec_get_vbuf_state", ret));
        }
        Ok(BufferState {
            capacity: status.size.max(0) as usize,
            data_len: status.data_len.max(0) as usize,
        })
    }

    fn poll_control(&self) -> Result<bool> {
        let ret = unsafe { (self.symbols.poll_cntl)(self.para()) };
        Ok(ret > 0)
    }

    fn set_sync_thresholds(&self, av_threshold: u32, sync_threshold: u32) -> Result<()> {
        let para = self.para();
        let ret = unsafe { (self.symbols.set_avthresh)(para, av_threshold) };
        if ret != 0 {
            return Err(service_error("codec_set_cntl_avthresh", ret));
        }
        let ret = unsafe { (self.symbols.set_syncthresh)(para, sync_threshold) };
        if ret != 0 {
            return Err(service_error("codec_set_cntl_syncthresh", ret));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AmCodecService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmCodecService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_library_error() {
        let err = AmCodecService::load_from("/nonexistent/libamplayer.so").unwrap_err();
        assert!(matches!(err, HwDecError::Library(_)));
    }
}
