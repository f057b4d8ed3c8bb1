//! H.264: avcC to annex-B conversion, length-prefix reframing and SPS probing.

mod avcc;
pub mod reframe;
pub mod sps;

pub use avcc::{build_stream_header, AvcDecoderConfig, MAX_HEADER_SIZE, START_CODE};
pub use reframe::{detect_length_prefix, reframe, LengthPrefix, REFRAME_HEADROOM};
