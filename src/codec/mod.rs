//! Per-codec bitstream framing.
//!
//! Each family module knows the exact byte layout its decoder firmware
//! expects; [`header::HeaderSynthesizer`] picks the right one for a stream.

pub mod h264;
pub mod header;
pub mod mpeg12;
pub mod mpeg4;
pub mod vc1;

pub use header::{FramingFamily, HeaderSynthesizer};
