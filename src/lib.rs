#![doc(html_root_url = "https://docs.rs/hwvdec/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # hwvdec - hardware video decoder adapter
//!
//! `hwvdec` sits between a media player's demuxer and a fixed-function
//! video decoder. It never touches pixels: it reshapes compressed packets
//! into the exact byte layout the decoder firmware expects, pushes them
//! through the decoder's non-blocking write interface, and reports picture
//! timing back to the player's clock.
//!
//! ## Features
//!
//! ### Bitstream framing
//! - H.264 avcC to annex-B stream headers, length-prefix to start-code reframing
//! - DivX 3.11 sequence markers and chunk prefixes
//! - VC-1 (WMV3 sequence/frame wrappers, WVC1 start codes)
//! - MPEG-1/2 program stream PES wrappers
//!
//! ### Decoder plumbing
//! - Backpressure-aware writer that forces a reset after a bounded stall
//! - Timestamp check-in and buffered-duration estimates
//! - Background poller that follows and corrects the decoder's output clock
//! - Video layer controls (window, zoom, contrast, brightness, saturation)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hwvdec::av::{CodecId, StreamHints};
//! use hwvdec::device::{MockDecoderService, SysfsControl};
//! use hwvdec::session::{DecoderSession, NullClock};
//!
//! fn main() -> hwvdec::Result<()> {
//!     let service = Arc::new(MockDecoderService::new());
//!     let control = Arc::new(SysfsControl::new("/sys/class"));
//!     let mut session = DecoderSession::new(service, control, Arc::new(NullClock));
//!
//!     let avcc: Vec<u8> = std::fs::read("stream.avcc")?;
//!     session.open(
//!         &StreamHints::new(CodecId::H264)
//!             .with_dimensions(1920, 1080)
//!             .with_frame_rate(25, 1)
//!             .with_extradata(avcc),
//!     )?;
//!
//!     let frame: Vec<u8> = std::fs::read("frame.bin")?;
//!     let status = session.decode(Some(&frame[..]), None, Some(0.0));
//!     if status.has_picture() {
//!         println!("picture at {}", session.picture().pts);
//!     }
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! With the `amcodec` feature, `device::amcodec::AmCodecService` binds the
//! vendor library at runtime in place of the mock.
//!
//! ## Module Overview
//!
//! - `av`: codec ids, four-character codes, access units, stream descriptors
//! - `codec`: per-family header synthesis and reframing
//! - `device`: decoder service and control surface capabilities
//! - `session`: the decoder session, writer, timestamps, poller, display
//! - `config`: process-wide tunables
//! - `error`: error taxonomy and `Result` alias
//! - `utils`: bit-level reading

/// Stream vocabulary: codecs, access units, descriptors
pub mod av;

/// Per-codec bitstream framing
pub mod codec;

/// Configuration module
pub mod config;

/// Decoder service and control surfaces
pub mod device;

/// Error types and utilities
pub mod error;

/// Decoder session controller
pub mod session;

/// Common utilities and helper functions
pub mod utils;

pub use error::{HwDecError, Result};
pub use session::{DecodeStatus, DecoderSession};
