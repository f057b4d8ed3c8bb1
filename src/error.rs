use std::collections::TryReserveError;
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

/// Errors produced by the decoder adapter.
///
/// "Would block" from the decoder is deliberately absent: it is an
/// [`std::io::ErrorKind::WouldBlock`] on the service write path and never
/// escapes the packet writer.
#[derive(Error, Debug)]
pub enum HwDecError {
    /// Control surface or OS level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The decoder service rejected the session parameters.
    #[error("decoder init failed: {0}")]
    Init(String),

    /// Codec or subtype combination the decoder path cannot represent.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// Header or reframe buffer allocation failed.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Non-recoverable write error from the decoder service.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The decoder service rejected a timestamp check-in.
    #[error("timestamp check-in rejected: {0}")]
    Timestamp(String),

    /// Malformed out-of-band codec parameters or bitstream.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Bit-level parse failure.
    #[error("parser error: {0}")]
    Parser(String),

    /// Malformed integer in a control surface or config value.
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    /// Malformed float in a config value.
    #[error("parse float error: {0}")]
    ParseFloat(#[from] ParseFloatError),

    /// The vendor decoder library could not be loaded or a symbol is missing.
    #[cfg(feature = "amcodec")]
    #[error("library error: {0}")]
    Library(#[from] libloading::Error),
}

impl From<TryReserveError> for HwDecError {
    fn from(err: TryReserveError) -> Self {
        HwDecError::OutOfMemory(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HwDecError>;
