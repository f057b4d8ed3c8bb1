//! # Utility Functions and Types
//!
//! Bit-level reading for the parameter-set probes:
//!
//! ```rust
//! use hwvdec::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b1011_0011u8];
//! let mut reader = BitReader::new(&data);
//!
//! assert_eq!(reader.read_bits(3)?, 0b101);
//! assert!(reader.read_flag()?);
//! # Ok(())
//! # }
//! ```

/// Bitstream reading utilities
pub mod bits;

pub use bits::*;
