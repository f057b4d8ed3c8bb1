//! Length-prefixed NAL payloads to start-code delimited payloads.
//!
//! Containers like MP4/MKV store each NAL behind a big-endian length. The
//! decoder only understands start codes, so before submission the prefix
//! width is detected by walking the whole buffer and, when one width tiles
//! it exactly, the prefixes are replaced.

use log::debug;

use super::avcc::START_CODE;
use crate::error::Result;

/// Extra capacity reserved when the 2-byte case has to reallocate.
pub const REFRAME_HEADROOM: usize = 2048;

/// Width of the NAL length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// 32-bit lengths, rewritten in place with a 4-byte start code.
    Four,
    /// 24-bit lengths, rewritten in place with a 3-byte start code.
    Three,
    /// 16-bit lengths, copied out behind 4-byte start codes.
    Two,
}

impl LengthPrefix {
    /// Prefix width in bytes.
    pub fn width(self) -> usize {
        match self {
            LengthPrefix::Four => 4,
            LengthPrefix::Three => 3,
            LengthPrefix::Two => 2,
        }
    }

    fn read(self, p: &[u8]) -> usize {
        match self {
            LengthPrefix::Four => u32::from_be_bytes([p[0], p[1], p[2], p[3]]) as usize,
            LengthPrefix::Three => (p[0] as usize) << 16 | (p[1] as usize) << 8 | p[2] as usize,
            LengthPrefix::Two => (p[0] as usize) << 8 | p[1] as usize,
        }
    }

    /// True when successive prefixes of this width land exactly on the end
    /// of `data`.
    pub fn tiles(self, data: &[u8]) -> bool {
        let width = self.width();
        let mut pos = 0usize;
        while pos + width < data.len() {
            if self == LengthPrefix::Four && data[pos] != 0 {
                // no access unit carries a NAL of 16 MiB or more
                return false;
            }
            let size = self.read(&data[pos..]);
            let next = pos + width + size;
            if next == data.len() {
                return true;
            }
            pos = next;
        }
        false
    }
}

/// Finds the prefix width that tiles `data`, trying 4, then 3, then 2 bytes.
pub fn detect_length_prefix(data: &[u8]) -> Option<LengthPrefix> {
    [LengthPrefix::Four, LengthPrefix::Three, LengthPrefix::Two]
        .into_iter()
        .find(|prefix| prefix.tiles(data))
}

/// Rewrites a length-prefixed payload to start codes.
///
/// The 4- and 3-byte cases are rewritten in place. The 2-byte case grows the
/// payload, so a new buffer with [`REFRAME_HEADROOM`] spare bytes replaces
/// `data`. Payloads no width tiles are left untouched and `None` is returned.
pub fn reframe(data: &mut Vec<u8>) -> Result<Option<LengthPrefix>> {
    let Some(prefix) = detect_length_prefix(data) else {
        return Ok(None);
    };
    let width = prefix.width();

    match prefix {
        LengthPrefix::Four | LengthPrefix::Three => {
            let code = &START_CODE[START_CODE.len() - width..];
            let mut pos = 0;
            while pos + width < data.len() {
                let size = prefix.read(&data[pos..]);
                data[pos..pos + width].copy_from_slice(code);
                pos += width + size;
            }
        }
        LengthPrefix::Two => {
            let mut out = Vec::new();
            out.try_reserve_exact(data.len() + REFRAME_HEADROOM)?;
            let mut pos = 0;
            while pos + width < data.len() {
                let size = prefix.read(&data[pos..]);
                out.extend_from_slice(&START_CODE);
                out.extend_from_slice(&data[pos + width..pos + width + size]);
                pos += width + size;
            }
            *data = out;
        }
    }

    debug!("reframed {:?}-prefixed payload to {} bytes", prefix, data.len());
    Ok(Some(prefix))
}
