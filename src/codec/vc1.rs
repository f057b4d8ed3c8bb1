//! VC-1 framing.
//!
//! Simple/main profile (WMV3) has no start codes of its own, so the decoder
//! takes a PES-like marker per frame and a sequence wrapper around the
//! extradata. Each marker repeats its length and a 16-bit checksum, with
//! `0x88` separators.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{HwDecError, Result};

/// Marker written before every WMV3 frame.
pub const WMV3_FRAME_MARKER_LEN: usize = 22;

/// Fixed part of the WMV3 sequence wrapper, before the extradata.
pub const WMV3_SEQUENCE_PREFIX_LEN: usize = 26;

/// Prefix written before every advanced-profile frame.
pub const WVC1_FRAME_PREFIX: [u8; 4] = [0x00, 0x00, 0x01, 0x0d];

const SEQUENCE_CODE: u8 = 0x10;
const FRAME_CODE: u8 = 0x0d;

fn put_marker(out: &mut BytesMut, code: u8, len: u32) {
    let start = out.len();
    out.put_slice(&[0x00, 0x00, 0x01, code]);
    out.put_slice(&[0x00, (len >> 16) as u8, 0x88, (len >> 8) as u8, len as u8, 0x88]);
    out.put_slice(&[0xff, 0xff, 0x88, 0xff, 0xff, 0x88]);

    let checksum: u32 = out[start + 4..start + 16].iter().map(|&b| b as u32).sum();
    let (hi, lo) = ((checksum >> 8) as u8, checksum as u8);
    out.put_slice(&[hi, lo, 0x88, hi, lo, 0x88]);
}

/// Sequence wrapper: a sequence marker, picture size and the raw extradata.
pub fn wmv3_sequence_header(width: u32, height: u32, extradata: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(WMV3_SEQUENCE_PREFIX_LEN + extradata.len());
    put_marker(&mut out, SEQUENCE_CODE, extradata.len() as u32 + 4);
    out.put_u16(width as u16);
    out.put_u16(height as u16);
    out.put_slice(extradata);
    out.freeze()
}

/// Per-frame header for a WMV3 frame of `payload_len` bytes, preceded by
/// the sequence wrapper when `sequence` is given.
pub fn wmv3_frame_header(sequence: Option<&[u8]>, payload_len: usize) -> Bytes {
    let sequence = sequence.unwrap_or_default();
    let mut out = BytesMut::with_capacity(sequence.len() + WMV3_FRAME_MARKER_LEN);
    out.put_slice(sequence);
    put_marker(&mut out, FRAME_CODE, payload_len as u32);
    out.freeze()
}

/// Advanced-profile stream header: the extradata without its leading
/// length byte.
pub fn wvc1_sequence_header(extradata: &[u8]) -> Result<Bytes> {
    if extradata.len() < 2 {
        return Err(HwDecError::InvalidData(format!(
            "vc-1 extradata too short: {} bytes",
            extradata.len()
        )));
    }
    Ok(Bytes::copy_from_slice(&extradata[1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequence_header_layout() {
        let header = wmv3_sequence_header(320, 240, &[0x4e, 0x29, 0x1a, 0x01]);
        assert_eq!(header.len(), WMV3_SEQUENCE_PREFIX_LEN + 4);
        assert_eq!(
            &header[..],
            &[
                0x00, 0x00, 0x01, 0x10, // sequence marker
                0x00, 0x00, 0x88, 0x00, 0x08, 0x88, // length 8
                0xff, 0xff, 0x88, 0xff, 0xff, 0x88, //
                0x06, 0x24, 0x88, 0x06, 0x24, 0x88, // checksum 0x0624
                0x01, 0x40, 0x00, 0xf0, // 320x240
                0x4e, 0x29, 0x1a, 0x01,
            ][..]
        );
    }

    #[test]
    fn frame_marker_checksum() {
        let header = wmv3_frame_header(None, 0x01_2345);
        assert_eq!(header.len(), WMV3_FRAME_MARKER_LEN);
        assert_eq!(&header[..4], &[0x00, 0x00, 0x01, 0x0d]);
        assert_eq!(&header[4..10], &[0x00, 0x01, 0x88, 0x23, 0x45, 0x88]);
        // 0x01 + 0x88 + 0x23 + 0x45 + 0x88 + 4 * 0xff + 2 * 0x88
        let sum: u32 = 0x01 + 0x88 + 0x23 + 0x45 + 0x88 + 4 * 0xff + 2 * 0x88;
        assert_eq!(&header[16..18], &[(sum >> 8) as u8, sum as u8]);
        assert_eq!(&header[19..21], &[(sum >> 8) as u8, sum as u8]);
    }

    #[test]
    fn keyframe_header_carries_sequence() {
        let sequence = wmv3_sequence_header(176, 144, &[1, 2, 3, 4]);
        let header = wmv3_frame_header(Some(&sequence), 100);
        assert_eq!(header.len(), 30 + WMV3_FRAME_MARKER_LEN);
        assert_eq!(&header[..30], &sequence[..]);
        assert_eq!(&header[30..34], &[0x00, 0x00, 0x01, 0x0d]);
    }

    #[test]
    fn wvc1_drops_first_byte() {
        assert_eq!(
            &wvc1_sequence_header(&[0x0f, 0, 0, 1, 0x0f, 0xdb]).unwrap()[..],
            &[0, 0, 1, 0x0f, 0xdb]
        );
        assert!(wvc1_sequence_header(&[0x0f]).is_err());
    }
}
