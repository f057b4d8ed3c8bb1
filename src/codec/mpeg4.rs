//! MPEG-4 part 2 family framing.
//!
//! DivX 3.11 streams carry no in-band sequence header: the decoder is primed
//! with a 10-byte marker holding the picture size and every chunk gets a
//! VOP start code plus version string and length.

use bytes::{BufMut, Bytes, BytesMut};

use crate::av::tags;

/// Length of the per-chunk prefix: start code, `DIVX3.11`, 32-bit length.
pub const DIVX3_CHUNK_PREFIX_LEN: usize = 17;

const DIVX3_CHUNK_MAGIC: [u8; 13] = [
    0x00, 0x00, 0x00, 0x01, 0xb6, b'D', b'I', b'V', b'X', b'3', b'.', b'1', b'1',
];

/// Sequence marker priming the decoder with the picture size: 12 bits of
/// width and 12 bits of height after a `00 00 00 01 20` start.
pub fn divx3_sequence_marker(width: u32, height: u32) -> [u8; 10] {
    let packed = (width << 12) | (height & 0xfff);
    [
        0x00,
        0x00,
        0x00,
        0x01,
        0x20,
        (packed >> 16) as u8,
        (packed >> 8) as u8,
        packed as u8,
        0x00,
        0x00,
    ]
}

/// Prefix written before every DivX 3.11 chunk of `payload_len` bytes.
pub fn divx3_chunk_prefix(payload_len: usize) -> Bytes {
    let mut out = BytesMut::with_capacity(DIVX3_CHUNK_PREFIX_LEN);
    out.put_slice(&DIVX3_CHUNK_MAGIC);
    out.put_u32(payload_len as u32);
    out.freeze()
}

/// Tags whose extradata is a complete VOL header the decoder needs up front.
pub fn carries_config_header(tag: u32) -> bool {
    matches!(
        tag,
        tags::M4S2 | tags::DX50 | tags::MP4V_LOWER | tags::FMP4
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequence_marker_packs_size() {
        assert_eq!(
            divx3_sequence_marker(640, 480),
            [0, 0, 0, 1, 0x20, 0x28, 0x01, 0xe0, 0, 0]
        );
    }

    #[test]
    fn chunk_prefix() {
        let prefix = divx3_chunk_prefix(0x0001_0203);
        assert_eq!(prefix.len(), DIVX3_CHUNK_PREFIX_LEN);
        assert_eq!(&prefix[..5], &[0, 0, 0, 1, 0xb6]);
        assert_eq!(&prefix[5..13], b"DIVX3.11");
        assert_eq!(&prefix[13..], &[0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn config_header_tags() {
        assert!(carries_config_header(tags::DX50));
        assert!(carries_config_header(tags::MP4V_LOWER));
        assert!(!carries_config_header(tags::MP4V));
        assert!(!carries_config_header(tags::XVID));
    }
}
