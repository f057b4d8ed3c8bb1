//! MPEG-1/2 video arriving in a program stream: the sequence header from
//! extradata is wrapped in a video PES with placeholder PTS/DTS and padded
//! with stuffing so the parser syncs before the first real packet.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{HwDecError, Result};

/// PES wrapper placed in front of the sequence header.
pub const PES_WRAPPER_LEN: usize = 25;

/// `0xff` bytes appended after the sequence header.
pub const STUFFING_LEN: usize = 256;

/// Builds the PES-wrapped sequence header.
pub fn pes_sequence_header(extradata: &[u8]) -> Result<Bytes> {
    let pes_len = u16::try_from(extradata.len() + PES_WRAPPER_LEN).map_err(|_| {
        HwDecError::InvalidData(format!(
            "mpeg sequence header of {} bytes does not fit a PES",
            extradata.len()
        ))
    })?;

    let mut out = BytesMut::with_capacity(PES_WRAPPER_LEN + extradata.len() + STUFFING_LEN);
    out.put_slice(&[0x00, 0x00, 0x01, 0xe0]); // video stream 0
    out.put_u16(pes_len);
    out.put_slice(&[0x81, 0xc0, 0x0d]); // PTS and DTS present, 13 header bytes
    out.put_slice(&[0x20, 0x00, 0x00, 0x00, 0x00]); // PTS
    out.put_slice(&[0x1f, 0xff, 0xff, 0xff, 0xff]); // DTS
    out.put_bytes(0xff, 6);
    out.put_slice(extradata);
    out.put_bytes(0xff, STUFFING_LEN);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wrapper_layout() {
        let seq = [0x00, 0x00, 0x01, 0xb3, 0x2d, 0x02, 0x40, 0x33];
        let header = pes_sequence_header(&seq).unwrap();
        assert_eq!(header.len(), PES_WRAPPER_LEN + seq.len() + STUFFING_LEN);
        assert_eq!(&header[..6], &[0x00, 0x00, 0x01, 0xe0, 0x00, 33]);
        assert_eq!(&header[6..9], &[0x81, 0xc0, 0x0d]);
        assert_eq!(&header[PES_WRAPPER_LEN..PES_WRAPPER_LEN + seq.len()], &seq);
        assert!(header[PES_WRAPPER_LEN + seq.len()..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn oversized_sequence_header() {
        assert!(pes_sequence_header(&vec![0u8; 70_000]).is_err());
    }
}
