use bytes::{BufMut, Bytes, BytesMut};
use log::debug;

use crate::av::HeaderBlob;
use crate::error::{HwDecError, Result};

/// Four-byte annex-B start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Largest stream header the decoder's header buffer takes. Headers must be
/// strictly shorter.
pub const MAX_HEADER_SIZE: usize = 1024;

const AVCC_MIN_LEN: usize = 10;

/// Parameter sets carried in an `avcC` decoder configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    /// AVC profile indication.
    pub profile: u8,
    /// AVC level indication.
    pub level: u8,
    /// NAL length prefix width used by the samples, 1..=4.
    pub length_size: u8,
    /// Sequence parameter sets, without prefixes.
    pub sps: Vec<Bytes>,
    /// Picture parameter sets, without prefixes.
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfig {
    /// Parses an `avcC` record.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < AVCC_MIN_LEN {
            return Err(HwDecError::InvalidData(format!(
                "avcC too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != 1 {
            return Err(HwDecError::InvalidData(format!(
                "unknown avcC version {}",
                data[0]
            )));
        }

        let mut pos = 5;
        let sps_count = (data[pos] & 0x1f) as usize;
        pos += 1;
        let sps = read_parameter_sets(data, &mut pos, sps_count)?;

        let pps_count = *data
            .get(pos)
            .ok_or_else(|| HwDecError::InvalidData("avcC truncated before pps count".into()))?
            as usize;
        pos += 1;
        let pps = read_parameter_sets(data, &mut pos, pps_count)?;

        Ok(Self {
            profile: data[1],
            level: data[3],
            length_size: (data[4] & 0x03) + 1,
            sps,
            pps,
        })
    }

    /// Size of the annex-B rendition: a start code per parameter set plus the sets.
    pub fn annexb_len(&self) -> usize {
        self.sps
            .iter()
            .chain(self.pps.iter())
            .map(|nal| START_CODE.len() + nal.len())
            .sum()
    }

    /// Writes every SPS then every PPS behind a 4-byte start code.
    pub fn to_annexb(&self) -> Result<Bytes> {
        let len = self.annexb_len();
        if len >= MAX_HEADER_SIZE {
            return Err(HwDecError::Unsupported(format!(
                "stream header of {} bytes exceeds {}",
                len, MAX_HEADER_SIZE
            )));
        }
        let mut out = BytesMut::with_capacity(len);
        for nal in self.sps.iter().chain(self.pps.iter()) {
            out.put_slice(&START_CODE);
            out.put_slice(nal);
        }
        Ok(out.freeze())
    }
}

fn read_parameter_sets(data: &[u8], pos: &mut usize, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for i in 0..count {
        let len_bytes = data
            .get(*pos..*pos + 2)
            .ok_or_else(|| HwDecError::InvalidData(format!("avcC truncated at set {}", i)))?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        *pos += 2;
        let nal = data
            .get(*pos..*pos + len)
            .ok_or_else(|| HwDecError::InvalidData(format!("avcC set {} overruns record", i)))?;
        sets.push(Bytes::copy_from_slice(nal));
        *pos += len;
    }
    Ok(sets)
}

/// Builds the one-time stream header from H.264 extradata.
///
/// Extradata that already starts with a start code is passed through;
/// anything else must be a version 1 `avcC` record.
pub fn build_stream_header(extradata: &[u8]) -> Result<HeaderBlob> {
    if extradata.starts_with(&START_CODE) {
        if extradata.len() >= MAX_HEADER_SIZE {
            return Err(HwDecError::Unsupported(format!(
                "annex-b extradata of {} bytes exceeds {}",
                extradata.len(),
                MAX_HEADER_SIZE
            )));
        }
        debug!("h264 extradata already annex-b, {} bytes", extradata.len());
        return Ok(HeaderBlob::new(Bytes::copy_from_slice(extradata)));
    }

    let config = AvcDecoderConfig::parse(extradata)?;
    debug!(
        "avcC profile {} level {}: {} sps, {} pps",
        config.profile,
        config.level,
        config.sps.len(),
        config.pps.len()
    );
    Ok(HeaderBlob::new(config.to_annexb()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    fn avcc(sps: &[Vec<u8>], pps: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![0x01, 0x64, 0x00, 0x28, 0xff, 0xe0 | sps.len() as u8];
        for nal in sps {
            out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            out.extend_from_slice(nal);
        }
        out.push(pps.len() as u8);
        for nal in pps {
            out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            out.extend_from_slice(nal);
        }
        out
    }

    #[test]
    fn one_sps_one_pps() {
        let record = avcc(&[vec![0x67, 1, 2, 3, 4]], &[vec![0x68, 5, 6]]);
        let header = build_stream_header(&record).unwrap();
        assert_eq!(header.len(), 16);
        assert_eq!(
            header.as_bytes(),
            &[0, 0, 0, 1, 0x67, 1, 2, 3, 4, 0, 0, 0, 1, 0x68, 5, 6]
        );
    }

    #[test]
    fn annexb_extradata_passes_through() {
        let extradata = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68, 0xce];
        let header = build_stream_header(&extradata).unwrap();
        assert_eq!(header.as_bytes(), &extradata);

        let oversized = [&START_CODE[..], &[0u8; MAX_HEADER_SIZE][..]].concat();
        assert!(matches!(
            build_stream_header(&oversized),
            Err(HwDecError::Unsupported(_))
        ));
    }

    #[test]
    fn rejects_bad_records() {
        let mut record = avcc(&[vec![0x67, 1, 2, 3, 4]], &[vec![0x68, 5, 6]]);
        record[0] = 2;
        assert!(matches!(
            build_stream_header(&record),
            Err(HwDecError::InvalidData(_))
        ));
        assert!(build_stream_header(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).is_err());

        // declared sps longer than the record
        let truncated = [0x01, 0x64, 0x00, 0x28, 0xff, 0xe1, 0x00, 0x20, 0x67, 0x64];
        assert!(matches!(
            build_stream_header(&truncated),
            Err(HwDecError::InvalidData(_))
        ));
    }

    #[test]
    fn oversized_parameter_sets_are_unsupported() {
        let record = avcc(&[vec![0x67; 600]], &[vec![0x68; 600]]);
        assert!(matches!(
            build_stream_header(&record),
            Err(HwDecError::Unsupported(_))
        ));
    }

    #[quickcheck]
    fn header_length_law(sps: Vec<Vec<u8>>, pps: Vec<Vec<u8>>) -> TestResult {
        let sps: Vec<Vec<u8>> = sps.into_iter().take(31).map(|mut n| { n.truncate(64); n }).collect();
        let pps: Vec<Vec<u8>> = pps.into_iter().take(31).map(|mut n| { n.truncate(64); n }).collect();
        let expected = 4 * (sps.len() + pps.len())
            + sps.iter().map(Vec::len).sum::<usize>()
            + pps.iter().map(Vec::len).sum::<usize>();
        if expected >= MAX_HEADER_SIZE {
            return TestResult::discard();
        }
        let record = avcc(&sps, &pps);
        if record.len() < AVCC_MIN_LEN {
            return TestResult::from_bool(build_stream_header(&record).is_err());
        }
        match build_stream_header(&record) {
            Ok(header) => TestResult::from_bool(header.len() == expected),
            Err(_) => TestResult::failed(),
        }
    }
}
