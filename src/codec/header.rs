//! Framing dispatch: which stream header a decoder is primed with and what
//! each frame is prefixed with, per codec family.

use bytes::Bytes;
use log::debug;

use super::{h264, mpeg12, mpeg4, vc1};
use crate::av::{
    tags, AccessUnit, DecoderFormat, DecoderSubtype, HeaderBlob, StreamDescriptor, StreamKind,
};
use crate::error::{HwDecError, Result};

/// How a stream is framed on its way into the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingFamily {
    /// H.264: avcC header up front, payloads reframed to start codes.
    AnnexB,
    /// DivX 3.11: size marker up front, prefix on every chunk.
    Divx3,
    /// MPEG-4 part 2 whose extradata is fed verbatim up front.
    Mpeg4Config,
    /// Sorenson/H.263 inside the MPEG-4 family; no hardware path.
    H263,
    /// VC-1 simple/main: sequence and frame markers per frame.
    Wmv3,
    /// VC-1 advanced: extradata up front, start code on every frame.
    Wvc1,
    /// MPEG-1/2 in a program stream: PES-wrapped sequence header up front.
    Mpeg12Program,
    /// Payloads are written as they come.
    Passthrough,
}

impl FramingFamily {
    /// Picks the framing for a stream.
    pub fn of(desc: &StreamDescriptor) -> Self {
        match desc.kind {
            StreamKind::Elementary => {}
            StreamKind::Program if desc.codec.is_mpeg12() => return FramingFamily::Mpeg12Program,
            _ => return FramingFamily::Passthrough,
        }

        if desc.format == DecoderFormat::H264 {
            FramingFamily::AnnexB
        } else if desc.format == DecoderFormat::Mpeg4 && desc.subtype == DecoderSubtype::Mpeg4V3 {
            FramingFamily::Divx3
        } else if desc.format == DecoderFormat::Mpeg4 && desc.subtype == DecoderSubtype::H263 {
            FramingFamily::H263
        } else if mpeg4::carries_config_header(desc.codec_tag) {
            FramingFamily::Mpeg4Config
        } else if desc.format == DecoderFormat::Vc1 && desc.subtype == DecoderSubtype::Wmv3 {
            FramingFamily::Wmv3
        } else if desc.codec_tag == tags::WMV3 {
            // tagged WMV3 outside the VC-1 format still gets the wrapper once
            FramingFamily::Wmv3
        } else if matches!(desc.codec_tag, tags::WVC1 | tags::VC_1 | tags::WMVA) {
            // untagged advanced profile gets frame prefixes but no stream header
            FramingFamily::Wvc1
        } else {
            FramingFamily::Passthrough
        }
    }
}

/// Builds stream headers and per-frame prefixes for one open stream.
#[derive(Debug)]
pub struct HeaderSynthesizer {
    family: FramingFamily,
    format: DecoderFormat,
    subtype: DecoderSubtype,
    width: u32,
    height: u32,
    extradata: Bytes,
    wmv3_sequence: Option<Bytes>,
    sequence_pending: bool,
}

impl HeaderSynthesizer {
    /// Prepares framing for `desc`.
    pub fn new(desc: &StreamDescriptor) -> Self {
        let family = FramingFamily::of(desc);
        debug!("framing family {:?}", family);
        Self {
            family,
            format: desc.format,
            subtype: desc.subtype,
            width: desc.width,
            height: desc.height,
            extradata: desc.extradata.clone(),
            wmv3_sequence: None,
            sequence_pending: true,
        }
    }

    /// The framing in use.
    pub fn family(&self) -> FramingFamily {
        self.family
    }

    /// The header fed once after open and after every reset, if the family
    /// has one.
    pub fn stream_header(&self) -> Result<Option<HeaderBlob>> {
        let header = match self.family {
            FramingFamily::AnnexB => Some(h264::build_stream_header(&self.extradata)?),
            FramingFamily::Divx3 => Some(HeaderBlob::new(Bytes::copy_from_slice(
                &mpeg4::divx3_sequence_marker(self.width, self.height),
            ))),
            FramingFamily::Mpeg4Config if !self.extradata.is_empty() => {
                Some(HeaderBlob::new(self.extradata.clone()))
            }
            FramingFamily::Wmv3 => Some(HeaderBlob::new(vc1::wmv3_sequence_header(
                self.width,
                self.height,
                &self.extradata,
            ))),
            FramingFamily::Wvc1 => Some(HeaderBlob::new(vc1::wvc1_sequence_header(
                &self.extradata,
            )?)),
            FramingFamily::Mpeg12Program => Some(HeaderBlob::new(mpeg12::pes_sequence_header(
                &self.extradata,
            )?)),
            _ => None,
        };
        if let Some(header) = &header {
            debug!("{:?} stream header, {} bytes", self.family, header.len());
        }
        Ok(header)
    }

    /// Rewrites the unit's payload and attaches its per-frame header.
    ///
    /// Errors leave the payload unusable for this stream: `Unsupported` for
    /// H.263 (the payload itself is intact), `OutOfMemory` when reframing
    /// could not allocate.
    pub fn prepare(&mut self, unit: &mut AccessUnit) -> Result<()> {
        match (self.format, self.subtype) {
            (DecoderFormat::H264, _) => {
                h264::reframe(unit.payload_mut())?;
            }
            (DecoderFormat::Mpeg4, DecoderSubtype::Mpeg4V3) => {
                let prefix = mpeg4::divx3_chunk_prefix(unit.payload().len());
                unit.attach_header(HeaderBlob::new(prefix));
            }
            (DecoderFormat::Mpeg4, DecoderSubtype::H263) => {
                return Err(HwDecError::Unsupported(
                    "h263 bitstreams have no hardware path".into(),
                ));
            }
            (DecoderFormat::Vc1, DecoderSubtype::Wmv3) => {
                let sequence = if unit.is_keyframe() || self.sequence_pending {
                    self.sequence_pending = false;
                    Some(self.wmv3_sequence())
                } else {
                    None
                };
                let header = vc1::wmv3_frame_header(sequence.as_deref(), unit.payload().len());
                unit.attach_header(HeaderBlob::new(header));
            }
            (DecoderFormat::Vc1, DecoderSubtype::Wvc1) => {
                unit.attach_header(HeaderBlob::new(Bytes::from_static(
                    &vc1::WVC1_FRAME_PREFIX,
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Forgets per-stream progress so the next WMV3 frame carries the
    /// sequence wrapper again.
    pub fn rewind(&mut self) {
        self.sequence_pending = true;
    }

    fn wmv3_sequence(&mut self) -> Bytes {
        let (width, height, extradata) = (self.width, self.height, &self.extradata);
        self.wmv3_sequence
            .get_or_insert_with(|| vc1::wmv3_sequence_header(width, height, extradata))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{CodecId, StreamHints};
    use pretty_assertions::assert_eq;

    fn synth(hints: StreamHints) -> HeaderSynthesizer {
        HeaderSynthesizer::new(&StreamDescriptor::from_hints(&hints))
    }

    #[test]
    fn family_dispatch() {
        let family = |hints| synth(hints).family();
        assert_eq!(family(StreamHints::new(CodecId::H264)), FramingFamily::AnnexB);
        assert_eq!(
            family(StreamHints::new(CodecId::MsMpeg4V3).with_tag(tags::DIV3)),
            FramingFamily::Divx3
        );
        assert_eq!(
            family(StreamHints::new(CodecId::Mpeg4).with_tag(tags::DX50)),
            FramingFamily::Mpeg4Config
        );
        assert_eq!(
            family(StreamHints::new(CodecId::Mpeg4).with_tag(tags::XVID)),
            FramingFamily::Passthrough
        );
        assert_eq!(
            family(StreamHints::new(CodecId::Wmv3).with_tag(tags::WMV3)),
            FramingFamily::Wmv3
        );
        assert_eq!(
            family(StreamHints::new(CodecId::Vc1).with_tag(tags::WVC1)),
            FramingFamily::Wvc1
        );
        assert_eq!(
            family(StreamHints::new(CodecId::Mpeg2Video).with_container(StreamKind::Program)),
            FramingFamily::Mpeg12Program
        );
        assert_eq!(
            family(StreamHints::new(CodecId::Mpeg2Video)),
            FramingFamily::Passthrough
        );
        assert_eq!(
            family(StreamHints::new(CodecId::H263).with_tag(tags::H263)),
            FramingFamily::H263
        );
    }

    #[test]
    fn divx3_frames_get_chunk_prefix() {
        let mut synth = synth(
            StreamHints::new(CodecId::MsMpeg4V3)
                .with_tag(tags::DIV3)
                .with_dimensions(640, 480),
        );
        let header = synth.stream_header().unwrap().unwrap();
        assert_eq!(header.as_bytes(), &mpeg4::divx3_sequence_marker(640, 480));

        let mut unit = AccessUnit::new();
        unit.fill(&[0xaa; 300], None, Some(0), 0, true).unwrap();
        synth.prepare(&mut unit).unwrap();
        let prefix = unit.header().unwrap().as_bytes();
        assert_eq!(prefix.len(), mpeg4::DIVX3_CHUNK_PREFIX_LEN);
        assert_eq!(&prefix[13..], &300u32.to_be_bytes());
    }

    #[test]
    fn wmv3_sequence_rides_on_keyframes() {
        let mut synth = synth(
            StreamHints::new(CodecId::Wmv3)
                .with_tag(tags::WMV3)
                .with_dimensions(320, 240)
                .with_extradata(vec![0x4e, 0x29, 0x1a, 0x01]),
        );
        let mut unit = AccessUnit::new();

        // first frame after open carries the sequence even without a keyframe flag
        unit.fill(&[1; 10], None, None, 0, false).unwrap();
        synth.prepare(&mut unit).unwrap();
        assert_eq!(unit.header().unwrap().len(), 30 + vc1::WMV3_FRAME_MARKER_LEN);

        unit.fill(&[1; 10], None, None, 0, false).unwrap();
        synth.prepare(&mut unit).unwrap();
        assert_eq!(unit.header().unwrap().len(), vc1::WMV3_FRAME_MARKER_LEN);

        unit.fill(&[1; 10], None, None, 0, true).unwrap();
        synth.prepare(&mut unit).unwrap();
        assert_eq!(unit.header().unwrap().len(), 30 + vc1::WMV3_FRAME_MARKER_LEN);

        synth.rewind();
        unit.fill(&[1; 10], None, None, 0, false).unwrap();
        synth.prepare(&mut unit).unwrap();
        assert_eq!(unit.header().unwrap().len(), 30 + vc1::WMV3_FRAME_MARKER_LEN);
    }

    #[test]
    fn wvc1_header_and_prefix() {
        let mut synth = synth(
            StreamHints::new(CodecId::Vc1)
                .with_tag(tags::WVC1)
                .with_extradata(vec![0x0f, 0x00, 0x00, 0x01, 0x0f]),
        );
        let header = synth.stream_header().unwrap().unwrap();
        assert_eq!(header.as_bytes(), &[0x00, 0x00, 0x01, 0x0f]);

        let mut unit = AccessUnit::new();
        unit.fill(&[7; 4], None, None, 0, false).unwrap();
        synth.prepare(&mut unit).unwrap();
        assert_eq!(unit.header().unwrap().as_bytes(), &vc1::WVC1_FRAME_PREFIX);
    }

    #[test]
    fn untagged_vc1_has_no_stream_header() {
        let mut synth = synth(
            StreamHints::new(CodecId::Vc1).with_extradata(vec![0x0f, 0x00, 0x00, 0x01, 0x0f]),
        );
        assert_eq!(synth.family(), FramingFamily::Passthrough);
        assert!(synth.stream_header().unwrap().is_none());

        let mut unit = AccessUnit::new();
        unit.fill(&[7; 4], None, None, 0, false).unwrap();
        synth.prepare(&mut unit).unwrap();
        assert_eq!(unit.header().unwrap().as_bytes(), &vc1::WVC1_FRAME_PREFIX);
    }

    #[test]
    fn mpeg4_config_is_fed_verbatim() {
        let vol = vec![0x00, 0x00, 0x01, 0xb0, 0x01, 0x00, 0x00, 0x01, 0xb5, 0x89];
        for tag in [tags::M4S2, tags::DX50, tags::MP4V_LOWER, tags::FMP4] {
            let mut synth = synth(
                StreamHints::new(CodecId::Mpeg4)
                    .with_tag(tag)
                    .with_extradata(vol.clone()),
            );
            let header = synth.stream_header().unwrap().unwrap();
            assert_eq!(header.as_bytes(), &vol[..]);

            // frames carry nothing extra
            let mut unit = AccessUnit::new();
            unit.fill(&[9; 6], None, None, 0, false).unwrap();
            synth.prepare(&mut unit).unwrap();
            assert!(unit.header().is_none());
        }

        let bare = synth(StreamHints::new(CodecId::Mpeg4).with_tag(tags::DX50));
        assert!(bare.stream_header().unwrap().is_none());
    }

    #[test]
    fn h263_is_unsupported() {
        let mut synth = synth(StreamHints::new(CodecId::H263).with_tag(tags::H263));
        let mut unit = AccessUnit::new();
        unit.fill(&[0, 0, 0x80, 0x02], None, None, 0, false).unwrap();
        assert!(matches!(
            synth.prepare(&mut unit),
            Err(HwDecError::Unsupported(_))
        ));
        assert_eq!(unit.payload(), &[0, 0, 0x80, 0x02]);
    }

    #[test]
    fn malformed_avcc_fails_stream_header() {
        let synth = synth(StreamHints::new(CodecId::H264).with_extradata(vec![2u8; 12]));
        assert!(synth.stream_header().is_err());
    }
}
