use bytes::Bytes;
use log::{debug, warn};

use super::format::{tags, CodecId, DecoderFormat, DecoderSubtype, StreamKind};
use super::time::frame_duration_units;
use crate::codec::h264::{sps, AvcDecoderConfig};

/// What the demuxer knows about a video stream when the decoder is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHints {
    /// Codec identifier.
    pub codec: CodecId,
    /// Container four-character code, 0 when absent.
    pub codec_tag: u32,
    /// Coded width, 0 when unknown.
    pub width: u32,
    /// Coded height, 0 when unknown.
    pub height: u32,
    /// Average frame rate numerator.
    pub fps_rate: u32,
    /// Average frame rate denominator.
    pub fps_scale: u32,
    /// Real (base) frame rate numerator.
    pub rfps_rate: u32,
    /// Real (base) frame rate denominator.
    pub rfps_scale: u32,
    /// Display orientation in degrees.
    pub orientation: u32,
    /// Demuxer stream id.
    pub pid: i32,
    /// Container the stream arrives in.
    pub container: StreamKind,
    /// Out-of-band codec parameters.
    pub extradata: Bytes,
}

impl StreamHints {
    /// Hints for an elementary stream of `codec` with nothing else known.
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            codec_tag: 0,
            width: 0,
            height: 0,
            fps_rate: 0,
            fps_scale: 0,
            rfps_rate: 0,
            rfps_scale: 0,
            orientation: 0,
            pid: 0,
            container: StreamKind::Elementary,
            extradata: Bytes::new(),
        }
    }

    /// Sets the container four-character code.
    pub fn with_tag(mut self, tag: u32) -> Self {
        self.codec_tag = tag;
        self
    }

    /// Sets the coded dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the average frame rate as `rate / scale` frames per second.
    pub fn with_frame_rate(mut self, rate: u32, scale: u32) -> Self {
        self.fps_rate = rate;
        self.fps_scale = scale;
        self
    }

    /// Sets the real frame rate, preferred over the average one.
    pub fn with_real_frame_rate(mut self, rate: u32, scale: u32) -> Self {
        self.rfps_rate = rate;
        self.rfps_scale = scale;
        self
    }

    /// Sets the display orientation in degrees.
    pub fn with_orientation(mut self, degrees: u32) -> Self {
        self.orientation = degrees;
        self
    }

    /// Sets the demuxer stream id.
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = pid;
        self
    }

    /// Sets the container kind.
    pub fn with_container(mut self, container: StreamKind) -> Self {
        self.container = container;
        self
    }

    /// Sets the out-of-band codec parameters.
    pub fn with_extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = extradata.into();
        self
    }
}

/// Pixel aspect ratio in the decoder's two fixed-point encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    /// 16.16 encoding.
    pub ratio: u32,
    /// 32.32 encoding.
    pub ratio64: u64,
}

impl AspectRatio {
    /// Square pixels. The decoder is always told 1:1 and the renderer scales.
    pub const SQUARE: AspectRatio = AspectRatio::new(1, 1);

    /// Encodes `num:den`.
    pub const fn new(num: u16, den: u16) -> Self {
        Self {
            ratio: ((num as u32) << 16) | den as u32,
            ratio64: ((num as u64) << 32) | den as u64,
        }
    }
}

/// Resolved stream description, fixed from open until close.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Container routing.
    pub kind: StreamKind,
    /// Codec identifier.
    pub codec: CodecId,
    /// Four-character code after overrides.
    pub codec_tag: u32,
    /// Decoder format family.
    pub format: DecoderFormat,
    /// Decoder subtype.
    pub subtype: DecoderSubtype,
    /// Coded width.
    pub width: u32,
    /// Coded height.
    pub height: u32,
    /// Frame duration in decoder units (96 kHz), 0 when unknown.
    pub rate: u32,
    /// Pixel aspect ratio.
    pub aspect: AspectRatio,
    /// Rotation code 0..=3 for 0/90/180/270 degrees.
    pub rotation: u32,
    /// Demuxer stream id.
    pub pid: i32,
    /// Out-of-band codec parameters.
    pub extradata: Bytes,
}

impl StreamDescriptor {
    /// Resolves hints into a descriptor.
    pub fn from_hints(hints: &StreamHints) -> Self {
        let format = DecoderFormat::for_codec(hints.codec);
        let kind = if format == DecoderFormat::Real {
            StreamKind::RealMedia
        } else {
            hints.container
        };

        let subtype = if hints.container == StreamKind::Elementary && hints.codec_tag != 0 {
            DecoderSubtype::for_tag(hints.codec_tag)
        } else {
            DecoderSubtype::for_codec(hints.codec)
        };

        // flv carries sorenson h263 whatever the tag says
        let codec_tag = if hints.codec == CodecId::Flv1 {
            tags::F263
        } else {
            hints.codec_tag
        };

        let (mut width, mut height) = (hints.width, hints.height);
        if format == DecoderFormat::H264 && (width == 0 || height == 0) {
            match probe_h264_dimensions(&hints.extradata) {
                Some((w, h)) => {
                    debug!("dimensions {}x{} taken from sps", w, h);
                    width = w;
                    height = h;
                }
                None => warn!("h264 stream without dimensions and no usable sps"),
            }
        }

        let descriptor = Self {
            kind,
            codec: hints.codec,
            codec_tag,
            format,
            subtype,
            width,
            height,
            rate: derive_rate(hints),
            aspect: AspectRatio::SQUARE,
            rotation: rotation_code(hints.orientation),
            pid: hints.pid,
            extradata: hints.extradata.clone(),
        };
        debug!(
            "stream {:?}/{:?} {}x{} rate {} rotation {}",
            descriptor.format,
            descriptor.subtype,
            descriptor.width,
            descriptor.height,
            descriptor.rate,
            descriptor.rotation
        );
        descriptor
    }

    /// True when the sequence header travels with each frame instead of
    /// being fed once up front.
    pub fn defers_header_to_frames(&self) -> bool {
        self.format == DecoderFormat::Vc1 && self.subtype == DecoderSubtype::Wmv3
    }
}

fn derive_rate(hints: &StreamHints) -> u32 {
    let mut rate = if hints.rfps_rate > 0 && hints.rfps_scale != 0 {
        frame_duration_units(hints.rfps_rate, hints.rfps_scale)
    } else if hints.fps_rate > 0 && hints.fps_scale != 0 {
        frame_duration_units(hints.fps_rate, hints.fps_scale)
    } else if hints.codec == CodecId::Mpeg2Video {
        // broadcast recordings often arrive without any rate
        if hints.width == 1280 {
            frame_duration_units(60000, 1001)
        } else {
            frame_duration_units(30000, 1001)
        }
    } else {
        0
    };

    // 1080i25 misreported as 50 fps
    if hints.width == 1920 && rate == 1920 {
        rate = frame_duration_units(25000, 1001);
    }
    rate
}

fn rotation_code(degrees: u32) -> u32 {
    match degrees {
        90 => 1,
        180 => 2,
        270 => 3,
        _ => 0,
    }
}

fn probe_h264_dimensions(extradata: &[u8]) -> Option<(u32, u32)> {
    let config = AvcDecoderConfig::parse(extradata).ok()?;
    let first = config.sps.first()?;
    sps::parse_dimensions(first).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn real_frame_rate_wins() {
        let hints = StreamHints::new(CodecId::H264)
            .with_frame_rate(25, 1)
            .with_real_frame_rate(30000, 1001);
        assert_eq!(StreamDescriptor::from_hints(&hints).rate, 3203);

        let hints = StreamHints::new(CodecId::H264).with_frame_rate(25, 1);
        assert_eq!(StreamDescriptor::from_hints(&hints).rate, 3840);
    }

    #[test]
    fn mpeg2_without_rate_falls_back() {
        let hints = StreamHints::new(CodecId::Mpeg2Video).with_dimensions(720, 576);
        assert_eq!(StreamDescriptor::from_hints(&hints).rate, 3203);
        let hints = StreamHints::new(CodecId::Mpeg2Video).with_dimensions(1280, 720);
        assert_eq!(StreamDescriptor::from_hints(&hints).rate, 1602);
    }

    #[test]
    fn misreported_1080i25_is_corrected() {
        let hints = StreamHints::new(CodecId::H264)
            .with_dimensions(1920, 1080)
            .with_frame_rate(50, 1);
        assert_eq!(StreamDescriptor::from_hints(&hints).rate, 3844);
    }

    #[test]
    fn orientation_and_aspect() {
        let hints = StreamHints::new(CodecId::Mpeg4).with_orientation(270);
        let desc = StreamDescriptor::from_hints(&hints);
        assert_eq!(desc.rotation, 3);
        assert_eq!(desc.aspect.ratio, 0x0001_0001);
        assert_eq!(desc.aspect.ratio64, 0x0000_0001_0000_0001);
        assert_eq!(
            StreamDescriptor::from_hints(&StreamHints::new(CodecId::Mpeg4).with_orientation(45))
                .rotation,
            0
        );
    }

    #[test]
    fn subtype_resolution() {
        let hints = StreamHints::new(CodecId::Mpeg4).with_tag(tags::DIV3);
        assert_eq!(StreamDescriptor::from_hints(&hints).subtype, DecoderSubtype::Mpeg4V3);

        // without a tag the codec id decides
        let hints = StreamHints::new(CodecId::Vc1);
        assert_eq!(StreamDescriptor::from_hints(&hints).subtype, DecoderSubtype::Wvc1);

        let hints = StreamHints::new(CodecId::Flv1).with_tag(tags::FMP4);
        let desc = StreamDescriptor::from_hints(&hints);
        assert_eq!(desc.subtype, DecoderSubtype::Mpeg4V5);
        assert_eq!(desc.codec_tag, tags::F263);

        let hints = StreamHints::new(CodecId::Rv40).with_tag(tags::RV40);
        let desc = StreamDescriptor::from_hints(&hints);
        assert_eq!(desc.kind, StreamKind::RealMedia);
        assert_eq!(desc.subtype, DecoderSubtype::Real9);
    }

    #[test]
    fn h264_dimensions_from_sps() {
        let sps = [0x67, 0x42, 0x00, 0x1e, 0xda, 0x01, 0xe0, 0x08, 0x9f, 0x95];
        let mut avcc = vec![0x01, 0x42, 0x00, 0x1e, 0xff, 0xe1, 0x00, sps.len() as u8];
        avcc.extend_from_slice(&sps);
        avcc.extend_from_slice(&[0x01, 0x00, 0x03, 0x68, 0xce, 0x38]);

        let hints = StreamHints::new(CodecId::H264).with_extradata(avcc);
        let desc = StreamDescriptor::from_hints(&hints);
        assert_eq!((desc.width, desc.height), (1920, 1080));
        assert!(!desc.defers_header_to_frames());
    }
}
