use log::debug;

use crate::av::{DecoderFormat, DecoderSubtype, StreamDescriptor, StreamKind};

/// Decoder timestamps come from check-ins, not from the bitstream.
pub const EXTERNAL_PTS: u32 = 1;

/// Output pacing is driven from outside the decoder.
pub const SYNC_OUTSIDE: u32 = 2;

/// Everything the decoder service needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    /// Stream id, shifted for VC-1 extension ids.
    pub video_pid: i32,
    /// Format family.
    pub video_type: DecoderFormat,
    /// Container routing.
    pub stream_type: StreamKind,
    /// Decoder subtype.
    pub format: DecoderSubtype,
    /// Coded width.
    pub width: u32,
    /// Coded height.
    pub height: u32,
    /// Frame duration in 96 kHz units.
    pub rate: u32,
    /// 16.16 aspect ratio.
    pub ratio: u32,
    /// 32.32 aspect ratio.
    pub ratio64: u64,
    /// Per-format flags in the low bits, rotation code in bits 16..=17.
    pub param: u32,
    /// Number of RealVideo 8 size entries following the coded size.
    pub extra: u32,
    /// RealVideo size table: coded size first, then `extra` alternates.
    pub real_sizes: Option<[u16; 9]>,
}

impl InitParams {
    /// Derives init parameters from a resolved stream.
    pub fn from_descriptor(desc: &StreamDescriptor) -> Self {
        let mut params = InitParams {
            video_pid: desc.pid,
            video_type: desc.format,
            stream_type: desc.kind,
            format: desc.subtype,
            width: desc.width,
            height: desc.height,
            rate: desc.rate,
            ratio: desc.aspect.ratio,
            ratio64: desc.aspect.ratio64,
            param: 0,
            extra: 0,
            real_sizes: None,
        };

        match desc.format {
            DecoderFormat::Mpeg4 => params.param = EXTERNAL_PTS,
            DecoderFormat::H264 | DecoderFormat::H264Mvc => {
                params.format = DecoderSubtype::H264;
                params.param = EXTERNAL_PTS | SYNC_OUTSIDE;
            }
            DecoderFormat::Real => {
                params.stream_type = StreamKind::RealMedia;
                params.ratio = 0x100;
                params.ratio64 = 0;
                let (extra, table) = real_size_table(desc);
                params.extra = extra;
                params.real_sizes = Some(table);
            }
            DecoderFormat::Vc1 => {
                // extension ids 0xfd55..=0xfd5f keep the stream number in the high byte
                params.video_pid >>= 8;
            }
            _ => {}
        }
        params.param |= desc.rotation << 16;

        debug!(
            "init params {:?}/{:?} {}x{} rate {} param {:#x}",
            params.video_type, params.format, params.width, params.height, params.rate, params.param
        );
        params
    }
}

fn real_size_table(desc: &StreamDescriptor) -> (u32, [u16; 9]) {
    let mut table = [0u16; 9];
    if desc.subtype != DecoderSubtype::Real8 {
        return (0, table);
    }
    let ed = &desc.extradata;
    let extra = ed.get(1).map_or(0, |b| (b & 7) as u32);
    table[0] = (((desc.width >> 2).wrapping_sub(1) as u16) << 8)
        | ((desc.height >> 2).wrapping_sub(1) as u16 & 0xff);
    for i in 1..=extra as usize {
        let j = 8 + 2 * (i - 1);
        let (Some(&w), Some(&h)) = (ed.get(j), ed.get(j + 1)) else {
            break;
        };
        table[i] = ((w.wrapping_sub(1) as u16) << 8) | (h.wrapping_sub(1) as u16 & 0xff);
    }
    (extra, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{tags, CodecId, StreamHints};
    use pretty_assertions::assert_eq;

    fn params(hints: StreamHints) -> InitParams {
        InitParams::from_descriptor(&StreamDescriptor::from_hints(&hints))
    }

    #[test]
    fn h264_flags_and_rotation() {
        let p = params(
            StreamHints::new(CodecId::H264)
                .with_tag(tags::FMP4)
                .with_dimensions(1280, 720)
                .with_orientation(90),
        );
        assert_eq!(p.format, DecoderSubtype::H264);
        assert_eq!(p.param, EXTERNAL_PTS | SYNC_OUTSIDE | (1 << 16));
        assert_eq!(p.ratio, 0x0001_0001);
        assert_eq!(p.stream_type, StreamKind::Elementary);
    }

    #[test]
    fn mpeg4_external_pts() {
        let p = params(StreamHints::new(CodecId::Mpeg4).with_tag(tags::XVID));
        assert_eq!(p.param, EXTERNAL_PTS);
        assert_eq!(p.format, DecoderSubtype::Mpeg4V5);
    }

    #[test]
    fn vc1_pid_shift() {
        let p = params(StreamHints::new(CodecId::Vc1).with_pid(0xfd55));
        assert_eq!(p.video_pid, 0xfd);
        assert_eq!(p.param, 0);
    }

    #[test]
    fn real8_size_table() {
        let mut extradata = vec![0u8; 12];
        extradata[1] = 0x02;
        extradata[8..12].copy_from_slice(&[81, 61, 41, 31]);
        let p = params(
            StreamHints::new(CodecId::Rv30)
                .with_tag(tags::RV30)
                .with_dimensions(320, 240)
                .with_extradata(extradata),
        );
        assert_eq!(p.stream_type, StreamKind::RealMedia);
        assert_eq!((p.ratio, p.ratio64), (0x100, 0));
        assert_eq!(p.extra, 2);
        let table = p.real_sizes.unwrap();
        assert_eq!(table[0], (79 << 8) | 59);
        assert_eq!(table[1], (80 << 8) | 60);
        assert_eq!(table[2], (40 << 8) | 30);
        assert_eq!(table[3], 0);
    }
}
