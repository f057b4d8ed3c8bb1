use log::debug;

/// Codec identifiers as reported by the demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CodecId {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg2VideoXvmc,
    H263,
    H263P,
    H263I,
    Mpeg4,
    MsMpeg4V2,
    MsMpeg4V3,
    Flv1,
    Rv10,
    Rv20,
    Rv30,
    Rv40,
    H264,
    Mjpeg,
    Vc1,
    Wmv3,
    Vp6f,
    /// Anything the decoder has no path for.
    Other(u32),
}

impl CodecId {
    /// True for the MPEG-1/2 family that gets a program-stream sequence wrapper.
    pub fn is_mpeg12(self) -> bool {
        matches!(
            self,
            CodecId::Mpeg1Video | CodecId::Mpeg2Video | CodecId::Mpeg2VideoXvmc
        )
    }
}

/// Packs a four-character code the way container tags are stored: first
/// character in the low byte.
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Four-character codec tags the decoder distinguishes.
#[allow(missing_docs)]
pub mod tags {
    use super::fourcc;

    pub const XVID: u32 = fourcc(b"XVID");
    pub const XVID_LOWER: u32 = fourcc(b"xvid");
    pub const XVIX: u32 = fourcc(b"XVIX");
    pub const COL1: u32 = fourcc(b"COL1");
    pub const DIV3: u32 = fourcc(b"DIV3");
    pub const MP43: u32 = fourcc(b"MP43");
    pub const DIV4: u32 = fourcc(b"DIV4");
    pub const DIVX: u32 = fourcc(b"DIVX");
    pub const DIV5: u32 = fourcc(b"DIV5");
    pub const DX50: u32 = fourcc(b"DX50");
    pub const M4S2: u32 = fourcc(b"M4S2");
    pub const FMP4: u32 = fourcc(b"FMP4");
    pub const DIV6: u32 = fourcc(b"DIV6");
    pub const MP4V: u32 = fourcc(b"MP4V");
    pub const MP4V_LOWER: u32 = fourcc(b"mp4v");
    pub const RMP4: u32 = fourcc(b"RMP4");
    pub const MPG4: u32 = fourcc(b"MPG4");
    pub const H263: u32 = fourcc(b"H263");
    pub const H263_LOWER: u32 = fourcc(b"h263");
    pub const S263: u32 = fourcc(b"s263");
    pub const F263: u32 = fourcc(b"F263");
    pub const AVC1: u32 = fourcc(b"AVC1");
    pub const AVC1_LOWER: u32 = fourcc(b"avc1");
    pub const H264: u32 = fourcc(b"H264");
    pub const H264_LOWER: u32 = fourcc(b"h264");
    pub const RV30: u32 = fourcc(b"RV30");
    pub const RV40: u32 = fourcc(b"RV40");
    pub const WMV3: u32 = fourcc(b"WMV3");
    pub const VC_1: u32 = fourcc(b"VC-1");
    pub const WVC1: u32 = fourcc(b"WVC1");
    pub const WMVA: u32 = fourcc(b"WMVA");
}

/// Container/transport kind of the incoming stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum StreamKind {
    Unknown,
    Transport,
    Program,
    #[default]
    Elementary,
    RealMedia,
    Audio,
    Video,
}

impl StreamKind {
    /// Stream routing code understood by the decoder service.
    pub fn routing_code(self) -> i32 {
        match self {
            StreamKind::Unknown => 0,
            StreamKind::Elementary | StreamKind::Video => 1,
            StreamKind::Audio => 2,
            StreamKind::Program => 4,
            StreamKind::Transport => 5,
            StreamKind::RealMedia => 6,
        }
    }
}

/// Decoder-side video format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
#[repr(i32)]
pub enum DecoderFormat {
    Mpeg12 = 0,
    Mpeg4 = 1,
    H264 = 2,
    Mjpeg = 3,
    Real = 4,
    Jpeg = 5,
    Vc1 = 6,
    Avs = 7,
    Software = 8,
    H264Mvc = 9,
    Unsupported = 10,
}

impl DecoderFormat {
    /// Maps a demuxer codec id onto the decoder format family.
    pub fn for_codec(codec: CodecId) -> Self {
        let format = match codec {
            CodecId::Mpeg1Video | CodecId::Mpeg2Video | CodecId::Mpeg2VideoXvmc => {
                DecoderFormat::Mpeg12
            }
            CodecId::H263
            | CodecId::Mpeg4
            | CodecId::H263P
            | CodecId::H263I
            | CodecId::MsMpeg4V2
            | CodecId::MsMpeg4V3
            | CodecId::Flv1 => DecoderFormat::Mpeg4,
            CodecId::Rv10 | CodecId::Rv20 | CodecId::Rv30 | CodecId::Rv40 => DecoderFormat::Real,
            CodecId::H264 => DecoderFormat::H264,
            CodecId::Mjpeg => DecoderFormat::Mjpeg,
            CodecId::Vc1 | CodecId::Wmv3 => DecoderFormat::Vc1,
            CodecId::Vp6f => DecoderFormat::Software,
            CodecId::Other(_) => DecoderFormat::Unsupported,
        };
        debug!("codec {:?} -> format {:?}", codec, format);
        format
    }
}

/// Decoder subtype within a format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
#[repr(u32)]
pub enum DecoderSubtype {
    /// Unknown tag. Not rejected here; the decoder service refuses it at init.
    Unknown = 0,
    Mpeg4V3 = 1,
    Mpeg4V4 = 2,
    Mpeg4V5 = 3,
    H264 = 4,
    Mjpeg = 5,
    Mp4 = 6,
    H263 = 7,
    Real8 = 8,
    Real9 = 9,
    Wmv3 = 10,
    Wvc1 = 11,
    Software = 12,
    Avs = 13,
}

impl DecoderSubtype {
    /// Resolves a subtype from a container four-character code.
    pub fn for_tag(tag: u32) -> Self {
        use tags::*;
        let subtype = match tag {
            XVID | XVID_LOWER | XVIX => DecoderSubtype::Mpeg4V5,
            COL1 | DIV3 | MP43 => DecoderSubtype::Mpeg4V3,
            DIV4 | DIVX => DecoderSubtype::Mpeg4V4,
            DIV5 | DX50 | M4S2 | FMP4 | DIV6 => DecoderSubtype::Mpeg4V5,
            MP4V | RMP4 | MPG4 | MP4V_LOWER => DecoderSubtype::Mpeg4V5,
            H263 | H263_LOWER | S263 | F263 => DecoderSubtype::H263,
            AVC1 | AVC1_LOWER | tags::H264 | H264_LOWER => DecoderSubtype::H264,
            RV30 => DecoderSubtype::Real8,
            RV40 => DecoderSubtype::Real9,
            WMV3 => DecoderSubtype::Wmv3,
            VC_1 | WVC1 | WMVA => DecoderSubtype::Wvc1,
            _ => DecoderSubtype::Unknown,
        };
        debug!("codec tag {:#010x} -> subtype {:?}", tag, subtype);
        subtype
    }

    /// Resolves a subtype from the codec id when no tag is available.
    pub fn for_codec(codec: CodecId) -> Self {
        match codec {
            CodecId::Mpeg4 => DecoderSubtype::Mpeg4V5,
            CodecId::H263 => DecoderSubtype::H263,
            CodecId::Rv30 => DecoderSubtype::Real8,
            CodecId::Rv40 => DecoderSubtype::Real9,
            CodecId::H264 => DecoderSubtype::H264,
            CodecId::Vc1 => DecoderSubtype::Wvc1,
            CodecId::Vp6f => DecoderSubtype::Software,
            _ => DecoderSubtype::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_packs_first_char_low() {
        assert_eq!(tags::VC_1, 0x312D_4356);
        assert_eq!(tags::RV30, 0x3033_5652);
        assert_eq!(tags::RV40, 0x3034_5652);
    }

    #[test]
    fn tag_lookup() {
        assert_eq!(DecoderSubtype::for_tag(tags::DIV3), DecoderSubtype::Mpeg4V3);
        assert_eq!(DecoderSubtype::for_tag(tags::DIVX), DecoderSubtype::Mpeg4V4);
        assert_eq!(DecoderSubtype::for_tag(tags::DX50), DecoderSubtype::Mpeg4V5);
        assert_eq!(DecoderSubtype::for_tag(tags::AVC1_LOWER), DecoderSubtype::H264);
        assert_eq!(DecoderSubtype::for_tag(tags::WMV3), DecoderSubtype::Wmv3);
        assert_eq!(DecoderSubtype::for_tag(tags::WMVA), DecoderSubtype::Wvc1);
        assert_eq!(DecoderSubtype::for_tag(tags::F263), DecoderSubtype::H263);
        assert_eq!(DecoderSubtype::for_tag(fourcc(b"hev1")), DecoderSubtype::Unknown);
    }

    #[test]
    fn codec_lookup() {
        assert_eq!(DecoderFormat::for_codec(CodecId::Mpeg2Video), DecoderFormat::Mpeg12);
        assert_eq!(DecoderFormat::for_codec(CodecId::Flv1), DecoderFormat::Mpeg4);
        assert_eq!(DecoderFormat::for_codec(CodecId::Wmv3), DecoderFormat::Vc1);
        assert_eq!(DecoderFormat::for_codec(CodecId::Rv20), DecoderFormat::Real);
        assert_eq!(DecoderFormat::for_codec(CodecId::Other(99)), DecoderFormat::Unsupported);
        assert_eq!(DecoderSubtype::for_codec(CodecId::Vc1), DecoderSubtype::Wvc1);
        assert_eq!(DecoderSubtype::for_codec(CodecId::Wmv3), DecoderSubtype::Unknown);
    }
}
