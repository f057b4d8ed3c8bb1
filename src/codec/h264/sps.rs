//! Minimal SPS walk, far enough to recover the cropped picture size.

use log::debug;

use crate::error::{HwDecError, Result};
use crate::utils::{unescape_rbsp, BitReader};

const HIGH_PROFILES: [u32; 10] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138];

/// Returns `(width, height)` in pixels from a sequence parameter set NAL,
/// including its one-byte NAL header.
pub fn parse_dimensions(nal: &[u8]) -> Result<(u32, u32)> {
    if nal.first().map(|b| b & 0x1f) != Some(7) {
        return Err(HwDecError::InvalidData("not a sequence parameter set".into()));
    }
    let rbsp = unescape_rbsp(&nal[1..]);
    let mut reader = BitReader::new(&rbsp);

    let profile_idc = reader.read_bits(8)?;
    reader.skip_bits(8)?; // constraint flags
    let level_idc = reader.read_bits(8)?;
    reader.skip_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    if HIGH_PROFILES.contains(&profile_idc) {
        chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            separate_colour_plane = reader.read_flag()?;
        }
        reader.skip_ue()?; // bit_depth_luma_minus8
        reader.skip_ue()?; // bit_depth_chroma_minus8
        reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_flag()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if reader.read_flag()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.skip_ue()?; // log2_max_frame_num_minus4
    match reader.read_ue()? {
        0 => reader.skip_ue()?, // log2_max_pic_order_cnt_lsb_minus4
        1 => {
            reader.skip_bits(1)?; // delta_pic_order_always_zero_flag
            reader.read_se()?; // offset_for_non_ref_pic
            reader.read_se()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_ue()?;
            for _ in 0..cycle {
                reader.read_se()?;
            }
        }
        _ => {}
    }
    reader.skip_ue()?; // max_num_ref_frames
    reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_mbs = reader.read_ue()? + 1;
    let height_map_units = reader.read_ue()? + 1;
    let frame_mbs_only = reader.read_flag()?;
    if !frame_mbs_only {
        reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.skip_bits(1)?; // direct_8x8_inference_flag

    let mut width = width_mbs * 16;
    let mut height = (2 - frame_mbs_only as u32) * height_map_units * 16;

    if reader.read_flag()? {
        let left = reader.read_ue()?;
        let right = reader.read_ue()?;
        let top = reader.read_ue()?;
        let bottom = reader.read_ue()?;

        let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
        let (crop_x, crop_y) = match chroma_array_type {
            0 => (1, 2 - frame_mbs_only as u32),
            1 => (2, 2 * (2 - frame_mbs_only as u32)),
            2 => (2, 2 - frame_mbs_only as u32),
            _ => (1, 2 - frame_mbs_only as u32),
        };
        width = width.saturating_sub(crop_x * (left + right));
        height = height.saturating_sub(crop_y * (top + bottom));
    }

    debug!(
        "sps profile {} level {}: {}x{}",
        profile_idc, level_idc, width, height
    );
    Ok((width, height))
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = reader.read_se()?;
            next = (last + delta + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}
