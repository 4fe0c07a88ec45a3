//! Sequence Parameter Set syntax (H.264 §7.3.2.1) — just enough of it to
//! recover the fields spec.md's data model names: the id used for
//! replacement/lookup, the bit widths the slice-header parser needs, the
//! picture-order-count machinery, and the VUI timing/field-structure fields
//! the AU assembler and SEI parser depend on. Everything else in the syntax
//! (scaling lists, cropping, HRD bit-rate tables) is walked only far enough
//! to keep the bit position correct for what comes after it.

use bytes::Bytes;
use failure::{bail, Error};

use crate::bitstream::Bitstream;
use crate::emulation::strip_emulation_prevention;

/// Standard sample aspect ratios, Table E-1. Index 0 is unused (idc 0 is
/// "Unspecified").
#[rustfmt::skip]
const ASPECT_RATIO_TABLE: [(u32, u32); 17] = [
    (0, 0),
    (1, 1), (12, 11), (10, 11), (16, 11),
    (40, 33), (24, 11), (20, 11), (32, 11),
    (80, 33), (18, 11), (15, 11), (64, 33),
    (160, 99), (4, 3), (3, 2), (2, 1),
];

const EXTENDED_SAR: u32 = 255;

#[derive(Debug, Clone, Default)]
pub struct VuiParams {
    pub sar_num: u32,
    pub sar_den: u32,
    pub timing_info_present: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate: bool,
    pub pic_struct_present: bool,
    pub cpb_dpb_delays_present: bool,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
}

#[derive(Debug, Clone)]
pub struct SpsRecord {
    /// Original Annex B-framed NAL, kept verbatim for re-injection ahead of
    /// I-frames and AUs that carry it inline.
    pub nal: Bytes,

    pub sps_id: u8,
    pub profile_idc: u8,
    pub level_idc: u8,

    pub pic_width_in_mbs: u32,
    pub pic_height_in_map_units: u32,
    pub frame_mbs_only_flag: bool,

    /// Already includes the implicit `+ 4` of `log2_max_frame_num_minus4`.
    pub log2_max_frame_num: u8,
    pub pic_order_cnt_type: u8,
    pub delta_pic_order_always_zero_flag: bool,
    /// Already includes the implicit `+ 4`; meaningful only when
    /// `pic_order_cnt_type == 0`.
    pub log2_max_pic_order_cnt_lsb: u8,

    pub vui: Option<VuiParams>,
}

impl SpsRecord {
    pub fn width(&self) -> u32 {
        (self.pic_width_in_mbs) * 16
    }

    pub fn height(&self) -> u32 {
        let mul = if self.frame_mbs_only_flag { 1 } else { 2 };
        self.pic_height_in_map_units * 16 * mul
    }

    pub fn parse(nal: &Bytes) -> Result<SpsRecord, Error> {
        if nal.len() <= 5 {
            bail!("SPS NAL too short ({} bytes)", nal.len());
        }
        let rbsp = strip_emulation_prevention(&nal[5..]);
        let mut bs = Bitstream::new(&rbsp);

        let profile_idc = bs.read_bits(8)? as u8;
        let _constraint_and_reserved = bs.read_bits(8)?;
        let level_idc = bs.read_bits(8)? as u8;
        let sps_id = bs.read_ue()? as u8;
        if sps_id as usize >= crate::paramset::SPS_MAX {
            bail!("SPS id {} out of range", sps_id);
        }

        if matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            let chroma_format_idc = bs.read_ue()?;
            if chroma_format_idc == 3 {
                let _separate_colour_plane_flag = bs.read_bit()?;
            }
            let _bit_depth_luma_minus8 = bs.read_ue()?;
            let _bit_depth_chroma_minus8 = bs.read_ue()?;
            let _qpprime_y_zero_transform_bypass_flag = bs.read_bit()?;
            let seq_scaling_matrix_present_flag = bs.read_bit()?;
            if seq_scaling_matrix_present_flag {
                let count = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..count {
                    let present = bs.read_bit()?;
                    if present {
                        let size = if i < 6 { 16 } else { 64 };
                        skip_scaling_list(&mut bs, size)?;
                    }
                }
            }
        }

        let log2_max_frame_num_minus4 = bs.read_ue()?;
        if log2_max_frame_num_minus4 > 12 {
            bail!("log2_max_frame_num_minus4 implausibly large");
        }
        let log2_max_frame_num = log2_max_frame_num_minus4 as u8 + 4;

        let pic_order_cnt_type = bs.read_ue()? as u8;
        let mut delta_pic_order_always_zero_flag = false;
        let mut log2_max_pic_order_cnt_lsb = 0u8;
        if pic_order_cnt_type == 0 {
            let minus4 = bs.read_ue()?;
            if minus4 > 12 {
                bail!("log2_max_pic_order_cnt_lsb_minus4 implausibly large");
            }
            log2_max_pic_order_cnt_lsb = minus4 as u8 + 4;
        } else if pic_order_cnt_type == 1 {
            delta_pic_order_always_zero_flag = bs.read_bit()?;
            let _offset_for_non_ref_pic = bs.read_se()?;
            let _offset_for_top_to_bottom_field = bs.read_se()?;
            let num_ref_frames_in_pic_order_cnt_cycle = bs.read_ue()?;
            for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                let _offset_for_ref_frame = bs.read_se()?;
            }
        }

        let _max_num_ref_frames = bs.read_ue()?;
        let _gaps_in_frame_num_value_allowed_flag = bs.read_bit()?;
        let pic_width_in_mbs_minus1 = bs.read_ue()?;
        let pic_height_in_map_units_minus1 = bs.read_ue()?;
        let frame_mbs_only_flag = bs.read_bit()?;
        if !frame_mbs_only_flag {
            let _mb_adaptive_frame_field_flag = bs.read_bit()?;
        }
        let _direct_8x8_inference_flag = bs.read_bit()?;
        let frame_cropping_flag = bs.read_bit()?;
        if frame_cropping_flag {
            let _crop_left = bs.read_ue()?;
            let _crop_right = bs.read_ue()?;
            let _crop_top = bs.read_ue()?;
            let _crop_bottom = bs.read_ue()?;
        }

        let vui_parameters_present_flag = bs.read_bit()?;
        let vui = if vui_parameters_present_flag {
            Some(parse_vui(&mut bs)?)
        } else {
            None
        };

        Ok(SpsRecord {
            nal: nal.clone(),
            sps_id,
            profile_idc,
            level_idc,
            pic_width_in_mbs: pic_width_in_mbs_minus1 + 1,
            pic_height_in_map_units: pic_height_in_map_units_minus1 + 1,
            frame_mbs_only_flag,
            log2_max_frame_num,
            pic_order_cnt_type,
            delta_pic_order_always_zero_flag,
            log2_max_pic_order_cnt_lsb,
            vui,
        })
    }
}

fn skip_scaling_list(bs: &mut Bitstream, size: usize) -> Result<(), Error> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = bs.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
    Ok(())
}

fn parse_vui(bs: &mut Bitstream) -> Result<VuiParams, Error> {
    let mut vui = VuiParams::default();

    let aspect_ratio_info_present_flag = bs.read_bit()?;
    if aspect_ratio_info_present_flag {
        let aspect_ratio_idc = bs.read_bits(8)?;
        if aspect_ratio_idc == EXTENDED_SAR {
            vui.sar_num = bs.read_bits(16)?;
            vui.sar_den = bs.read_bits(16)?;
        } else if (aspect_ratio_idc as usize) < ASPECT_RATIO_TABLE.len() {
            let (n, d) = ASPECT_RATIO_TABLE[aspect_ratio_idc as usize];
            vui.sar_num = n;
            vui.sar_den = d;
        }
    }

    let overscan_info_present_flag = bs.read_bit()?;
    if overscan_info_present_flag {
        let _overscan_appropriate_flag = bs.read_bit()?;
    }

    let video_signal_type_present_flag = bs.read_bit()?;
    if video_signal_type_present_flag {
        let _video_format = bs.read_bits(3)?;
        let _video_full_range_flag = bs.read_bit()?;
        let colour_description_present_flag = bs.read_bit()?;
        if colour_description_present_flag {
            let _colour_primaries = bs.read_bits(8)?;
            let _transfer_characteristics = bs.read_bits(8)?;
            let _matrix_coefficients = bs.read_bits(8)?;
        }
    }

    let chroma_loc_info_present_flag = bs.read_bit()?;
    if chroma_loc_info_present_flag {
        let _chroma_sample_loc_type_top_field = bs.read_ue()?;
        let _chroma_sample_loc_type_bottom_field = bs.read_ue()?;
    }

    let timing_info_present_flag = bs.read_bit()?;
    if timing_info_present_flag {
        vui.timing_info_present = true;
        vui.num_units_in_tick = bs.read_bits(32)?;
        vui.time_scale = bs.read_bits(32)?;
        vui.fixed_frame_rate = bs.read_bit()?;
    }

    let nal_hrd_parameters_present_flag = bs.read_bit()?;
    if nal_hrd_parameters_present_flag {
        parse_hrd_parameters(bs, &mut vui)?;
    }
    let vcl_hrd_parameters_present_flag = bs.read_bit()?;
    if vcl_hrd_parameters_present_flag {
        parse_hrd_parameters(bs, &mut vui)?;
    }
    vui.cpb_dpb_delays_present = nal_hrd_parameters_present_flag || vcl_hrd_parameters_present_flag;
    if vui.cpb_dpb_delays_present {
        let _low_delay_hrd_flag = bs.read_bit()?;
    }

    vui.pic_struct_present = bs.read_bit()?;

    let bitstream_restriction_flag = bs.read_bit()?;
    if bitstream_restriction_flag {
        let _motion_vectors_over_pic_boundaries_flag = bs.read_bit()?;
        let _max_bytes_per_pic_denom = bs.read_ue()?;
        let _max_bits_per_mb_denom = bs.read_ue()?;
        let _log2_max_mv_length_horizontal = bs.read_ue()?;
        let _log2_max_mv_length_vertical = bs.read_ue()?;
        let _max_num_reorder_frames = bs.read_ue()?;
        let _max_dec_frame_buffering = bs.read_ue()?;
    }

    Ok(vui)
}

fn parse_hrd_parameters(bs: &mut Bitstream, vui: &mut VuiParams) -> Result<(), Error> {
    let cpb_cnt_minus1 = bs.read_ue()?;
    let _bit_rate_scale = bs.read_bits(4)?;
    let _cpb_size_scale = bs.read_bits(4)?;
    for _ in 0..=cpb_cnt_minus1 {
        let _bit_rate_value_minus1 = bs.read_ue()?;
        let _cpb_size_value_minus1 = bs.read_ue()?;
        let _cbr_flag = bs.read_bit()?;
    }
    vui.cpb_removal_delay_length_minus1 = bs.read_bits(5)? as u8;
    vui.dpb_output_delay_length_minus1 = bs.read_bits(5)? as u8;
    let _time_offset_length = bs.read_bits(5)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::make_annexb_nal;

    // A baseline-profile 320x240, 30fps SPS (id 0), hand-assembled from the
    // H.264 §7.3.2.1 syntax rather than captured from a real encoder.
    #[rustfmt::skip]
    fn baseline_320x240_sps_payload() -> Vec<u8> {
        // profile_idc=66, constraints=0, level_idc=30 (3.0), then RBSP:
        // sps_id=0 (ue 1), log2_max_frame_num_minus4=0 (ue 1),
        // pic_order_cnt_type=2 (ue 011), max_num_ref_frames=1(ue 010),
        // gaps=0, pic_width_in_mbs_minus1=19 (ue -> 20 mbs = 320px),
        // pic_height_in_map_units_minus1=14 (ue -> 15 units = 240px),
        // frame_mbs_only_flag=1, direct_8x8=1, frame_cropping=0, vui=0.
        vec![0x42, 0x00, 0x1e]
    }

    fn encode_ue(bits: &mut Vec<bool>, mut value: u32) {
        value += 1;
        let nbits = 32 - value.leading_zeros();
        for _ in 0..nbits - 1 {
            bits.push(false);
        }
        for i in (0..nbits).rev() {
            bits.push((value >> i) & 1 == 1);
        }
    }

    fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut cur = 0u8;
        let mut n = 0;
        for &b in bits {
            cur = (cur << 1) | (b as u8);
            n += 1;
            if n == 8 {
                out.push(cur);
                cur = 0;
                n = 0;
            }
        }
        if n > 0 {
            out.push(cur << (8 - n));
        }
        out
    }

    fn build_test_sps() -> Bytes {
        let mut header = baseline_320x240_sps_payload();
        let mut bits = Vec::new();
        encode_ue(&mut bits, 0); // sps_id
        encode_ue(&mut bits, 0); // log2_max_frame_num_minus4
        encode_ue(&mut bits, 2); // pic_order_cnt_type = 2 (no extra fields)
        encode_ue(&mut bits, 1); // max_num_ref_frames
        bits.push(false); // gaps_in_frame_num_value_allowed_flag
        encode_ue(&mut bits, 19); // pic_width_in_mbs_minus1 -> 20 mbs -> 320px
        encode_ue(&mut bits, 14); // pic_height_in_map_units_minus1 -> 15 -> 240px
        bits.push(true); // frame_mbs_only_flag
        bits.push(true); // direct_8x8_inference_flag
        bits.push(false); // frame_cropping_flag
        bits.push(false); // vui_parameters_present_flag
        bits.push(true); // rbsp_stop_one_bit
        header.extend(bits_to_bytes(&bits));
        let mut nal_payload = vec![0x67];
        nal_payload.extend(header);
        make_annexb_nal(&nal_payload)
    }

    #[test]
    fn parses_dimensions_and_ids() {
        let nal = build_test_sps();
        let sps = SpsRecord::parse(&nal).unwrap();
        assert_eq!(sps.sps_id, 0);
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.width(), 320);
        assert_eq!(sps.height(), 240);
        assert_eq!(sps.log2_max_frame_num, 4);
        assert_eq!(sps.pic_order_cnt_type, 2);
        assert!(sps.vui.is_none());
    }

    #[test]
    fn rejects_truncated_nal() {
        let nal = make_annexb_nal(&[0x67]);
        assert!(SpsRecord::parse(&nal).is_err());
    }
}
