//! Slice-header parsing (component C3): the subset of H.264 §7.3.3 needed to
//! classify the picture and to run the eight-condition "first slice of a new
//! picture" test of §7.4.1.2.4, plus the frame-type mapping of Table 7-6.

use failure::Error;

use crate::bitstream::Bitstream;
use crate::emulation::strip_emulation_prevention;
use crate::nal::NAL_SLICE_IDR;
use crate::paramset::ParameterSetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    None,
    I,
    P,
    B,
}

impl Default for FrameType {
    fn default() -> FrameType {
        FrameType::None
    }
}

/// Table 7-6: slice_type values above 4 repeat the same meaning ("all
/// slices in this picture have this type").
pub fn frame_type_for_slice_type(slice_type: u32) -> FrameType {
    match slice_type {
        0 | 5 => FrameType::P,
        1 | 6 => FrameType::B,
        2 | 7 => FrameType::I,
        3 | 8 => FrameType::P,
        4 | 9 => FrameType::I,
        _ => FrameType::None,
    }
}

/// Everything the AU-boundary test and re-injection logic need from a
/// parsed slice header. Sentinel value `-1` marks "absent"/"not yet seen",
/// mirroring the original's scalar `decoder_sys_t` fields.
#[derive(Debug, Clone, Copy)]
pub struct SliceSummary {
    pub nal_type: i32,
    pub nal_ref_idc: i32,
    pub frame_type: FrameType,
    pub pic_parameter_set_id: i32,
    pub frame_num: i32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: i32,
    pub idr_pic_id: i32,
    pub pic_order_cnt_lsb: i32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt0: i32,
    pub delta_pic_order_cnt1: i32,
}

impl SliceSummary {
    pub fn initial() -> SliceSummary {
        SliceSummary {
            nal_type: -1,
            nal_ref_idc: -1,
            frame_type: FrameType::None,
            pic_parameter_set_id: -1,
            frame_num: -1,
            field_pic_flag: false,
            bottom_field_flag: -1,
            idr_pic_id: -1,
            pic_order_cnt_lsb: -1,
            delta_pic_order_cnt_bottom: -1,
            delta_pic_order_cnt0: 0,
            delta_pic_order_cnt1: 0,
        }
    }
}

/// Parses the slice header prefix of `frag` (a full Annex B-framed NAL) and
/// reports whether it starts a new access unit relative to `prev`.
///
/// Only the first up-to-60 bytes of the payload (after the NAL header byte)
/// are examined, matching the original's `__MIN(i_buffer - 5, 60)` window.
pub fn parse_slice_header(
    frag: &[u8],
    nal_ref_idc: i32,
    nal_type: i32,
    store: &ParameterSetStore,
    prev: &SliceSummary,
) -> Result<(SliceSummary, bool), Error> {
    let window_len = std::cmp::min(frag.len().saturating_sub(5), 60);
    let rbsp = strip_emulation_prevention(&frag[5..5 + window_len]);
    let mut bs = Bitstream::new(&rbsp);

    let _first_mb_in_slice = bs.read_ue()?;
    let slice_type = bs.read_ue()?;
    let frame_type = frame_type_for_slice_type(slice_type);
    let pic_parameter_set_id = bs.read_ue()? as i32;
    let frame_num = bs.read_bits(store.log2_max_frame_num)? as i32;

    let mut field_pic_flag = false;
    let mut bottom_field_flag = -1i32;
    if !store.frame_mbs_only_flag {
        field_pic_flag = bs.read_bit()?;
        if field_pic_flag {
            bottom_field_flag = bs.read_bit()? as i32;
        }
    }

    let mut idr_pic_id = prev.idr_pic_id;
    if nal_type == NAL_SLICE_IDR as i32 {
        idr_pic_id = bs.read_ue()? as i32;
    }

    let mut pic_order_cnt_lsb = -1i32;
    let mut delta_pic_order_cnt_bottom = -1i32;
    let mut delta_pic_order_cnt0 = 0i32;
    let mut delta_pic_order_cnt1 = 0i32;
    if store.pic_order_cnt_type == 0 {
        pic_order_cnt_lsb = bs.read_bits(store.log2_max_pic_order_cnt_lsb)? as i32;
        if store.pic_order_present_flag && !field_pic_flag {
            delta_pic_order_cnt_bottom = bs.read_se()?;
        }
    } else if store.pic_order_cnt_type == 1 && !store.delta_pic_order_always_zero_flag {
        delta_pic_order_cnt0 = bs.read_se()?;
        if store.pic_order_present_flag && !field_pic_flag {
            delta_pic_order_cnt1 = bs.read_se()?;
        }
    }

    let slice = SliceSummary {
        nal_type,
        nal_ref_idc,
        frame_type,
        pic_parameter_set_id,
        frame_num,
        field_pic_flag,
        bottom_field_flag,
        idr_pic_id,
        pic_order_cnt_lsb,
        delta_pic_order_cnt_bottom,
        delta_pic_order_cnt0,
        delta_pic_order_cnt1,
    };

    let new_picture = is_new_access_unit(prev, &slice, store.pic_order_cnt_type);
    Ok((slice, new_picture))
}

/// H.264 §7.4.1.2.4's eight conditions for "first slice of a new picture".
fn is_new_access_unit(prev: &SliceSummary, cur: &SliceSummary, pic_order_cnt_type: u8) -> bool {
    let mut new_pic = false;

    if cur.frame_num != prev.frame_num
        || cur.pic_parameter_set_id != prev.pic_parameter_set_id
        || cur.field_pic_flag != prev.field_pic_flag
        || (cur.nal_ref_idc == 0) != (prev.nal_ref_idc == 0)
    {
        new_pic = true;
    }

    if cur.bottom_field_flag != -1
        && prev.bottom_field_flag != -1
        && cur.bottom_field_flag != prev.bottom_field_flag
    {
        new_pic = true;
    }

    if pic_order_cnt_type == 0 {
        if cur.pic_order_cnt_lsb != prev.pic_order_cnt_lsb
            || cur.delta_pic_order_cnt_bottom != prev.delta_pic_order_cnt_bottom
        {
            new_pic = true;
        }
    } else if pic_order_cnt_type == 1
        && (cur.delta_pic_order_cnt0 != prev.delta_pic_order_cnt0
            || cur.delta_pic_order_cnt1 != prev.delta_pic_order_cnt1)
    {
        new_pic = true;
    }

    if (cur.nal_type == NAL_SLICE_IDR as i32 || prev.nal_type == NAL_SLICE_IDR as i32)
        && (cur.nal_type != prev.nal_type || cur.idr_pic_id != prev.idr_pic_id)
    {
        new_pic = true;
    }

    new_pic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_type_table_matches_table_7_6() {
        assert_eq!(frame_type_for_slice_type(2), FrameType::I);
        assert_eq!(frame_type_for_slice_type(7), FrameType::I);
        assert_eq!(frame_type_for_slice_type(0), FrameType::P);
        assert_eq!(frame_type_for_slice_type(1), FrameType::B);
        assert_eq!(frame_type_for_slice_type(42), FrameType::None);
    }

    #[test]
    fn initial_summary_never_equals_a_real_idr() {
        // The sentinel nal_type -1 must never accidentally match NAL_SLICE_IDR (5),
        // or the very first slice would be misjudged against a phantom IDR.
        let initial = SliceSummary::initial();
        assert_ne!(initial.nal_type, NAL_SLICE_IDR as i32);
    }

    #[test]
    fn frame_num_change_starts_new_picture() {
        let mut prev = SliceSummary::initial();
        prev.frame_num = 0;
        prev.nal_type = 1;
        prev.pic_parameter_set_id = 0;
        let mut cur = prev;
        cur.frame_num = 1;
        assert!(is_new_access_unit(&prev, &cur, 2));
        prev = cur;
        let same = prev;
        assert!(!is_new_access_unit(&prev, &same, 2));
    }

    #[test]
    fn idr_transition_starts_new_picture() {
        let mut prev = SliceSummary::initial();
        prev.nal_type = NAL_SLICE_IDR as i32;
        prev.frame_num = 0;
        prev.pic_parameter_set_id = 0;
        prev.idr_pic_id = 3;
        let mut cur = prev;
        cur.idr_pic_id = 4;
        assert!(is_new_access_unit(&prev, &cur, 2));
    }
}
