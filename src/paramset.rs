//! Parameter-set store (component C2): fixed-size slot tables for SPS/PPS,
//! plus the "active" derived fields the slice-header parser, SEI parser and
//! AU assembler read. The original tracks these as flat `decoder_sys_t`
//! scalars updated by `PutSPS`/`PutPPS`, regardless of which parameter set a
//! given slice's `pic_parameter_set_id` names; this store preserves that
//! single-active-set simplification (see DESIGN.md).

use bytes::Bytes;
use log::{debug, warn};

use crate::pps::PpsRecord;
use crate::sps::SpsRecord;

pub const SPS_MAX: usize = 32;
pub const PPS_MAX: usize = 256;

pub struct ParameterSetStore {
    sps_slots: Vec<Option<SpsRecord>>,
    pps_slots: Vec<Option<PpsRecord>>,
    have_any_sps: bool,
    have_any_pps: bool,
    active_sps_id: Option<u8>,

    pub log2_max_frame_num: u8,
    pub frame_mbs_only_flag: bool,
    pub pic_order_cnt_type: u8,
    pub delta_pic_order_always_zero_flag: bool,
    pub log2_max_pic_order_cnt_lsb: u8,

    pub timing_info_present: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate: bool,
    pub pic_struct_present: bool,
    pub cpb_dpb_delays_present: bool,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,

    pub pic_order_present_flag: bool,

    /// Most recent `pic_struct` value extracted from a `pic_timing` SEI.
    pub pic_struct: u8,
}

impl ParameterSetStore {
    pub fn new() -> ParameterSetStore {
        ParameterSetStore {
            sps_slots: (0..SPS_MAX).map(|_| None).collect(),
            pps_slots: (0..PPS_MAX).map(|_| None).collect(),
            have_any_sps: false,
            have_any_pps: false,
            active_sps_id: None,
            log2_max_frame_num: 0,
            frame_mbs_only_flag: true,
            pic_order_cnt_type: 0,
            delta_pic_order_always_zero_flag: false,
            log2_max_pic_order_cnt_lsb: 0,
            timing_info_present: false,
            num_units_in_tick: 0,
            time_scale: 0,
            fixed_frame_rate: false,
            pic_struct_present: false,
            cpb_dpb_delays_present: false,
            cpb_removal_delay_length_minus1: 0,
            dpb_output_delay_length_minus1: 0,
            pic_order_present_flag: false,
            pic_struct: 0,
        }
    }

    pub fn have_sps_and_pps(&self) -> bool {
        self.have_any_sps && self.have_any_pps
    }

    pub fn put_sps(&mut self, nal: Bytes) {
        match SpsRecord::parse(&nal) {
            Ok(rec) => {
                if !self.have_any_sps {
                    debug!("found SPS (sps_id={})", rec.sps_id);
                }
                self.have_any_sps = true;
                self.active_sps_id = Some(rec.sps_id);

                self.log2_max_frame_num = rec.log2_max_frame_num;
                self.frame_mbs_only_flag = rec.frame_mbs_only_flag;
                self.pic_order_cnt_type = rec.pic_order_cnt_type;
                self.delta_pic_order_always_zero_flag = rec.delta_pic_order_always_zero_flag;
                self.log2_max_pic_order_cnt_lsb = rec.log2_max_pic_order_cnt_lsb;

                if let Some(vui) = &rec.vui {
                    self.timing_info_present = vui.timing_info_present;
                    self.num_units_in_tick = vui.num_units_in_tick;
                    self.time_scale = vui.time_scale;
                    self.fixed_frame_rate = vui.fixed_frame_rate;
                    self.pic_struct_present = vui.pic_struct_present;
                    self.cpb_dpb_delays_present = vui.cpb_dpb_delays_present;
                    self.cpb_removal_delay_length_minus1 = vui.cpb_removal_delay_length_minus1;
                    self.dpb_output_delay_length_minus1 = vui.dpb_output_delay_length_minus1;
                } else {
                    self.timing_info_present = false;
                    self.time_scale = 0;
                    self.pic_struct_present = false;
                    self.cpb_dpb_delays_present = false;
                }

                let id = rec.sps_id as usize;
                self.sps_slots[id] = Some(rec);
            }
            Err(e) => warn!("invalid SPS, discarding: {}", e),
        }
    }

    pub fn put_pps(&mut self, nal: Bytes) {
        match PpsRecord::parse(&nal) {
            Ok(rec) => {
                if !self.have_any_pps {
                    debug!("found PPS (pps_id={})", rec.pps_id);
                }
                self.have_any_pps = true;
                self.pic_order_present_flag = rec.pic_order_present_flag;
                let id = rec.pps_id as usize;
                self.pps_slots[id] = Some(rec);
            }
            Err(e) => warn!("invalid PPS, discarding: {}", e),
        }
    }

    pub fn all_sps(&self) -> impl Iterator<Item = &SpsRecord> {
        self.sps_slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn all_pps(&self) -> impl Iterator<Item = &PpsRecord> {
        self.pps_slots.iter().filter_map(|p| p.as_ref())
    }

    pub fn active_sps(&self) -> Option<&SpsRecord> {
        self.active_sps_id
            .and_then(|id| self.sps_slots[id as usize].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::make_annexb_nal;

    #[test]
    fn fresh_store_has_neither_set() {
        let store = ParameterSetStore::new();
        assert!(!store.have_sps_and_pps());
        assert!(store.active_sps().is_none());
    }

    #[test]
    fn invalid_sps_is_discarded_without_panicking() {
        let mut store = ParameterSetStore::new();
        store.put_sps(make_annexb_nal(&[0x67]));
        assert!(!store.have_sps_and_pps());
    }

    #[test]
    fn sps_replacement_by_id_keeps_one_slot() {
        // Parsing the same SPS bytes twice must replace slot 0, not grow it.
        let mut store = ParameterSetStore::new();
        let nal = make_annexb_nal(&[0x67, 0x42, 0x00, 0x0a, 0x8b]);
        store.put_sps(nal.clone());
        store.put_sps(nal);
        assert!(store.sps_slots.iter().filter(|s| s.is_some()).count() <= 1);
    }
}
