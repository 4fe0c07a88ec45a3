//! SEI payload walking (component C4): `pic_timing`,
//! `user_data_registered_itu_t_t35` (CEA-708/DVB1 captions) and
//! `recovery_point`. Other SEI types are skipped without being interpreted.
//!
//! The payload-type/payload-size loop below preserves the original's
//! documented `i_used + 1 < i_dec` termination check verbatim (spec.md §9,
//! first open question): a SEI message whose size field lands exactly one
//! byte before the end of the RBSP is silently dropped rather than parsed.

use crate::bitstream::Bitstream;
use crate::cc::{CcData, DVB1_DATA_START_CODE};
use crate::emulation::strip_emulation_prevention;
use crate::paramset::ParameterSetStore;

const SEI_PIC_TIMING: u32 = 1;
const SEI_USER_DATA_REGISTERED: u32 = 4;
const SEI_RECOVERY_POINT: u32 = 6;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeiEvents {
    pub pic_struct: Option<u8>,
    pub recovery_frame_cnt: Option<u32>,
}

pub fn parse_sei(frag: &[u8], store: &ParameterSetStore, cc_next: &mut CcData) -> SeiEvents {
    let mut events = SeiEvents::default();
    if frag.len() <= 5 {
        return events;
    }
    let rbsp = strip_emulation_prevention(&frag[5..]);
    let len = rbsp.len();
    let mut used = 0usize;

    while used + 1 < len {
        let mut sei_type: u32 = 0;
        while used + 1 < len {
            let byte = rbsp[used];
            used += 1;
            sei_type += byte as u32;
            if byte != 0xff {
                break;
            }
        }

        let mut size: usize = 0;
        while used + 1 < len {
            let byte = rbsp[used];
            used += 1;
            size += byte as usize;
            if byte != 0xff {
                break;
            }
        }

        if used + size + 1 > len {
            break;
        }
        let payload = &rbsp[used..used + size];

        match sei_type {
            SEI_PIC_TIMING => {
                if let Ok(pic_struct) = parse_pic_timing(payload, store) {
                    events.pic_struct = pic_struct;
                }
            }
            SEI_USER_DATA_REGISTERED => handle_user_data_registered(payload, cc_next),
            SEI_RECOVERY_POINT => {
                if let Ok(cnt) = parse_recovery_point(payload) {
                    events.recovery_frame_cnt = Some(cnt);
                }
            }
            _ => {}
        }

        used += size;
    }

    events
}

fn parse_pic_timing(
    payload: &[u8],
    store: &ParameterSetStore,
) -> Result<Option<u8>, failure::Error> {
    let mut bs = Bitstream::new(payload);
    if store.cpb_dpb_delays_present {
        bs.read_bits(store.cpb_removal_delay_length_minus1 + 1)?;
        bs.read_bits(store.dpb_output_delay_length_minus1 + 1)?;
    }
    if store.pic_struct_present {
        let pic_struct = bs.read_bits(4)? as u8;
        return Ok(Some(pic_struct));
    }
    Ok(None)
}

/// The original guards this match with `i_t35 >= 5` while comparing a
/// 7-byte prefix (`sizeof(p_dvb1_data_start_code)`); that guard is too
/// loose to be expressed as a safe slice comparison in Rust, so this
/// requires the full 7 bytes (itu_t_t35 country/provider codes plus the
/// `"GA94"` ATSC identifier) to be present before comparing, which changes
/// nothing for any payload that can actually match. The single-byte
/// `user_data_type_code` that follows is skipped too, landing `extract` at
/// the start of `cc_data()` itself.
fn handle_user_data_registered(payload: &[u8], cc_next: &mut CcData) {
    let prefix_len = DVB1_DATA_START_CODE.len() + 1;
    if payload.len() >= prefix_len && payload[..DVB1_DATA_START_CODE.len()] == DVB1_DATA_START_CODE {
        cc_next.extract(true, &payload[prefix_len..]);
    }
}

fn parse_recovery_point(payload: &[u8]) -> Result<u32, failure::Error> {
    let mut bs = Bitstream::new(payload);
    bs.read_ue()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::make_annexb_nal;

    fn sei_nal(messages: &[(u32, &[u8])]) -> bytes::Bytes {
        let mut payload = vec![0x06]; // SEI NAL header byte
        for (sei_type, data) in messages {
            payload.push(*sei_type as u8);
            payload.push(data.len() as u8);
            payload.extend_from_slice(data);
        }
        payload.push(0x80); // rbsp_trailing_bits
        make_annexb_nal(&payload)
    }

    #[test]
    fn recovery_point_extracts_ue_value() {
        // ue(2) = "011" -> padded into one byte 0b0110_0000 = 0x60.
        let nal = sei_nal(&[(SEI_RECOVERY_POINT, &[0x60])]);
        let store = ParameterSetStore::new();
        let mut cc = CcData::default();
        let events = parse_sei(&nal, &store, &mut cc);
        assert_eq!(events.recovery_frame_cnt, Some(2));
    }

    #[test]
    fn user_data_registered_feeds_cc_extract() {
        let mut t35 = DVB1_DATA_START_CODE.to_vec();
        t35.push(0x03); // user_data_type_code
        t35.push(0x40); // cc_data() header: process_cc_data_flag set, cc_count=0
        t35.push(0x00);
        let nal = sei_nal(&[(SEI_USER_DATA_REGISTERED, &t35)]);
        let store = ParameterSetStore::new();
        let mut cc = CcData::default();
        let _ = parse_sei(&nal, &store, &mut cc);
        assert!(cc.reorder);
    }

    #[test]
    fn non_matching_t35_prefix_is_ignored() {
        let nal = sei_nal(&[(SEI_USER_DATA_REGISTERED, &[0, 0, 0, 0, 0, 0, 0])]);
        let store = ParameterSetStore::new();
        let mut cc = CcData::default();
        let _ = parse_sei(&nal, &store, &mut cc);
        assert!(cc.data.is_empty());
        assert!(!cc.reorder);
    }

    #[test]
    fn empty_sei_does_not_panic() {
        let nal = make_annexb_nal(&[0x06]);
        let store = ParameterSetStore::new();
        let mut cc = CcData::default();
        let events = parse_sei(&nal, &store, &mut cc);
        assert!(events.pic_struct.is_none());
        assert!(events.recovery_frame_cnt.is_none());
    }
}
