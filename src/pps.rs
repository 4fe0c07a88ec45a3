//! Picture Parameter Set syntax (H.264 §7.3.2.2) — parsed only as far as
//! `bottom_field_pic_order_in_frame_present_flag`, the one field the
//! slice-header parser and AU-boundary test need (spec.md §3/§4.3).

use bytes::Bytes;
use failure::{bail, Error};

use crate::bitstream::Bitstream;
use crate::emulation::strip_emulation_prevention;

#[derive(Debug, Clone)]
pub struct PpsRecord {
    pub nal: Bytes,
    pub pps_id: u8,
    pub sps_id: u8,
    pub pic_order_present_flag: bool,
}

impl PpsRecord {
    pub fn parse(nal: &Bytes) -> Result<PpsRecord, Error> {
        if nal.len() <= 5 {
            bail!("PPS NAL too short ({} bytes)", nal.len());
        }
        let rbsp = strip_emulation_prevention(&nal[5..]);
        let mut bs = Bitstream::new(&rbsp);

        let pps_id = bs.read_ue()? as u8;
        if pps_id as usize >= crate::paramset::PPS_MAX {
            bail!("PPS id {} out of range", pps_id);
        }
        let sps_id = bs.read_ue()? as u8;
        let _entropy_coding_mode_flag = bs.read_bit()?;
        let pic_order_present_flag = bs.read_bit()?;

        Ok(PpsRecord {
            nal: nal.clone(),
            pps_id,
            sps_id,
            pic_order_present_flag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::make_annexb_nal;

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

    fn build_test_pps(pps_id: u32, sps_id: u32, pic_order_present: bool) -> Bytes {
        let mut bits = Vec::new();
        encode_ue(&mut bits, pps_id);
        encode_ue(&mut bits, sps_id);
        bits.push(false); // entropy_coding_mode_flag
        bits.push(pic_order_present);
        bits.push(true); // rbsp_stop_one_bit
        let mut nal_payload = vec![0x68];
        nal_payload.extend(bits_to_bytes(&bits));
        make_annexb_nal(&nal_payload)
    }

    #[test]
    fn parses_ids_and_pic_order_flag() {
        let nal = build_test_pps(0, 0, true);
        let pps = PpsRecord::parse(&nal).unwrap();
        assert_eq!(pps.pps_id, 0);
        assert_eq!(pps.sps_id, 0);
        assert!(pps.pic_order_present_flag);
    }

    #[test]
    fn rejects_truncated_nal() {
        let nal = make_annexb_nal(&[0x68]);
        assert!(PpsRecord::parse(&nal).is_err());
    }
}
