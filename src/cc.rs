//! CEA-708/DVB1 closed-caption side channel (component C6): a staging
//! buffer filled while walking SEI payloads, snapshotted into an emit-ready
//! buffer when an access unit completes, and drained by
//! [`crate::Packetizer::get_cc`].

use crate::slice::FrameType;
use crate::timestamp::Timestamp;

/// ATSC A/53 Annex's `user_data_registered_itu_t_t35` DVB1 marker: the
/// 3-byte `itu_t_t35_country_code`/`itu_t_t35_provider_code` plus the
/// 4-byte `ATSC1_data()` identifier `"GA94"`.
pub const DVB1_DATA_START_CODE: [u8; 7] = [0xb5, 0x00, 0x31, 0x47, 0x41, 0x39, 0x34];

#[derive(Debug, Clone, Default)]
pub struct CcData {
    pub data: Vec<u8>,
    pub present: [bool; 4],
    pub reorder: bool,
}

impl CcData {
    pub fn clear(&mut self) {
        self.data.clear();
        self.present = [false; 4];
        self.reorder = false;
    }

    /// Extracts `cc_data()` triplets (ATSC A/53 §6.2.3) from a
    /// `user_data_registered_itu_t_t35` SEI payload, starting 3 bytes past
    /// its `itu_t_t35` prefix (i.e. at `ATSC1_data()`'s `user_data_type_code`
    /// onward, as the original's `cc_Extract(cc, reorder, &p_t35[3], ...)`
    /// does).
    pub fn extract(&mut self, reorder: bool, data: &[u8]) {
        if data.len() < 2 {
            return;
        }
        let header = data[0];
        let process_cc_data_flag = header & 0x40 != 0;
        if !process_cc_data_flag {
            return;
        }
        let cc_count = (header & 0x1f) as usize;
        self.reorder = reorder;

        let mut offset = 2usize;
        for _ in 0..cc_count {
            if offset + 3 > data.len() {
                break;
            }
            let marker = data[offset];
            let cc_valid = marker & 0x04 != 0;
            let cc_type = (marker & 0x03) as usize;
            if cc_valid {
                self.present[cc_type] = true;
                self.data.extend_from_slice(&data[offset..offset + 3]);
            }
            offset += 3;
        }
    }
}

#[derive(Debug, Clone)]
pub struct CcBlock {
    pub data: Vec<u8>,
    pub pts: Timestamp,
    pub dts: Timestamp,
    pub frame_type: FrameType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_skips_invalid_triplets() {
        let mut cc = CcData::default();
        // process_cc_data_flag set, cc_count=2; first triplet invalid (cc_valid=0),
        // second valid with cc_type=1.
        let payload = [0x40 | 0x02, 0x00, 0x00, 0xaa, 0xbb, 0x05, 0xcc, 0xdd];
        cc.extract(true, &payload);
        assert_eq!(cc.data, vec![0x05, 0xcc, 0xdd]);
        assert!(cc.present[1]);
        assert!(!cc.present[0]);
        assert!(cc.reorder);
    }

    #[test]
    fn extract_ignores_when_flag_clear() {
        let mut cc = CcData::default();
        cc.extract(false, &[0x02, 0x00, 0x07, 0xaa, 0xbb]);
        assert!(cc.data.is_empty());
    }

    #[test]
    fn clear_resets_everything() {
        let mut cc = CcData::default();
        cc.extract(true, &[0x41, 0x00, 0x07, 0xaa, 0xbb]);
        cc.clear();
        assert!(cc.data.is_empty());
        assert_eq!(cc.present, [false; 4]);
        assert!(!cc.reorder);
    }
}
