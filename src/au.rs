//! Access Unit assembler (component C5): the per-NAL dispatch table,
//! SPS/PPS re-injection, duration computation and field-flag state machine
//! of spec.md §4.5, wired up as the `Packetizer`'s core loop. This module
//! also owns `Packetizer` itself, since the assembler is what ties the
//! other components (C1–C4, C6) together into one value.

use bytes::{Bytes, BytesMut};
use failure::{bail, Error};
use log::{debug, warn};
use smallvec::SmallVec;

use crate::annexb::Scanner;
use crate::avcc::{self, AvccSplitter};
use crate::cc::{CcBlock, CcData};
use crate::nal::{self, Fragment, NalHeader};
use crate::paramset::ParameterSetStore;
use crate::sei;
use crate::slice::{self, FrameType, SliceSummary};
use crate::sps::SpsRecord;
use crate::timestamp::{Timestamp, CLOCK_FREQ};
use crate::types::{AccessUnit, InputBlock, OpenParams, PictureFlags};

/// `pic_struct` (0..=8) to number of fields/frames it represents, Table D-1.
const NUM_CLOCK_TS: [u32; 9] = [1, 1, 1, 2, 2, 3, 3, 2, 3];

enum FramingMode {
    AnnexB,
    Avcc { length_size: u8 },
}

struct AccessUnitBuilder {
    nals: SmallVec<[Bytes; 4]>,
    has_aud: bool,
    has_slice: bool,
    has_frame_sps: bool,
    has_frame_pps: bool,
    slice: SliceSummary,
}

impl AccessUnitBuilder {
    fn new() -> AccessUnitBuilder {
        AccessUnitBuilder {
            nals: SmallVec::new(),
            has_aud: false,
            has_slice: false,
            has_frame_sps: false,
            has_frame_pps: false,
            slice: SliceSummary::initial(),
        }
    }
}

/// Turns an H.264 byte stream (Annex B or AVCC) into decoder-ready access
/// units. Single-threaded, pure value semantics: all state lives here, no
/// background work, no I/O.
pub struct Packetizer {
    framing: FramingMode,
    scanner: Scanner,
    params: ParameterSetStore,
    building: AccessUnitBuilder,

    b_header: bool,
    recovery_frames: i32,
    even_frame: bool,

    frame_pts: Timestamp,
    frame_dts: Timestamp,
    prev_pts: Timestamp,
    prev_dts: Timestamp,

    cc_pts: Timestamp,
    cc_dts: Timestamp,
    cc_flags: PictureFlags,
    cc: CcData,
    cc_next: CcData,
}

impl Packetizer {
    pub fn open(params: OpenParams) -> Result<Packetizer, Error> {
        if !params.codec_is_h264 {
            bail!("codec mismatch: this packetizer only understands H.264");
        }

        let mut pack = Packetizer {
            framing: FramingMode::AnnexB,
            scanner: Scanner::new(),
            params: ParameterSetStore::new(),
            building: AccessUnitBuilder::new(),
            b_header: false,
            recovery_frames: -1,
            even_frame: false,
            frame_pts: Timestamp::INVALID,
            frame_dts: Timestamp::INVALID,
            prev_pts: Timestamp::INVALID,
            prev_dts: Timestamp::INVALID,
            cc_pts: Timestamp::INVALID,
            cc_dts: Timestamp::INVALID,
            cc_flags: PictureFlags::default(),
            cc: CcData::default(),
            cc_next: CcData::default(),
        };

        if let Some(avcc_bytes) = params.avcc {
            let cfg = avcc::parse_avcc_config(&avcc_bytes)?;
            for sps in &cfg.sps {
                pack.params.put_sps(sps.clone());
            }
            for pps in &cfg.pps {
                pack.params.put_pps(pps.clone());
            }
            if !pack.params.have_sps_and_pps() {
                bail!("AVCC bootstrap configuration record carried no usable SPS/PPS");
            }
            pack.framing = FramingMode::Avcc {
                length_size: cfg.length_size,
            };
        } else if let Some(extra) = params.annexb_extra {
            let frags = pack.scanner.feed(&extra, Timestamp::INVALID, Timestamp::INVALID);
            for frag in frags {
                pack.on_nal(frag);
            }
            if let Some(frag) = pack.scanner.finish(Timestamp::INVALID, Timestamp::INVALID) {
                pack.on_nal(frag);
            }
            // The bootstrap blob never contains a real picture.
            pack.building = AccessUnitBuilder::new();
        }

        Ok(pack)
    }

    pub fn push(&mut self, block: InputBlock) -> Vec<AccessUnit> {
        if block.flags.discontinuity {
            self.reset(true);
        }
        match self.framing {
            FramingMode::Avcc { length_size } => {
                if block.flags.discontinuity || block.flags.corrupted {
                    return Vec::new();
                }
                self.push_avcc(&block, length_size)
            }
            FramingMode::AnnexB => self.push_annexb(&block),
        }
    }

    fn push_avcc(&mut self, block: &InputBlock, length_size: u8) -> Vec<AccessUnit> {
        let mut out = Vec::new();
        for item in AvccSplitter::new(&block.data, length_size) {
            match item {
                Ok(nal_payload) => {
                    let frag = Fragment {
                        data: nal::make_annexb_nal(nal_payload),
                        pts: block.pts,
                        dts: block.dts,
                    };
                    if let Some(au) = self.on_nal(frag) {
                        out.push(au);
                    }
                }
                Err(e) => warn!("broken frame: {}", e),
            }
        }
        out
    }

    fn push_annexb(&mut self, block: &InputBlock) -> Vec<AccessUnit> {
        let mut out = Vec::new();
        let frags = self.scanner.feed(&block.data, block.pts, block.dts);
        for frag in frags {
            if let Some(au) = self.on_nal(frag) {
                out.push(au);
            }
        }
        out
    }

    fn on_nal(&mut self, frag: Fragment) -> Option<AccessUnit> {
        let header = NalHeader::parse(frag.data[4]);
        let nal_ref_idc = header.ref_idc as i32;
        let nal_type = header.nal_type;

        if self.building.has_slice && !self.params.have_sps_and_pps() {
            warn!("waiting for SPS/PPS");
            self.building = AccessUnitBuilder::new();
            self.cc_next.clear();
        }

        let mut emitted = None;
        let mut append = true;

        if (nal::NAL_SLICE..=nal::NAL_SLICE_IDR).contains(&nal_type) {
            if !self.params.have_sps_and_pps() {
                self.building.has_slice = true;
                append = false;
            } else {
                match slice::parse_slice_header(
                    &frag.data,
                    nal_ref_idc,
                    nal_type as i32,
                    &self.params,
                    &self.building.slice,
                ) {
                    Ok((new_slice, new_picture)) => {
                        if new_picture && self.building.has_slice {
                            emitted = self.output_picture();
                        }
                        self.building.slice = new_slice;
                        self.building.has_slice = true;
                    }
                    Err(e) => {
                        warn!("invalid slice header, dropping NAL: {}", e);
                        append = false;
                    }
                }
            }
        } else if nal_type == nal::NAL_SPS {
            if self.building.has_slice {
                emitted = self.output_picture();
            }
            self.building.has_frame_sps = true;
            self.params.put_sps(frag.data.clone());
            append = false;
        } else if nal_type == nal::NAL_PPS {
            if self.building.has_slice {
                emitted = self.output_picture();
            }
            self.building.has_frame_pps = true;
            self.params.put_pps(frag.data.clone());
            append = false;
        } else if nal_type == nal::NAL_AU_DELIMITER {
            if self.building.has_slice {
                emitted = self.output_picture();
            }
            if self.building.has_aud {
                append = false;
            } else {
                self.building.has_aud = true;
            }
        } else if nal_type == nal::NAL_SEI {
            if self.building.has_slice {
                emitted = self.output_picture();
            }
            let events = sei::parse_sei(&frag.data, &self.params, &mut self.cc_next);
            if let Some(pic_struct) = events.pic_struct {
                self.params.pic_struct = pic_struct;
            }
            if let Some(cnt) = events.recovery_frame_cnt {
                if !self.b_header {
                    debug!("seen SEI recovery point, {} recovery frames", cnt);
                    if self.recovery_frames == -1 || (cnt as i32) < self.recovery_frames {
                        self.recovery_frames = cnt as i32;
                    }
                }
            }
        } else if (13..=18).contains(&nal_type) {
            if self.building.has_slice {
                emitted = self.output_picture();
            }
        }

        if append {
            self.building.nals.push(frag.data.clone());
        }

        if !self.frame_dts.is_valid() && !self.frame_pts.is_valid() {
            self.frame_dts = frag.dts;
            self.frame_pts = frag.pts;
        }

        emitted
    }

    fn output_picture(&mut self) -> Option<AccessUnit> {
        if !self.b_header && self.recovery_frames != -1 {
            if self.recovery_frames == 0 {
                debug!("recovery from SEI recovery point complete");
                self.b_header = true;
            }
            self.recovery_frames -= 1;
        }

        if !self.b_header
            && self.recovery_frames == -1
            && self.building.slice.frame_type != FrameType::I
        {
            self.building = AccessUnitBuilder::new();
            self.frame_pts = Timestamp::INVALID;
            self.frame_dts = Timestamp::INVALID;
            return None;
        }

        let frame_type = self.building.slice.frame_type;
        let sps_pps_i = frame_type == FrameType::I && self.params.have_sps_and_pps();
        let want_sps = sps_pps_i || self.building.has_frame_sps;
        let want_pps = sps_pps_i || self.building.has_frame_pps;

        let nals = std::mem::replace(&mut self.building.nals, SmallVec::new());
        let mut data = BytesMut::new();
        let mut head_idx = 0;
        if self.building.has_aud && !nals.is_empty() {
            data.extend_from_slice(&nals[0]);
            head_idx = 1;
        }
        if want_sps {
            for sps in self.params.all_sps() {
                data.extend_from_slice(&sps.nal);
            }
        }
        if want_pps {
            for pps in self.params.all_pps() {
                data.extend_from_slice(&pps.nal);
            }
        }
        if sps_pps_i {
            self.b_header = true;
        }
        for nal in nals.iter().skip(head_idx) {
            data.extend_from_slice(nal);
        }

        let mut num_clock_ts: u32 = 1;
        if !self.params.frame_mbs_only_flag && self.params.pic_struct_present {
            if let Some(n) = NUM_CLOCK_TS.get(self.params.pic_struct as usize) {
                num_clock_ts = *n;
            }
        }

        let duration = if self.params.time_scale != 0 {
            Some(
                CLOCK_FREQ * i64::from(num_clock_ts) * i64::from(self.params.num_units_in_tick)
                    / i64::from(self.params.time_scale),
            )
        } else {
            None
        };

        let mut flags = PictureFlags {
            frame_type,
            ..PictureFlags::default()
        };
        let mut pts = self.frame_pts;

        if !self.params.frame_mbs_only_flag && self.params.pic_struct_present {
            match self.params.pic_struct {
                1 | 2 => {
                    if !self.even_frame {
                        if self.params.pic_struct == 1 {
                            flags.top_field_first = true;
                        } else {
                            flags.bottom_field_first = true;
                        }
                    } else if !pts.is_valid() && self.prev_pts.is_valid() {
                        if let Some(prev) = self.prev_pts.get() {
                            pts = Timestamp::valid(prev + duration.unwrap_or(0));
                        }
                    }
                    self.even_frame = !self.even_frame;
                }
                3 => {
                    flags.top_field_first = true;
                    self.even_frame = false;
                }
                4 => {
                    flags.bottom_field_first = true;
                    self.even_frame = false;
                }
                5 => flags.top_field_first = true,
                6 => flags.bottom_field_first = true,
                _ => self.even_frame = false,
            }
        }

        let dts = self.frame_dts.inherit(self.prev_dts);
        flags.preroll = !self.b_header;

        let au = AccessUnit {
            data: data.freeze(),
            pts,
            dts,
            flags,
            duration,
        };

        self.prev_pts = au.pts;
        self.prev_dts = au.dts;
        self.frame_pts = Timestamp::INVALID;
        self.frame_dts = Timestamp::INVALID;
        self.building = AccessUnitBuilder::new();

        self.cc_pts = au.pts;
        self.cc_dts = au.dts;
        self.cc_flags = au.flags;
        self.cc = std::mem::replace(&mut self.cc_next, CcData::default());

        Some(au)
    }

    /// `broken == true` is a hard reset: the partial access unit and
    /// AUD/parameter-set-inline flags are discarded. `broken == false` is a
    /// soft reset: only timestamp-tracking state is cleared. Both preserve
    /// the parameter-set store and `b_header`/recovery-countdown state.
    pub fn reset(&mut self, broken: bool) {
        if broken {
            self.building = AccessUnitBuilder::new();
            self.scanner.reset(true);
        }
        self.frame_pts = Timestamp::INVALID;
        self.frame_dts = Timestamp::INVALID;
        self.prev_pts = Timestamp::INVALID;
        self.prev_dts = Timestamp::INVALID;
        self.even_frame = false;
    }

    /// Drains the caption side channel, reporting which of the four CEA-708
    /// channel slots have ever carried data, plus the staged payload (if
    /// any) snapshotted at the last access unit emission.
    pub fn get_cc(&mut self) -> ([bool; 4], Option<CcBlock>) {
        let present = self.cc.present;
        if self.cc.data.is_empty() {
            self.cc.clear();
            return (present, None);
        }
        let ts = if self.cc.reorder { self.cc_pts } else { self.cc_dts };
        let frame_type = if self.cc.reorder {
            self.cc_flags.frame_type
        } else {
            FrameType::P
        };
        let block = CcBlock {
            data: std::mem::take(&mut self.cc.data),
            pts: ts,
            dts: ts,
            frame_type,
        };
        self.cc.clear();
        (present, Some(block))
    }

    /// The most recently observed SPS, e.g. for a caller building its own
    /// container header without re-parsing the emitted SPS NAL.
    pub fn format(&self) -> Option<&SpsRecord> {
        self.params.active_sps()
    }
}
