//! Public value types exchanged across the packetizer's API boundary.

use bytes::Bytes;

use crate::slice::FrameType;
use crate::timestamp::Timestamp;

/// Open-time configuration (spec.md §6 "Open-time input").
pub struct OpenParams {
    /// Refused at open time if `false` — this packetizer only understands H.264.
    pub codec_is_h264: bool,
    /// `Some(record_bytes)` selects AVCC framing and supplies the
    /// `AVCDecoderConfigurationRecord` to bootstrap from; `None` selects
    /// Annex B framing.
    pub avcc: Option<Vec<u8>>,
    /// Annex B mode only: an optional Annex B-framed SPS/PPS blob to seed
    /// the parameter-set store before the first `push`.
    pub annexb_extra: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFlags {
    pub discontinuity: bool,
    pub corrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureFlags {
    pub frame_type: FrameType,
    pub top_field_first: bool,
    pub bottom_field_first: bool,
    pub preroll: bool,
}

/// One input block: contiguous bytes plus the PTS/DTS and flags that
/// accompanied it (spec.md §6 "Per-call input").
pub struct InputBlock {
    pub data: Bytes,
    pub pts: Timestamp,
    pub dts: Timestamp,
    pub flags: InputFlags,
}

/// One emitted access unit (spec.md §6 "Per-call output"): an Annex
/// B-framed byte stream (4-byte start codes throughout, including any
/// injected SPS/PPS), its timestamps, picture-type/field flags, and an
/// optional duration in microseconds.
pub struct AccessUnit {
    pub data: Bytes,
    pub pts: Timestamp,
    pub dts: Timestamp,
    pub flags: PictureFlags,
    pub duration: Option<i64>,
}
