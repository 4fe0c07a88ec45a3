//! An H.264/AVC Annex B and AVCC access unit packetizer: turns an
//! elementary byte stream (or length-prefixed samples plus an
//! `AVCDecoderConfigurationRecord`) into complete, decoder-ready access
//! units with inherited timestamps, picture-type/field flags, computed
//! durations and a CEA-708/DVB1 closed-caption side channel.

mod annexb;
mod au;
mod avcc;
mod bitstream;
mod cc;
mod emulation;
mod nal;
mod paramset;
mod pps;
mod sei;
mod slice;
mod sps;
mod timestamp;
mod types;

pub use au::Packetizer;
pub use cc::CcBlock;
pub use slice::FrameType;
pub use sps::SpsRecord;
pub use timestamp::Timestamp;
pub use types::{AccessUnit, InputBlock, InputFlags, OpenParams, PictureFlags};
