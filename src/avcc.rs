//! AVCC framing: parsing the `AVCDecoderConfigurationRecord` bootstrap
//! (ISO/IEC 14496-15) and splitting length-prefixed sample data into NAL
//! fragments (component C1, AVCC mode).

use bytes::Bytes;
use failure::{bail, Error};

use crate::nal::make_annexb_nal;

pub struct AvccConfig {
    pub length_size: u8,
    /// Bootstrap SPS/PPS, already Annex B-framed for direct feeding into the
    /// parameter-set store.
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

pub fn parse_avcc_config(extradata: &[u8]) -> Result<AvccConfig, Error> {
    if extradata.len() < 7 {
        bail!(
            "AVCC configuration record too short ({} bytes, need at least 7)",
            extradata.len()
        );
    }
    // extradata[0..4]: configurationVersion, AVCProfileIndication,
    // profile_compatibility, AVCLevelIndication.
    let mut p = 4usize;
    let length_size = (extradata[p] & 0x03) + 1;
    p += 1;

    let num_sps = (extradata[p] & 0x1f) as usize;
    p += 1;
    let mut sps = Vec::with_capacity(num_sps);
    for _ in 0..num_sps {
        if p + 2 > extradata.len() {
            bail!("AVCC SPS length prefix truncated");
        }
        let len = u16::from_be_bytes([extradata[p], extradata[p + 1]]) as usize;
        p += 2;
        if p + len > extradata.len() {
            bail!("AVCC SPS data truncated");
        }
        sps.push(make_annexb_nal(&extradata[p..p + len]));
        p += len;
    }

    if p >= extradata.len() {
        bail!("AVCC configuration record truncated before PPS count");
    }
    let num_pps = extradata[p] as usize;
    p += 1;
    let mut pps = Vec::with_capacity(num_pps);
    for _ in 0..num_pps {
        if p + 2 > extradata.len() {
            bail!("AVCC PPS length prefix truncated");
        }
        let len = u16::from_be_bytes([extradata[p], extradata[p + 1]]) as usize;
        p += 2;
        if p + len > extradata.len() {
            bail!("AVCC PPS data truncated");
        }
        pps.push(make_annexb_nal(&extradata[p..p + len]));
        p += len;
    }

    Ok(AvccConfig {
        length_size,
        sps,
        pps,
    })
}

/// Splits one AVCC-framed sample into its constituent NAL payloads (header
/// byte onward, no start code). Stops and yields a single trailing `Err` as
/// soon as a length prefix is truncated or claims more bytes than remain —
/// "abandon the rest of this block, state otherwise untouched".
pub struct AvccSplitter<'a> {
    data: &'a [u8],
    length_size: u8,
    done: bool,
}

impl<'a> AvccSplitter<'a> {
    pub fn new(data: &'a [u8], length_size: u8) -> AvccSplitter<'a> {
        AvccSplitter {
            data,
            length_size,
            done: false,
        }
    }
}

impl<'a> Iterator for AvccSplitter<'a> {
    type Item = Result<&'a [u8], Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.data.is_empty() {
            return None;
        }
        let n = self.length_size as usize;
        if self.data.len() < n {
            self.done = true;
            return Some(Err(failure::format_err!(
                "AVCC length prefix truncated ({} bytes remaining, need {})",
                self.data.len(),
                n
            )));
        }
        let mut size: i64 = 0;
        for &b in &self.data[..n] {
            size = (size << 8) | i64::from(b);
        }
        let rest = &self.data[n..];
        if size <= 0 || size as usize > rest.len() {
            self.done = true;
            return Some(Err(failure::format_err!(
                "broken frame: size {} exceeds {} remaining bytes",
                size,
                rest.len()
            )));
        }
        let size = size as usize;
        let nal = &rest[..size];
        self.data = &rest[size..];
        Some(Ok(nal))
    }
}
