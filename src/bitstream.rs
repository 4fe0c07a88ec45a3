//! A small, stateless RBSP bit reader built on top of the `bitreader` crate,
//! with unsigned/signed Exp-Golomb decoding (H.264 §9.1/§9.1.1) layered on
//! top. Deliberately not a dependency on an external NAL-semantics crate —
//! SPS/PPS/slice-header parsing here reads only the handful of fields this
//! crate's data model needs.

use bitreader::BitReader;
use failure::{bail, format_err, Error};

pub struct Bitstream<'a> {
    inner: BitReader<'a>,
}

impl<'a> Bitstream<'a> {
    pub fn new(data: &'a [u8]) -> Bitstream<'a> {
        Bitstream {
            inner: BitReader::new(data),
        }
    }

    pub fn read_bit(&mut self) -> Result<bool, Error> {
        self.inner
            .read_bool()
            .map_err(|e| format_err!("bit read past end of RBSP: {}", e))
    }

    pub fn read_bits(&mut self, bits: u8) -> Result<u32, Error> {
        self.inner
            .read_u32(bits)
            .map_err(|e| format_err!("bit read past end of RBSP: {}", e))
    }

    /// Unsigned Exp-Golomb code, H.264 §9.1.
    pub fn read_ue(&mut self) -> Result<u32, Error> {
        let mut leading_zero_bits: u32 = 0;
        while !self.read_bit()? {
            leading_zero_bits += 1;
            if leading_zero_bits > 31 {
                bail!("Exp-Golomb prefix longer than 31 bits");
            }
        }
        if leading_zero_bits == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zero_bits as u8)?;
        Ok((1u32 << leading_zero_bits) - 1 + suffix)
    }

    /// Signed Exp-Golomb code, H.264 §9.1.1.
    pub fn read_se(&mut self) -> Result<i32, Error> {
        let code = self.read_ue()?;
        let magnitude = ((code + 1) / 2) as i32;
        Ok(if code & 1 == 1 { magnitude } else { -magnitude })
    }
}
