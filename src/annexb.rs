//! Annex B framing: a start-code scanner that slices an arbitrary byte
//! stream into NAL fragments (component C1, Annex B mode). Bytes that
//! arrive split across calls are carried over in an internal buffer.

use bytes::{Bytes, BytesMut};

use crate::nal::{Fragment, START_CODE};
use crate::timestamp::Timestamp;

pub struct Scanner {
    buf: Vec<u8>,
}

impl Scanner {
    pub fn new() -> Scanner {
        Scanner { buf: Vec::new() }
    }

    /// `broken == true` discards whatever partial NAL is buffered (a hard
    /// resync); `broken == false` is a clean flush hint and leaves the
    /// buffer alone, since [`Scanner::feed`]/[`Scanner::finish`] already
    /// handle draining it in order.
    pub fn reset(&mut self, broken: bool) {
        if broken {
            self.buf.clear();
        }
    }

    /// Feeds `data` (with the PTS/DTS of the block it came from) and
    /// returns every NAL fully bounded by two start codes found so far.
    /// Only the first fragment produced by a given call is stamped with
    /// that call's timestamps; later fragments from the same call get
    /// [`Timestamp::INVALID`], matching the original's per-block
    /// "timestamp used" bookkeeping.
    pub fn feed(&mut self, data: &[u8], pts: Timestamp, dts: Timestamp) -> Vec<Fragment> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();

        let codes = find_start_codes(&self.buf);
        if codes.len() < 2 {
            return out;
        }

        let mut ts_pending = true;
        for w in codes.windows(2) {
            let payload_start = w[0] + 3;
            let next_code_start = w[1];
            let raw = &self.buf[payload_start..next_code_start];
            let trimmed = trim_trailing_zeros(raw);
            if trimmed.is_empty() {
                continue;
            }
            let (p, d) = if ts_pending {
                (pts, dts)
            } else {
                (Timestamp::INVALID, Timestamp::INVALID)
            };
            ts_pending = false;
            out.push(Fragment {
                data: wrap(trimmed),
                pts: p,
                dts: d,
            });
        }

        let keep_from = *codes.last().unwrap();
        self.buf.drain(0..keep_from);
        out
    }

    /// Emits whatever trailing NAL remains buffered when the caller knows
    /// no further bytes are coming for it (e.g. end of stream).
    pub fn finish(&mut self, pts: Timestamp, dts: Timestamp) -> Option<Fragment> {
        let codes = find_start_codes(&self.buf);
        let first = codes.first().copied()?;
        let payload_start = first + 3;
        let trimmed = trim_trailing_zeros(&self.buf[payload_start..]).to_vec();
        self.buf.clear();
        if trimmed.is_empty() {
            return None;
        }
        Some(Fragment {
            data: wrap(&trimmed),
            pts,
            dts,
        })
    }
}

fn wrap(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.extend_from_slice(&START_CODE);
    buf.extend_from_slice(payload);
    buf.freeze()
}

fn find_start_codes(buf: &[u8]) -> Vec<usize> {
    let mut out = Vec::new();
    if buf.len() < 3 {
        return out;
    }
    let mut i = 0;
    while i + 3 <= buf.len() {
        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            out.push(i);
            i += 3;
        } else {
            i += 1;
        }
    }
    out
}

/// Trims trailing zero bytes, keeping at least the last 5 (matches
/// `PacketizeParse`'s `while (i_buffer > 5 && ...) i_buffer--`).
fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 5 && data[end - 1] == 0 {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_splits_two_nals_in_one_call() {
        let mut scanner = Scanner::new();
        let mut input = Vec::new();
        input.extend_from_slice(&[0, 0, 0, 1, 0x67, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
        input.extend_from_slice(&[0, 0, 0, 1, 0x68, 0x11, 0x22, 0x33, 0x44, 0x55]);
        input.extend_from_slice(&[0, 0, 0, 1]); // trailing start code closes the 2nd NAL
        let frags = scanner.feed(&input, Timestamp::valid(100), Timestamp::valid(90));
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].data[4], 0x67);
        assert_eq!(frags[0].pts, Timestamp::valid(100));
        assert_eq!(frags[1].data[4], 0x68);
        assert_eq!(frags[1].pts, Timestamp::INVALID);
    }

    #[test]
    fn nal_split_across_two_feeds_is_reassembled() {
        let mut scanner = Scanner::new();
        let first = scanner.feed(
            &[0, 0, 0, 1, 0x67, 0xaa, 0xbb],
            Timestamp::valid(1),
            Timestamp::valid(1),
        );
        assert!(first.is_empty());
        let second = scanner.feed(
            &[0xcc, 0xdd, 0, 0, 0, 1],
            Timestamp::valid(2),
            Timestamp::valid(2),
        );
        assert_eq!(second.len(), 1);
        assert_eq!(&second[0].data[4..], &[0x67, 0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn broken_reset_drops_buffered_partial_nal() {
        let mut scanner = Scanner::new();
        scanner.feed(&[0, 0, 0, 1, 0x67, 0xaa], Timestamp::INVALID, Timestamp::INVALID);
        scanner.reset(true);
        let frags = scanner.feed(&[0xbb, 0, 0, 0, 1], Timestamp::INVALID, Timestamp::INVALID);
        assert!(frags.is_empty());
    }
}
