//! Presentation/decode timestamps, in microseconds.
//!
//! `spec.md` fixes the clock frequency used by duration computation at
//! `CLOCK_FREQ = 1_000_000`; a [`Timestamp`] is simply an optional tick count
//! at that frequency, with `None` standing in for the original's
//! `VLC_TS_INVALID` sentinel.

pub const CLOCK_FREQ: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp(Option<i64>);

impl Timestamp {
    pub const INVALID: Timestamp = Timestamp(None);

    pub fn valid(value: i64) -> Timestamp {
        Timestamp(Some(value))
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<i64> {
        self.0
    }

    /// Returns `self` if valid, otherwise `prev` — the DTS-inheritance rule
    /// of spec.md §3.
    pub fn inherit(self, prev: Timestamp) -> Timestamp {
        if self.is_valid() {
            self
        } else {
            prev
        }
    }
}

impl From<Option<i64>> for Timestamp {
    fn from(value: Option<i64>) -> Timestamp {
        Timestamp(value)
    }
}
