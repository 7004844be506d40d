//! Wall-clock timestamps with an explicit UTC offset.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::rational::Rational;

/// An absolute instant, stored as an exact number of seconds since the
/// Unix epoch plus the UTC offset the sample was recorded under. Ordering
/// and duration arithmetic use `secs_since_epoch` only; `utc_offset_seconds`
/// is carried for display/round-trip purposes and never participates in
/// comparisons: totally ordered by `secs_since_epoch` alone.
#[derive(Clone, Copy, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Time {
    pub secs_since_epoch: Rational,
    pub utc_offset_seconds: i32,
}

impl Time {
    pub fn new(secs_since_epoch: Rational, utc_offset_seconds: i32) -> Self {
        Self {
            secs_since_epoch,
            utc_offset_seconds,
        }
    }

    pub fn epoch() -> Self {
        Self {
            secs_since_epoch: Rational::zero(),
            utc_offset_seconds: 0,
        }
    }

    /// `self + duration`, failing on overflow rather than wrapping.
    pub fn checked_add(self, duration: Rational) -> CoreResult<Self> {
        Ok(Self {
            secs_since_epoch: self.secs_since_epoch.checked_add(duration)?,
            utc_offset_seconds: self.utc_offset_seconds,
        })
    }

    /// `self - other`, as an exact duration in seconds.
    pub fn checked_sub(self, other: Self) -> CoreResult<Rational> {
        self.secs_since_epoch.checked_sub(other.secs_since_epoch)
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.secs_since_epoch == other.secs_since_epoch
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.secs_since_epoch.cmp(&other.secs_since_epoch)
    }
}
