//! The regular sample grid shared by every modality: a start time, a
//! constant step, a sample count, and three disjoint reasons a given
//! index carries no real data.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::rational::{round_half_down, Rational};
use crate::time::Time;

/// Why a given sample index is not valid. `Valid` is implicit (the index
/// is in none of the three sets on `TimingInfo`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Valid,
    Dropped,
    Cropped,
    Blank,
}

/// Outcome of mapping a `Time` back to a sample index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeIndex {
    InRange(u64),
    OutOfRange,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TimingInfo {
    pub start: Time,
    pub step: Rational,
    pub num_samples: u64,
    dropped: BTreeSet<u64>,
    /// Closed, non-overlapping, sorted `[first, last]` ranges.
    cropped: Vec<(u64, u64)>,
    blank: BTreeSet<u64>,
}

impl TimingInfo {
    pub fn new(
        start: Time,
        step: Rational,
        num_samples: u64,
        dropped: impl IntoIterator<Item = u64>,
        cropped: impl IntoIterator<Item = (u64, u64)>,
        blank: impl IntoIterator<Item = u64>,
    ) -> CoreResult<Self> {
        if !step.is_positive() {
            return Err(CoreError::user_input("TimingInfo step must be positive"));
        }
        let dropped: BTreeSet<u64> = dropped.into_iter().collect();
        let mut cropped: Vec<(u64, u64)> = cropped.into_iter().collect();
        cropped.sort_unstable();
        let blank: BTreeSet<u64> = blank.into_iter().collect();

        let in_range = |i: u64| i < num_samples;
        if !dropped.iter().all(|&i| in_range(i)) {
            return Err(CoreError::user_input("dropped index out of range"));
        }
        if !blank.iter().all(|&i| in_range(i)) {
            return Err(CoreError::user_input("blank index out of range"));
        }
        for &(first, last) in &cropped {
            if first > last || !in_range(first) || !in_range(last) {
                return Err(CoreError::user_input("cropped range out of range"));
            }
        }
        for w in cropped.windows(2) {
            if w[0].1 >= w[1].0 {
                return Err(CoreError::user_input("cropped ranges overlap"));
            }
        }

        let cropped_set: BTreeSet<u64> = cropped
            .iter()
            .flat_map(|&(first, last)| first..=last)
            .collect();
        if dropped.intersection(&blank).next().is_some() {
            return Err(CoreError::user_input("dropped and blank sets overlap"));
        }
        if dropped.intersection(&cropped_set).next().is_some() {
            return Err(CoreError::user_input("dropped and cropped sets overlap"));
        }
        if blank.intersection(&cropped_set).next().is_some() {
            return Err(CoreError::user_input("blank and cropped sets overlap"));
        }

        Ok(Self {
            start,
            step,
            num_samples,
            dropped,
            cropped,
            blank,
        })
    }

    pub fn dropped(&self) -> &BTreeSet<u64> {
        &self.dropped
    }

    pub fn cropped(&self) -> &[(u64, u64)] {
        &self.cropped
    }

    pub fn blank(&self) -> &BTreeSet<u64> {
        &self.blank
    }

    pub fn is_in_cropped(&self, index: u64) -> bool {
        self.cropped
            .iter()
            .any(|&(first, last)| first <= index && index <= last)
    }

    pub fn kind(&self, index: u64) -> FrameKind {
        if self.dropped.contains(&index) {
            FrameKind::Dropped
        } else if self.blank.contains(&index) {
            FrameKind::Blank
        } else if self.is_in_cropped(index) {
            FrameKind::Cropped
        } else {
            FrameKind::Valid
        }
    }

    pub fn is_valid(&self, index: u64) -> bool {
        index < self.num_samples && self.kind(index) == FrameKind::Valid
    }

    /// Count of dropped + cropped + blank indices (for payload sizing).
    pub fn num_invalid(&self) -> u64 {
        let cropped_count: u64 = self
            .cropped
            .iter()
            .map(|&(first, last)| last - first + 1)
            .sum();
        self.dropped.len() as u64 + self.blank.len() as u64 + cropped_count
    }

    pub fn num_stored_samples(&self) -> u64 {
        self.num_samples - self.num_invalid()
    }

    /// Number of invalid indices strictly less than `index`, i.e. how far
    /// the stored-record offset for `index` is shifted down from `index`
    /// itself.
    pub fn preceding_invalid_count(&self, index: u64) -> u64 {
        let dropped = self.dropped.range(..index).count() as u64;
        let blank = self.blank.range(..index).count() as u64;
        let cropped: u64 = self
            .cropped
            .iter()
            .map(|&(first, last)| {
                if last < index {
                    last - first + 1
                } else if first < index {
                    index - first
                } else {
                    0
                }
            })
            .sum();
        dropped + blank + cropped
    }

    pub fn index_to_start_time(&self, index: u64) -> CoreResult<Time> {
        let offset = self.step.checked_mul_i64(index as i64)?;
        self.start.checked_add(offset)
    }

    pub fn duration(&self) -> CoreResult<Rational> {
        self.step.checked_mul_i64(self.num_samples as i64)
    }

    pub fn end(&self) -> CoreResult<Time> {
        self.start.checked_add(self.duration()?)
    }

    /// `round((t - start) / step)`, ties toward the earlier index.
    /// Results outside `[0, num_samples)` are reported as out-of-range.
    pub fn time_to_index(&self, t: Time) -> CoreResult<TimeIndex> {
        let delta = t.checked_sub(self.start)?;
        // delta / step, as an exact rational num/den.
        let num = delta.num() as i128 * self.step.den() as i128;
        let den = delta.den() as i128 * self.step.num() as i128;
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let index = round_half_down(num, den);
        if index < 0 || index as u128 >= self.num_samples as u128 {
            Ok(TimeIndex::OutOfRange)
        } else {
            Ok(TimeIndex::InRange(index as u64))
        }
    }
}
