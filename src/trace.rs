//! Per-region time series: a dense trace on a regular grid, and a sparse
//! logical trace for irregular (GPIO/event-like) data.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::time::Time;
use crate::timing::TimingInfo;

/// A dense `f32` series over a `TimingInfo`. `values[i]` is `NaN` for
/// every non-valid `i` and is not persisted by container writers.
#[derive(Clone, Debug)]
pub struct Trace {
    timing: TimingInfo,
    values: Vec<f32>,
}

impl Trace {
    pub fn new(timing: TimingInfo, mut values: Vec<f32>) -> CoreResult<Self> {
        if values.len() as u64 != timing.num_samples {
            return Err(CoreError::user_input(
                "Trace value count does not match TimingInfo.num_samples",
            ));
        }
        for i in 0..timing.num_samples {
            if !timing.is_valid(i) {
                values[i as usize] = f32::NAN;
            }
        }
        Ok(Self { timing, values })
    }

    pub fn timing(&self) -> &TimingInfo {
        &self.timing
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, index: u64) -> Option<f32> {
        self.values.get(index as usize).copied()
    }
}

/// A sparse, irregularly-timed series, e.g. a decoded GPIO/event channel.
#[derive(Clone, Debug)]
pub struct LogicalTrace {
    name: String,
    points: Vec<(Time, f32)>,
}

impl LogicalTrace {
    pub fn new(name: impl Into<String>, mut points: Vec<(Time, f32)>) -> Self {
        points.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[(Time, f32)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
