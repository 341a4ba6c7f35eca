//! Live comparison of the lap in progress against the average curve

use crate::curve::AverageCurve;
use crate::model::{LiveDelta, TelemetrySnapshot};
use crate::units::Liters;
use std::collections::VecDeque;

/// Default number of recent polls kept for rate estimation
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Recent `(exact grid index, fuel used)` pairs, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct RateHistory {
    entries: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl Default for RateHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RateHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, exact_index: f64, usage: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((exact_index, usage));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The two newest entries as `(previous, latest)`
    fn latest_pair(&self) -> Option<((f64, f64), (f64, f64))> {
        let n = self.entries.len();
        if n < 2 {
            return None;
        }
        Some((self.entries[n - 2], self.entries[n - 1]))
    }
}

/// Current consumption rate over the last two polls minus the average
/// curve's rate over the same grid span. Zero without enough history or
/// when the car did not move forward.
pub fn instantaneous_delta(history: &RateHistory, curve: &AverageCurve) -> f64 {
    let Some(((prev_index, prev_usage), (index, usage))) = history.latest_pair() else {
        return 0.0;
    };

    let index_step = index - prev_index;
    if index_step <= 0.0 {
        return 0.0;
    }
    let current_rate = (usage - prev_usage) / index_step;

    let last = curve.len() - 1;
    let mut lower = prev_index.floor().max(0.0) as usize;
    let upper = (index.floor().max(0.0) as usize).min(last);
    if lower == upper {
        lower = lower.saturating_sub(1);
    }
    let lower = lower.min(last);

    let average_rate = if upper > lower {
        (curve.consumption(upper) - curve.consumption(lower)) / (upper - lower) as f64
    } else {
        0.0
    };

    current_rate - average_rate
}

/// Produces one `LiveDelta` per poll
#[derive(Debug, Clone, Default)]
pub struct DeltaEstimator {
    history: RateHistory,
}

impl DeltaEstimator {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: RateHistory::new(history_capacity),
        }
    }

    /// Forget the rate history, e.g. at a lap boundary
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &RateHistory {
        &self.history
    }

    /// Compare the lap in progress with `curve`.
    ///
    /// Callers only invoke this while the lap is being collected and at
    /// least one lap is averaged; otherwise they emit `LiveDelta::idle`.
    pub fn estimate(
        &mut self,
        curve: &AverageCurve,
        snapshot: &TelemetrySnapshot,
        lap_start_fuel: f64,
    ) -> LiveDelta {
        let current_usage = lap_start_fuel - snapshot.fuel_remaining.0;
        let exact_index = curve.exact_index(snapshot.position_fraction);
        let average_usage = curve.interpolate(exact_index);

        self.history.push(exact_index, current_usage);

        LiveDelta {
            instantaneous_delta: instantaneous_delta(&self.history, curve),
            cumulative_delta: Liters(current_usage - average_usage),
            current_usage: Liters(current_usage),
            average_usage: Liters(average_usage),
            position_fraction: snapshot.position_fraction,
            surface: snapshot.surface,
        }
    }
}
