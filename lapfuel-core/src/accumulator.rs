//! Running average of accepted laps

use crate::curve::{AverageCurve, CurveError, MIN_GRID_LENGTH};
use tracing::info;

/// Owns the average curve and the number of laps folded into it
#[derive(Debug, Clone, PartialEq)]
pub struct CurveAccumulator {
    curve: AverageCurve,
    collected_laps: u32,
}

impl Default for CurveAccumulator {
    fn default() -> Self {
        Self::empty(MIN_GRID_LENGTH)
    }
}

impl CurveAccumulator {
    /// A zero curve of `grid_len` points with no laps collected
    pub fn empty(grid_len: usize) -> Self {
        Self {
            curve: AverageCurve::zeroed(grid_len),
            collected_laps: 0,
        }
    }

    /// Switch to a new grid size; returns true if state was discarded
    pub fn resize(&mut self, grid_len: usize) -> bool {
        if grid_len == self.curve.len() {
            return false;
        }
        info!(
            "Grid size changed {} -> {}, discarding average curve",
            self.curve.len(),
            grid_len
        );
        *self = Self::empty(grid_len);
        true
    }

    /// Drop all collected laps, keeping the grid size
    pub fn reset(&mut self) {
        *self = Self::empty(self.curve.len());
    }

    /// Adopt a previously saved curve
    pub fn restore(&mut self, curve: AverageCurve, collected_laps: u32) -> Result<(), CurveError> {
        if curve.len() != self.curve.len() {
            return Err(CurveError::LengthMismatch {
                expected: self.curve.len(),
                actual: curve.len(),
            });
        }
        self.curve = curve;
        self.collected_laps = collected_laps;
        Ok(())
    }

    /// Fold a resampled lap into the average and return the new lap count.
    ///
    /// The first lap is taken as-is; every later lap is averaged 50/50 with
    /// the current curve, so older laps decay geometrically.
    pub fn merge(&mut self, lap: AverageCurve) -> Result<u32, CurveError> {
        if self.collected_laps == 0 {
            if lap.len() != self.curve.len() {
                return Err(CurveError::LengthMismatch {
                    expected: self.curve.len(),
                    actual: lap.len(),
                });
            }
            self.curve = lap;
        } else {
            self.curve.blend(&lap)?;
        }
        self.collected_laps += 1;
        Ok(self.collected_laps)
    }

    pub fn curve(&self) -> &AverageCurve {
        &self.curve
    }

    pub fn collected_laps(&self) -> u32 {
        self.collected_laps
    }

    pub fn grid_len(&self) -> usize {
        self.curve.len()
    }
}
