//! Fuel consumption curve on a fixed lap-position grid
//!
//! A curve holds N points at evenly spaced lap fractions `i / (N-1)`.
//! Each point stores the fuel used since the start of the lap when the car
//! reaches that fraction, so the values rise monotonically over a clean lap.

use crate::units::Kilometers;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Smallest grid used regardless of track length
pub const MIN_GRID_LENGTH: usize = 100;

/// Grid density per kilometer of track
pub const GRID_POINTS_PER_KM: f64 = 500.0;

/// Longest track length accepted from a sim; anything above is a corrupt read
pub const MAX_TRACK_LENGTH_KM: f64 = 100.0;

/// Grid size for a track: `max(100, floor(km * 500))`
///
/// Lengths above [`MAX_TRACK_LENGTH_KM`] fall back to [`MIN_GRID_LENGTH`].
pub fn grid_length(track_length: Kilometers) -> usize {
    if track_length.0 > MAX_TRACK_LENGTH_KM {
        warn!(
            "Implausible track length {} km, using minimum grid size",
            track_length.0
        );
        return MIN_GRID_LENGTH;
    }
    let points = (track_length.0 * GRID_POINTS_PER_KM).floor();
    if points.is_finite() && points > MIN_GRID_LENGTH as f64 {
        points as usize
    } else {
        MIN_GRID_LENGTH
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    #[error("curve needs at least 2 points, got {0}")]
    TooShort(usize),

    #[error("curve length mismatch: expected {expected} points, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("non-finite consumption at grid index {0}")]
    NonFinite(usize),
}

/// One grid point of a curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    pub position: f64,
    pub consumption: f64,
}

/// Consumption values on an evenly spaced lap-fraction grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageCurve {
    points: Vec<GridPoint>,
}

impl AverageCurve {
    /// An all-zero curve with `len` points (at least 2)
    pub fn zeroed(len: usize) -> Self {
        let last = (len.max(2) - 1) as f64;
        let points = (0..len.max(2))
            .map(|i| GridPoint {
                position: i as f64 / last,
                consumption: 0.0,
            })
            .collect();
        Self { points }
    }

    /// Build a curve from per-index consumption values
    pub fn from_consumption(values: Vec<f64>) -> Result<Self, CurveError> {
        let len = values.len();
        if len < 2 {
            return Err(CurveError::TooShort(len));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(CurveError::NonFinite(i));
        }

        let last = (len - 1) as f64;
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, consumption)| GridPoint {
                position: i as f64 / last,
                consumption,
            })
            .collect();
        Ok(Self { points })
    }

    /// Rebuild a curve from stored `[position, consumption]` pairs.
    ///
    /// Positions are regenerated from the grid rather than trusted.
    pub fn from_pairs(pairs: &[[f64; 2]]) -> Result<Self, CurveError> {
        Self::from_consumption(pairs.iter().map(|p| p[1]).collect())
    }

    pub fn to_pairs(&self) -> Vec<[f64; 2]> {
        self.points
            .iter()
            .map(|p| [p.position, p.consumption])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    /// Consumption at a grid index, clamped to the last point
    pub fn consumption(&self, index: usize) -> f64 {
        let index = index.min(self.points.len() - 1);
        self.points[index].consumption
    }

    /// Fractional grid index for a lap position, clamped to `[0, N-1]`
    pub fn exact_index(&self, position_fraction: f64) -> f64 {
        let last = (self.points.len() - 1) as f64;
        (position_fraction * last).clamp(0.0, last)
    }

    /// Linear interpolation between the two grid points around `exact_index`
    pub fn interpolate(&self, exact_index: f64) -> f64 {
        let last = self.points.len() - 1;
        let exact_index = exact_index.clamp(0.0, last as f64);
        let lower = exact_index.floor() as usize;
        let upper = (lower + 1).min(last);
        let fraction = exact_index - lower as f64;

        let lower_value = self.points[lower].consumption;
        let upper_value = self.points[upper].consumption;
        lower_value + fraction * (upper_value - lower_value)
    }

    /// Replace each value with the mean of itself and `other`'s value
    pub fn blend(&mut self, other: &AverageCurve) -> Result<(), CurveError> {
        if other.len() != self.len() {
            return Err(CurveError::LengthMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        for (mine, theirs) in self.points.iter_mut().zip(&other.points) {
            mine.consumption = (mine.consumption + theirs.consumption) / 2.0;
        }
        Ok(())
    }

    /// Summary figures for status reporting
    pub fn stats(&self) -> CurveStats {
        let values = || self.points.iter().map(|p| p.consumption);
        let len = self.points.len();

        let max = values().fold(f64::MIN, f64::max);
        let min = values().fold(f64::MAX, f64::min).max(0.0);
        let mean = values().sum::<f64>() / len as f64;

        let quarter_points = [0.25, 0.5, 0.75]
            .iter()
            .map(|q| ((len as f64 * q) as usize).saturating_sub(1))
            .chain(std::iter::once(len - 1))
            .map(|i| self.points[i])
            .collect();

        CurveStats {
            lap_total: self.points[len - 1].consumption,
            mean,
            max,
            min,
            quarter_points,
        }
    }
}

/// Summary of a curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveStats {
    /// Fuel used over a whole average lap
    pub lap_total: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Points at 25%, 50%, 75% and 100% of the grid
    pub quarter_points: Vec<GridPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, step: f64) -> AverageCurve {
        AverageCurve::from_consumption((0..len).map(|i| i as f64 * step).collect()).unwrap()
    }

    #[test]
    fn test_grid_length_minimum() {
        assert_eq!(grid_length(Kilometers(0.0)), 100);
        assert_eq!(grid_length(Kilometers(0.19)), 100);
        assert_eq!(grid_length(Kilometers(f64::NAN)), 100);
        assert_eq!(grid_length(Kilometers(-3.0)), 100);
    }

    #[test]
    fn test_grid_length_rejects_implausible_tracks() {
        assert_eq!(grid_length(Kilometers(100.0)), 50_000);
        assert_eq!(grid_length(Kilometers(100.5)), 100);
        assert_eq!(grid_length(Kilometers(f64::INFINITY)), 100);

        let corrupt = Kilometers::parse("1e300 km").unwrap();
        let len = grid_length(corrupt);
        assert_eq!(len, MIN_GRID_LENGTH);
        assert_eq!(AverageCurve::zeroed(len).len(), 100);
    }

    #[test]
    fn test_grid_length_scales_with_track() {
        assert_eq!(grid_length(Kilometers(4.28)), 2140);
        assert_eq!(grid_length(Kilometers(5.513)), 2756);
        assert_eq!(grid_length(Kilometers(0.2)), 100);
    }

    #[test]
    fn test_grid_positions_evenly_spaced() {
        for len in [100, 257, 2140] {
            let curve = AverageCurve::zeroed(len);
            assert_eq!(curve.len(), len);
            for (i, point) in curve.points().iter().enumerate() {
                assert_eq!(point.position, i as f64 / (len - 1) as f64);
            }
            assert!(curve.points().windows(2).all(|w| w[0].position < w[1].position));
            assert_eq!(curve.points()[len - 1].position, 1.0);
        }
    }

    #[test]
    fn test_from_consumption_rejects_bad_input() {
        assert_eq!(AverageCurve::from_consumption(vec![1.0]), Err(CurveError::TooShort(1)));
        assert_eq!(
            AverageCurve::from_consumption(vec![0.0, f64::INFINITY, 1.0]),
            Err(CurveError::NonFinite(1))
        );
    }

    #[test]
    fn test_interpolate_between_neighbours() {
        let curve = ramp(100, 0.02);
        assert!((curve.interpolate(10.0) - 0.2).abs() < 1e-12);
        assert!((curve.interpolate(10.5) - 0.21).abs() < 1e-12);
        assert!((curve.interpolate(99.0) - 1.98).abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_stays_within_neighbour_bounds() {
        let values: Vec<f64> = (0..100).map(|i| ((i * 37) % 11) as f64 * 0.1).collect();
        let curve = AverageCurve::from_consumption(values).unwrap();
        for step in 0..=1000 {
            let p = step as f64 / 1000.0;
            let exact = curve.exact_index(p);
            let a = curve.consumption(exact.floor() as usize);
            let b = curve.consumption(exact.ceil() as usize);
            let v = curve.interpolate(exact);
            assert!(v >= a.min(b) - 1e-12 && v <= a.max(b) + 1e-12, "p={p} v={v}");
        }
    }

    #[test]
    fn test_exact_index_clamps_out_of_range_positions() {
        let curve = ramp(100, 0.02);
        assert_eq!(curve.exact_index(-0.1), 0.0);
        assert_eq!(curve.exact_index(1.2), 99.0);
        assert!((curve.exact_index(0.5) - 49.5).abs() < 1e-12);
    }

    #[test]
    fn test_blend_is_elementwise_mean() {
        let mut a = ramp(100, 0.02);
        let b = ramp(100, 0.04);
        a.blend(&b).unwrap();
        for (i, p) in a.points().iter().enumerate() {
            assert!((p.consumption - i as f64 * 0.03).abs() < 1e-12);
        }
    }

    #[test]
    fn test_blend_rejects_length_mismatch() {
        let mut a = ramp(100, 0.02);
        let b = ramp(120, 0.02);
        assert_eq!(
            a.blend(&b),
            Err(CurveError::LengthMismatch { expected: 100, actual: 120 })
        );
    }

    #[test]
    fn test_pairs_round_trip() {
        let curve = ramp(150, 0.013);
        let rebuilt = AverageCurve::from_pairs(&curve.to_pairs()).unwrap();
        assert_eq!(rebuilt, curve);
    }

    #[test]
    fn test_stats_quarter_points() {
        let curve = ramp(100, 0.02);
        let stats = curve.stats();
        assert!((stats.lap_total - 1.98).abs() < 1e-12);
        assert!((stats.max - 1.98).abs() < 1e-12);
        assert_eq!(stats.min, 0.0);
        assert!((stats.mean - 0.99).abs() < 1e-12);
        let indices: Vec<f64> = stats.quarter_points.iter().map(|p| p.position * 99.0).collect();
        let expected = [24.0, 49.0, 74.0, 99.0];
        for (got, want) in indices.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9);
        }
    }
}
