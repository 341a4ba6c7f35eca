//! Nearest-neighbour resampling of a lap onto the curve grid

use crate::collector::{LapSample, LapSegment};
use crate::curve::{AverageCurve, CurveError};

/// Map a lap's samples onto an evenly spaced grid of `grid_len` points.
///
/// Samples are sorted by position (stable, so equal positions keep arrival
/// order) and each grid point takes the fuel value of the closest sample.
/// On a distance tie the sample earlier in sorted order wins. Grid points
/// outside the covered range clamp to the nearest end sample.
pub fn resample(segment: &LapSegment, grid_len: usize) -> Result<AverageCurve, CurveError> {
    if grid_len < 2 {
        return Err(CurveError::TooShort(grid_len));
    }
    if segment.is_empty() {
        return Err(CurveError::TooShort(0));
    }

    let mut sorted: Vec<LapSample> = segment.samples().to_vec();
    sorted.sort_by(|a, b| a.position.total_cmp(&b.position));

    let last = (grid_len - 1) as f64;
    let values = (0..grid_len)
        .map(|i| sorted[nearest(&sorted, i as f64 / last)].fuel_used)
        .collect();

    AverageCurve::from_consumption(values)
}

/// Index of the first sample closest to `target` in a position-sorted slice
fn nearest(sorted: &[LapSample], target: f64) -> usize {
    // First sample at or beyond the target
    let right = sorted.partition_point(|s| s.position < target);
    if right == 0 {
        return 0;
    }
    if right == sorted.len() {
        return first_with_position(sorted, sorted[right - 1].position);
    }

    let left = first_with_position(sorted, sorted[right - 1].position);
    let left_distance = (sorted[left].position - target).abs();
    let right_distance = (sorted[right].position - target).abs();
    if left_distance <= right_distance {
        left
    } else {
        right
    }
}

/// First index holding exactly `position`; duplicates tie on distance
fn first_with_position(sorted: &[LapSample], position: f64) -> usize {
    sorted.partition_point(|s| s.position < position)
}
