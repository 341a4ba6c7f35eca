//! Lap validity rules
//!
//! Decides whether a finished lap is clean enough to feed the average curve.

use crate::collector::CompletedLap;
use crate::model::SurfaceClass;
use std::fmt;

/// Default minimum number of samples in a usable lap
pub const DEFAULT_MIN_LAP_SAMPLES: usize = 30;

/// Default minimum lap fraction a usable lap must reach
pub const DEFAULT_MIN_LAP_COMPLETION: f64 = 0.75;

/// Why a lap was left out of the average
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    EndedOffTrack(SurfaceClass),
    TooFewSamples { count: usize, required: usize },
    Incomplete { max_position: f64, required: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndedOffTrack(surface) => {
                write!(f, "car was in the pit lane at the line ({:?})", surface)
            }
            Self::TooFewSamples { count, required } => {
                write!(f, "not enough samples ({} < {})", count, required)
            }
            Self::Incomplete {
                max_position,
                required,
            } => write!(
                f,
                "lap not completed (reached {:.2}, need {:.2})",
                max_position, required
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LapVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl LapVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Classifies finished laps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapValidator {
    min_samples: usize,
    min_completion: f64,
}

impl Default for LapValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LAP_SAMPLES, DEFAULT_MIN_LAP_COMPLETION)
    }
}

impl LapValidator {
    pub fn new(min_samples: usize, min_completion: f64) -> Self {
        Self {
            min_samples,
            min_completion,
        }
    }

    /// First failing rule wins: end surface, sample count, completion
    pub fn judge(&self, lap: &CompletedLap) -> LapVerdict {
        if !lap.end_surface.is_on_track() {
            return LapVerdict::Rejected(RejectReason::EndedOffTrack(lap.end_surface));
        }

        let count = lap.segment.len();
        if count < self.min_samples {
            return LapVerdict::Rejected(RejectReason::TooFewSamples {
                count,
                required: self.min_samples,
            });
        }

        let max_position = lap.segment.max_position().unwrap_or(0.0);
        if max_position < self.min_completion {
            return LapVerdict::Rejected(RejectReason::Incomplete {
                max_position,
                required: self.min_completion,
            });
        }

        LapVerdict::Accepted
    }
}
