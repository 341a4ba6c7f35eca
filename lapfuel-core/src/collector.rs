//! Lap segment collection
//!
//! Watches the per-poll telemetry for lap boundaries and gathers
//! `(position, fuel used)` samples for the lap in progress. A lap that
//! starts in the pits, or visits them at any point, is marked invalid
//! and collects nothing until the lap number changes.

use crate::model::{SurfaceClass, TelemetrySnapshot};
use serde::Serialize;
use tracing::{debug, info};

/// Whether samples of the current lap are being kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectionState {
    Active,
    Suspended,
}

/// One collected sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapSample {
    pub position: f64,
    pub fuel_used: f64,
}

/// Samples of one lap in arrival order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LapSegment {
    samples: Vec<LapSample>,
}

impl LapSegment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, position: f64, fuel_used: f64) {
        self.samples.push(LapSample {
            position,
            fuel_used,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[LapSample] {
        &self.samples
    }

    /// Furthest lap fraction reached, if any sample was taken
    pub fn max_position(&self) -> Option<f64> {
        self.samples
            .iter()
            .map(|s| s.position)
            .fold(None, |acc, p| Some(acc.map_or(p, |m: f64| m.max(p))))
    }
}

impl FromIterator<(f64, f64)> for LapSegment {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let mut segment = Self::new();
        for (position, fuel_used) in iter {
            segment.push(position, fuel_used);
        }
        segment
    }
}

/// A lap whose boundary was just crossed while collection was active
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedLap {
    pub lap: i32,
    pub segment: LapSegment,
    /// Surface the car was on when the boundary was observed
    pub end_surface: SurfaceClass,
}

/// Tracks lap boundaries and gathers samples for the lap in progress
#[derive(Debug, Clone)]
pub struct LapCollector {
    current_lap: Option<i32>,
    lap_start_fuel: f64,
    state: CollectionState,
    invalid_lap: Option<i32>,
    segment: LapSegment,
}

impl Default for LapCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl LapCollector {
    pub fn new() -> Self {
        Self {
            current_lap: None,
            lap_start_fuel: 0.0,
            state: CollectionState::Suspended,
            invalid_lap: None,
            segment: LapSegment::new(),
        }
    }

    /// Forget everything and wait for the next lap boundary.
    ///
    /// `lap` is the lap the car is on right now; that lap is never collected
    /// because its start was not observed.
    pub fn reset(&mut self, lap: Option<i32>) {
        *self = Self::new();
        self.current_lap = lap;
    }

    /// Feed one poll. Returns the finished lap when a boundary was crossed.
    pub fn observe(&mut self, snapshot: &TelemetrySnapshot) -> Option<CompletedLap> {
        if !snapshot.session_state.is_racing() {
            if self.state == CollectionState::Active {
                info!(
                    "Session not racing ({:?}), suspending fuel collection",
                    snapshot.session_state
                );
                self.state = CollectionState::Suspended;
                self.segment.clear();
            }
            return None;
        }

        let lap = snapshot.lap_number;
        let fuel = snapshot.fuel_remaining.0;
        let on_track = snapshot.surface.is_on_track();
        let mut completed = None;

        match self.current_lap {
            None => {
                debug!("Adopting lap {} without collecting", lap);
                self.current_lap = Some(lap);
                self.lap_start_fuel = fuel;
            }
            Some(previous) if previous != lap => {
                if self.state == CollectionState::Active && !self.segment.is_empty() {
                    completed = Some(CompletedLap {
                        lap: previous,
                        segment: std::mem::take(&mut self.segment),
                        end_surface: snapshot.surface,
                    });
                }
                self.begin_lap(lap, fuel, snapshot.surface);
            }
            Some(_) => {}
        }

        if !on_track {
            if self.invalid_lap != Some(lap) {
                info!(
                    "Pit lane detected ({:?}), discarding fuel data for lap {}",
                    snapshot.surface, lap
                );
                self.invalid_lap = Some(lap);
            }
            self.state = CollectionState::Suspended;
            self.segment.clear();
            return completed;
        }

        if self.is_collecting(lap) {
            self.segment
                .push(snapshot.position_fraction, self.lap_start_fuel - fuel);
        }

        completed
    }

    fn begin_lap(&mut self, lap: i32, fuel: f64, surface: SurfaceClass) {
        self.current_lap = Some(lap);
        self.lap_start_fuel = fuel;
        self.segment.clear();

        if surface.is_on_track() {
            self.invalid_lap = None;
            self.state = CollectionState::Active;
        } else {
            info!("Lap {} starts in the pits ({:?}), not collecting", lap, surface);
            self.invalid_lap = Some(lap);
            self.state = CollectionState::Suspended;
        }
    }

    /// Whether samples for `lap` are currently being kept
    pub fn is_collecting(&self, lap: i32) -> bool {
        self.state == CollectionState::Active && self.invalid_lap != Some(lap)
    }

    pub fn state(&self) -> CollectionState {
        self.state
    }

    pub fn current_lap(&self) -> Option<i32> {
        self.current_lap
    }

    pub fn invalid_lap(&self) -> Option<i32> {
        self.invalid_lap
    }

    pub fn lap_start_fuel(&self) -> f64 {
        self.lap_start_fuel
    }

    pub fn segment(&self) -> &LapSegment {
        &self.segment
    }
}
