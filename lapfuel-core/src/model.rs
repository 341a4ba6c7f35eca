//! Telemetry and event data model
//!
//! Defines the per-poll `TelemetrySnapshot` every provider produces, the
//! `SessionIdentity` a saved curve is keyed by, and the `EngineEvent`s the
//! engine hands to its presentation and persistence collaborators.

use crate::units::Liters;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulator session state
///
/// Numbering follows iRacing's `SessionState` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Invalid,
    GetInCar,
    Warmup,
    ParadeLaps,
    Racing,
    Checkered,
    CoolDown,
    Unknown(i32),
}

impl SessionState {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Invalid,
            1 => Self::GetInCar,
            2 => Self::Warmup,
            3 => Self::ParadeLaps,
            4 => Self::Racing,
            5 => Self::Checkered,
            6 => Self::CoolDown,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Invalid => 0,
            Self::GetInCar => 1,
            Self::Warmup => 2,
            Self::ParadeLaps => 3,
            Self::Racing => 4,
            Self::Checkered => 5,
            Self::CoolDown => 6,
            Self::Unknown(other) => other,
        }
    }

    /// Only a racing session feeds the fuel curve
    pub fn is_racing(self) -> bool {
        self == Self::Racing
    }
}

/// Where the car physically is, as classified by the sim
///
/// Numbering follows iRacing's `irsdk_TrkLoc`. Serialized as the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum SurfaceClass {
    NotInWorld,
    OffTrack,
    InPitStall,
    ApproachingPits,
    OnTrack,
    Other(i32),
}

impl SurfaceClass {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => Self::NotInWorld,
            0 => Self::OffTrack,
            1 => Self::InPitStall,
            2 => Self::ApproachingPits,
            3 => Self::OnTrack,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::NotInWorld => -1,
            Self::OffTrack => 0,
            Self::InPitStall => 1,
            Self::ApproachingPits => 2,
            Self::OnTrack => 3,
            Self::Other(other) => other,
        }
    }

    /// Whether samples taken here count towards a valid lap.
    ///
    /// `OffTrack` is included: the sim reports it while the car rejoins
    /// the racing surface at pit exit.
    pub fn is_on_track(self) -> bool {
        matches!(self, Self::OffTrack | Self::OnTrack)
    }
}

impl From<i32> for SurfaceClass {
    fn from(raw: i32) -> Self {
        Self::from_raw(raw)
    }
}

impl From<SurfaceClass> for i32 {
    fn from(surface: SurfaceClass) -> Self {
        surface.raw()
    }
}

/// The (track, car) pair a persisted curve belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub track_id: i64,
    pub car_id: i64,
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track={} car={}", self.track_id, self.car_id)
    }
}

/// One poll's worth of telemetry for the player's car
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub session_state: SessionState,
    pub lap_number: i32,
    pub fuel_remaining: Liters,
    /// Lap completion, 0.0 at the line to 1.0 just before it
    pub position_fraction: f64,
    pub surface: SurfaceClass,
}

impl TelemetrySnapshot {
    /// Reject readings a provider should never hand out
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.fuel_remaining.0.is_finite() {
            anyhow::bail!("fuel level is not finite: {}", self.fuel_remaining.0);
        }
        if !self.position_fraction.is_finite() {
            anyhow::bail!("lap position is not finite: {}", self.position_fraction);
        }
        Ok(())
    }
}

/// Live readout for the lap in progress, emitted once per poll
///
/// All fuel values go out at full precision, so
/// `cumulative_delta == current_usage - average_usage` holds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveDelta {
    /// Current consumption rate minus the average rate, liters per grid step
    pub instantaneous_delta: f64,
    /// Fuel used so far this lap minus the average at this position
    #[serde(serialize_with = "crate::units::unrounded_liters")]
    pub cumulative_delta: Liters,
    #[serde(serialize_with = "crate::units::unrounded_liters")]
    pub current_usage: Liters,
    #[serde(serialize_with = "crate::units::unrounded_liters")]
    pub average_usage: Liters,
    pub position_fraction: f64,
    pub surface: SurfaceClass,
}

impl LiveDelta {
    /// A readout with nothing to compare against
    pub fn idle(position_fraction: f64, surface: SurfaceClass) -> Self {
        Self {
            instantaneous_delta: 0.0,
            cumulative_delta: Liters(0.0),
            current_usage: Liters(0.0),
            average_usage: Liters(0.0),
            position_fraction,
            surface,
        }
    }
}

/// Notifications emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionConnected {
        identity: SessionIdentity,
        array_length: usize,
    },
    SessionDisconnected,
    CurveUpdated {
        collected_laps: u32,
    },
    LiveDelta(LiveDelta),
}

impl EngineEvent {
    /// Stable name used for filtering and logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionConnected { .. } => "session_connected",
            Self::SessionDisconnected => "session_disconnected",
            Self::CurveUpdated { .. } => "curve_updated",
            Self::LiveDelta(_) => "live_delta",
        }
    }
}
