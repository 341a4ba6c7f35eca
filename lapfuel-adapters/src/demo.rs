//! Demo provider that generates synthetic race telemetry
//!
//! Simulates laps around a circuit with straights, braking zones, corners,
//! and acceleration phases. Fuel burn follows the throttle trace, so every
//! lap produces a realistic-looking consumption curve. Time advances by a
//! fixed step on each `refresh`, which keeps the output deterministic.

use anyhow::{bail, Result};
use lapfuel_core::{
    adapter::TelemetryProvider,
    model::{SessionState, SurfaceClass},
    units::{Kilometers, Liters},
};
use tracing::debug;

pub const DEMO_TRACK_ID: i64 = 9001;
pub const DEMO_CAR_ID: i64 = 42;
pub const DEMO_TRACK_LENGTH: Kilometers = Kilometers(4.5);

const FUEL_CAPACITY: f64 = 60.0;
/// Liters per second at closed and full throttle
const IDLE_BURN: f64 = 0.008;
const FULL_THROTTLE_BURN: f64 = 0.055;

/// Lap fraction after which the car heads down the pit lane on a pit lap
const PIT_ENTRY: f64 = 0.92;
/// Lap fraction the pit stop lasts into the following lap
const PIT_EXIT: f64 = 0.06;

// =============================================================================
// Track definition: a sequence of segments that form a lap
// =============================================================================

#[derive(Clone, Copy)]
enum SegmentKind {
    Straight,
    Braking,
    Corner,
    Accel,
}

#[derive(Clone, Copy)]
struct TrackSegment {
    kind: SegmentKind,
    duration: f64, // seconds at representative pace
}

const fn seg(kind: SegmentKind, duration: f64) -> TrackSegment {
    TrackSegment { kind, duration }
}

/// A simple circuit: 84s lap, mix of corners and straights
const DEMO_TRACK: [TrackSegment; 21] = [
    // Start/finish straight
    seg(SegmentKind::Straight, 8.0),
    // T1: heavy braking into slow right-hander
    seg(SegmentKind::Braking, 3.0),
    seg(SegmentKind::Corner, 4.0),
    seg(SegmentKind::Accel, 3.5),
    seg(SegmentKind::Straight, 4.0),
    // T2: fast left-hander
    seg(SegmentKind::Braking, 2.0),
    seg(SegmentKind::Corner, 3.5),
    seg(SegmentKind::Accel, 3.0),
    // Back straight
    seg(SegmentKind::Straight, 10.0),
    // T3: chicane
    seg(SegmentKind::Braking, 2.5),
    seg(SegmentKind::Corner, 2.0),
    seg(SegmentKind::Corner, 2.0),
    seg(SegmentKind::Accel, 3.0),
    seg(SegmentKind::Straight, 6.0),
    // T4: long sweeping right
    seg(SegmentKind::Braking, 1.5),
    seg(SegmentKind::Corner, 5.0),
    seg(SegmentKind::Accel, 3.0),
    // T5: tight hairpin left
    seg(SegmentKind::Braking, 3.5),
    seg(SegmentKind::Corner, 4.5),
    seg(SegmentKind::Accel, 4.0),
    // Run to start/finish
    seg(SegmentKind::Straight, 6.0),
];

fn lap_duration() -> f64 {
    DEMO_TRACK.iter().map(|s| s.duration).sum()
}

/// Throttle position for a point in the lap
fn throttle_at(lap_time: f64) -> f64 {
    let mut elapsed = 0.0;
    for segment in DEMO_TRACK.iter() {
        if lap_time < elapsed + segment.duration {
            let t = ((lap_time - elapsed) / segment.duration).clamp(0.0, 1.0);
            return match segment.kind {
                SegmentKind::Straight => 0.95 + 0.05 * (1.0 - t), // slight lift approaching end
                SegmentKind::Braking => 0.0,
                SegmentKind::Corner => 0.2 + 0.3 * t,
                SegmentKind::Accel => 0.5 + 0.5 * smoothstep(t),
            };
        }
        elapsed += segment.duration;
    }
    1.0
}

fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Simple deterministic noise from a seed
fn noise(seed: f64) -> f64 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f64, amplitude: f64) -> f64 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

// =============================================================================
// DemoProvider
// =============================================================================

pub struct DemoProvider {
    active: bool,
    connected: bool,
    time_step: f64,
    elapsed: f64,
    lap_duration: f64,
    fuel: f64,
    pit_lap: Option<i32>,
    session_state: SessionState,
}

impl DemoProvider {
    pub fn new() -> Self {
        Self {
            active: false,
            connected: true,
            time_step: 1.0 / 60.0,
            elapsed: 0.0,
            lap_duration: lap_duration(),
            fuel: FUEL_CAPACITY,
            pit_lap: None,
            session_state: SessionState::Racing,
        }
    }

    /// Simulated seconds per `refresh`
    pub fn with_time_step(mut self, seconds: f64) -> Self {
        self.time_step = seconds;
        self
    }

    /// Enter the pits at the end of `lap`; the stop runs into the next lap
    pub fn with_pit_lap(mut self, lap: i32) -> Self {
        self.pit_lap = Some(lap);
        self
    }

    pub fn set_session_state(&mut self, state: SessionState) {
        self.session_state = state;
    }

    /// Simulate the sim going away (or coming back)
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Simulated seconds for one lap
    pub fn lap_time(&self) -> f64 {
        self.lap_duration
    }

    fn lap(&self) -> i32 {
        (self.elapsed / self.lap_duration) as i32 + 1
    }

    fn position(&self) -> f64 {
        (self.elapsed % self.lap_duration) / self.lap_duration
    }

    fn surface(&self) -> SurfaceClass {
        let Some(pit_lap) = self.pit_lap else {
            return SurfaceClass::OnTrack;
        };
        let lap = self.lap();
        let position = self.position();
        if lap == pit_lap && position >= PIT_ENTRY {
            SurfaceClass::ApproachingPits
        } else if lap == pit_lap + 1 && position < PIT_EXIT {
            SurfaceClass::InPitStall
        } else {
            SurfaceClass::OnTrack
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.active {
            bail!("demo provider not started");
        }
        Ok(())
    }
}

impl Default for DemoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryProvider for DemoProvider {
    fn name(&self) -> &str {
        "Demo"
    }

    fn start(&mut self) -> Result<()> {
        if !self.connected {
            bail!("demo session disconnected");
        }
        if !self.active {
            self.active = true;
            debug!("Demo session started");
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.active && self.connected
    }

    fn is_initialized(&self) -> bool {
        self.active && self.connected
    }

    fn refresh(&mut self) -> Result<()> {
        self.ensure_active()?;

        let lap_time = self.elapsed % self.lap_duration;
        let lap_factor = 1.0 + jitter(self.lap() as f64, 0.02);
        let burn = IDLE_BURN + (FULL_THROTTLE_BURN - IDLE_BURN) * throttle_at(lap_time);
        self.fuel = (self.fuel - burn * lap_factor * self.time_step).max(0.0);
        self.elapsed += self.time_step;

        if self.surface() == SurfaceClass::InPitStall {
            self.fuel = FUEL_CAPACITY;
        }
        Ok(())
    }

    fn session_state(&self) -> Result<SessionState> {
        self.ensure_active()?;
        Ok(self.session_state)
    }

    fn lap_number(&self) -> Result<i32> {
        self.ensure_active()?;
        Ok(self.lap())
    }

    fn fuel_remaining(&self) -> Result<Liters> {
        self.ensure_active()?;
        Ok(Liters(self.fuel))
    }

    fn position_fraction(&self) -> Result<f64> {
        self.ensure_active()?;
        Ok(self.position())
    }

    fn driver_car_index(&self) -> Result<usize> {
        Ok(0)
    }

    fn surface_class(&self, _driver_index: usize) -> Result<SurfaceClass> {
        self.ensure_active()?;
        Ok(self.surface())
    }

    fn track_length(&self) -> Result<Kilometers> {
        Ok(DEMO_TRACK_LENGTH)
    }

    fn track_id(&self) -> Result<i64> {
        Ok(DEMO_TRACK_ID)
    }

    fn car_id(&self, _driver_index: usize) -> Result<i64> {
        Ok(DEMO_CAR_ID)
    }
}
