//! Integration tests for FuelEngine driven by a scripted provider

use anyhow::{bail, Result};
use lapfuel_core::{
    AverageCurve, EngineEvent, EngineSettings, FuelEngine, Kilometers, Liters, MemoryStore,
    SessionIdentity, SessionState, StoredCurve, SurfaceClass, TelemetryProvider,
};

const IDENTITY: SessionIdentity = SessionIdentity {
    track_id: 219,
    car_id: 123,
};

/// Provider whose readings are set directly by the test
struct ScriptedProvider {
    connected: bool,
    track_length: Kilometers,
    identity: SessionIdentity,
    session_state: SessionState,
    lap: i32,
    fuel: f64,
    position: f64,
    surface: SurfaceClass,
    fail_reads: bool,
}

impl ScriptedProvider {
    fn new(track_km: f64) -> Self {
        Self {
            connected: true,
            track_length: Kilometers(track_km),
            identity: IDENTITY,
            session_state: SessionState::Racing,
            lap: 1,
            fuel: 50.0,
            position: 0.5,
            surface: SurfaceClass::OnTrack,
            fail_reads: false,
        }
    }

    fn set(&mut self, lap: i32, fuel: f64, position: f64) {
        self.lap = lap;
        self.fuel = fuel;
        self.position = position;
    }
}

impl TelemetryProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn start(&mut self) -> Result<()> {
        if !self.connected {
            bail!("sim not running");
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_initialized(&self) -> bool {
        self.connected
    }

    fn session_state(&self) -> Result<SessionState> {
        Ok(self.session_state)
    }

    fn lap_number(&self) -> Result<i32> {
        Ok(self.lap)
    }

    fn fuel_remaining(&self) -> Result<Liters> {
        if self.fail_reads {
            bail!("FuelLevel unavailable");
        }
        Ok(Liters(self.fuel))
    }

    fn position_fraction(&self) -> Result<f64> {
        Ok(self.position)
    }

    fn driver_car_index(&self) -> Result<usize> {
        Ok(0)
    }

    fn surface_class(&self, _driver_index: usize) -> Result<SurfaceClass> {
        Ok(self.surface)
    }

    fn track_length(&self) -> Result<Kilometers> {
        Ok(self.track_length)
    }

    fn track_id(&self) -> Result<i64> {
        Ok(self.identity.track_id)
    }

    fn car_id(&self, _driver_index: usize) -> Result<i64> {
        Ok(self.identity.car_id)
    }
}

fn engine() -> FuelEngine<MemoryStore> {
    FuelEngine::new(EngineSettings::default(), MemoryStore::new())
}

/// Drive one full lap of 100 polls at grid positions, burning `burn` per poll
fn drive_lap(
    engine: &mut FuelEngine<MemoryStore>,
    provider: &mut ScriptedProvider,
    events: &mut Vec<EngineEvent>,
    lap: i32,
    start_fuel: f64,
    burn: f64,
) -> f64 {
    for i in 0..100 {
        provider.set(lap, start_fuel - i as f64 * burn, i as f64 / 99.0);
        engine.tick(provider, events);
    }
    start_fuel - 99.0 * burn
}

fn curve_updates(events: &[EngineEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CurveUpdated { collected_laps } => Some(*collected_laps),
            _ => None,
        })
        .collect()
}

fn assert_curve_close(curve: &AverageCurve, step: f64) {
    for (i, point) in curve.points().iter().enumerate() {
        assert!(
            (point.consumption - i as f64 * step).abs() < 1e-9,
            "index {} = {}",
            i,
            point.consumption
        );
    }
}

#[test]
fn test_connect_emits_session_event() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    engine.tick(&mut provider, &mut events);

    assert!(engine.is_connected());
    assert_eq!(
        events[0],
        EngineEvent::SessionConnected {
            identity: IDENTITY,
            array_length: 100
        }
    );
    // The connect tick also reads telemetry and emits an idle delta
    assert!(matches!(events[1], EngineEvent::LiveDelta(d) if d.current_usage == Liters(0.0)));
}

#[test]
fn test_partial_first_lap_is_not_collected() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    // Connected mid-way through lap 1
    provider.set(1, 50.0, 0.4);
    engine.tick(&mut provider, &mut events);
    for i in 0..60 {
        provider.set(1, 50.0 - i as f64 * 0.01, 0.4 + i as f64 * 0.01);
        engine.tick(&mut provider, &mut events);
    }
    provider.set(2, 49.0, 0.0);
    engine.tick(&mut provider, &mut events);

    assert!(curve_updates(&events).is_empty());
    assert_eq!(engine.accumulator().collected_laps(), 0);
}

#[test]
fn test_clean_lap_then_pit_lap() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);

    // Lap 2 is clean
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);
    // Lap 3 starts on track, which closes lap 2
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 3, fuel, 0.05);
    assert_eq!(curve_updates(&events), vec![1]);
    let after_a = engine.accumulator().curve().clone();
    assert_curve_close(&after_a, 0.02);

    // Lap 3 ends in the pit stall
    provider.surface = SurfaceClass::InPitStall;
    provider.set(4, fuel, 0.0);
    engine.tick(&mut provider, &mut events);

    assert_eq!(curve_updates(&events), vec![1]);
    assert_eq!(engine.accumulator().collected_laps(), 1);
    assert_eq!(engine.accumulator().curve(), &after_a);
    assert!(engine.status().lap_invalid);
}

#[test]
fn test_second_clean_lap_is_averaged() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 3, fuel, 0.04);
    provider.set(4, fuel, 0.0);
    engine.tick(&mut provider, &mut events);

    assert_eq!(curve_updates(&events), vec![1, 2]);
    assert_curve_close(engine.accumulator().curve(), 0.03);
}

#[test]
fn test_live_delta_against_collected_curve() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);

    events.clear();
    provider.set(3, fuel, 0.0);
    engine.tick(&mut provider, &mut events);
    // Halfway round lap 3 having used 1.5 L against an average of 0.99 L
    provider.set(3, fuel - 1.5, 0.5);
    engine.tick(&mut provider, &mut events);

    let Some(EngineEvent::LiveDelta(delta)) = events.last() else {
        panic!("expected a live delta, got {:?}", events.last());
    };
    assert!((delta.current_usage.0 - 1.5).abs() < 1e-9);
    assert!((delta.average_usage.0 - 0.99).abs() < 1e-9);
    assert!((delta.cumulative_delta.0 - 0.51).abs() < 1e-9);
    assert_eq!(delta.surface, SurfaceClass::OnTrack);
}

#[test]
fn test_live_delta_idle_outside_race() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.session_state = SessionState::Warmup;
    provider.set(1, 50.0, 0.37);
    engine.tick(&mut provider, &mut events);

    let Some(EngineEvent::LiveDelta(delta)) = events.last() else {
        panic!("expected a live delta");
    };
    assert_eq!(delta.instantaneous_delta, 0.0);
    assert_eq!(delta.cumulative_delta, Liters(0.0));
    assert_eq!(delta.position_fraction, 0.37);
}

#[test]
fn test_read_failure_skips_tick() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.01);

    // Part way into lap 3
    for i in 0..20 {
        provider.set(3, fuel - i as f64 * 0.01, i as f64 / 99.0);
        engine.tick(&mut provider, &mut events);
    }
    assert!(engine.collector().is_collecting(3));
    let samples = engine.collector().segment().len();
    let start_fuel = engine.collector().lap_start_fuel();
    let laps = engine.accumulator().collected_laps();
    assert_eq!(laps, 1);

    events.clear();
    provider.fail_reads = true;
    provider.set(3, fuel - 0.2, 20.0 / 99.0);
    engine.tick(&mut provider, &mut events);

    assert!(events.is_empty());
    assert!(engine.is_connected());
    assert_eq!(engine.collector().segment().len(), samples);
    assert_eq!(engine.collector().lap_start_fuel(), start_fuel);
    assert_eq!(engine.accumulator().collected_laps(), laps);

    provider.fail_reads = false;
    engine.tick(&mut provider, &mut events);

    assert_eq!(engine.collector().segment().len(), samples + 1);
    assert_eq!(engine.collector().lap_start_fuel(), start_fuel);
    assert!(matches!(events.last(), Some(EngineEvent::LiveDelta(_))));
}

#[test]
fn test_implausible_track_length_uses_minimum_grid() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(1e300);
    let mut events = Vec::new();

    engine.tick(&mut provider, &mut events);

    assert!(engine.is_connected());
    assert_eq!(
        events[0],
        EngineEvent::SessionConnected {
            identity: IDENTITY,
            array_length: 100
        }
    );
}

#[test]
fn test_disconnect_saves_collected_curve() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);
    provider.set(3, fuel, 0.0);
    engine.tick(&mut provider, &mut events);

    events.clear();
    provider.connected = false;
    engine.tick(&mut provider, &mut events);

    assert_eq!(events, vec![EngineEvent::SessionDisconnected]);
    let record = engine.store().record().expect("curve should be saved");
    assert_eq!(record.identity(), IDENTITY);
    assert_eq!(record.collected_laps_count, 1);
    assert_eq!(record.average_curve.len(), 100);
}

#[test]
fn test_disconnect_without_laps_does_not_save() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();
    engine.tick(&mut provider, &mut events);

    provider.connected = false;
    engine.tick(&mut provider, &mut events);
    assert!(engine.store().record().is_none());
}

#[test]
fn test_reconnect_to_longer_track_resets_curve() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);
    provider.set(3, fuel, 0.0);
    engine.tick(&mut provider, &mut events);
    assert_eq!(engine.accumulator().collected_laps(), 1);

    provider.connected = false;
    engine.tick(&mut provider, &mut events);

    events.clear();
    provider.connected = true;
    provider.track_length = Kilometers(4.28);
    engine.tick(&mut provider, &mut events);

    assert_eq!(
        events[0],
        EngineEvent::SessionConnected {
            identity: IDENTITY,
            array_length: 2140
        }
    );
    assert_eq!(engine.accumulator().collected_laps(), 0);
    assert_eq!(engine.accumulator().grid_len(), 2140);
    assert!(engine
        .accumulator()
        .curve()
        .points()
        .iter()
        .all(|p| p.consumption == 0.0));
}

#[test]
fn test_reconnect_same_session_keeps_curve() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);
    provider.set(3, fuel, 0.0);
    engine.tick(&mut provider, &mut events);

    provider.connected = false;
    engine.tick(&mut provider, &mut events);
    provider.connected = true;
    engine.tick(&mut provider, &mut events);

    assert_eq!(engine.accumulator().collected_laps(), 1);
    assert_curve_close(engine.accumulator().curve(), 0.02);
}

#[test]
fn test_saved_curve_restored_on_connect() {
    let saved = AverageCurve::from_consumption((0..100).map(|i| i as f64 * 0.025).collect()).unwrap();
    let store = MemoryStore::with_record(StoredCurve::new(IDENTITY, &saved, 7));
    let mut engine = FuelEngine::new(EngineSettings::default(), store);
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    engine.tick(&mut provider, &mut events);

    assert_eq!(events[0], EngineEvent::CurveUpdated { collected_laps: 7 });
    assert!(matches!(events[1], EngineEvent::SessionConnected { .. }));
    assert_eq!(engine.accumulator().curve(), &saved);
    assert_eq!(engine.status().collected_laps, 7);
}

#[test]
fn test_saved_curve_for_other_car_ignored() {
    let saved = AverageCurve::from_consumption((0..100).map(|i| i as f64 * 0.025).collect()).unwrap();
    let other = SessionIdentity {
        car_id: 999,
        ..IDENTITY
    };
    let store = MemoryStore::with_record(StoredCurve::new(other, &saved, 7));
    let mut engine = FuelEngine::new(EngineSettings::default(), store);
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    engine.tick(&mut provider, &mut events);

    assert!(curve_updates(&events).is_empty());
    assert_eq!(engine.accumulator().collected_laps(), 0);
    assert!(engine.curve_snapshot().is_none());
}

#[test]
fn test_status_reports_current_lap() {
    let mut engine = engine();
    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();

    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    for i in 0..40 {
        provider.set(2, 50.0 - i as f64 * 0.02, i as f64 / 99.0);
        engine.tick(&mut provider, &mut events);
    }

    let status = engine.status();
    assert!(status.connected);
    assert_eq!(status.identity, Some(IDENTITY));
    assert_eq!(status.lap, Some(2));
    assert!(status.collecting);
    assert!(!status.lap_invalid);
    assert_eq!(status.current_lap_samples, 40);
    assert_eq!(status.array_length, 100);
    assert!(status.curve_stats.is_none());
}

#[test]
fn test_save_and_delete_through_engine() {
    let mut engine = engine();
    assert!(!engine.save(), "nothing collected yet");

    let mut provider = ScriptedProvider::new(0.2);
    let mut events = Vec::new();
    provider.set(1, 50.0, 0.9);
    engine.tick(&mut provider, &mut events);
    let fuel = drive_lap(&mut engine, &mut provider, &mut events, 2, 50.0, 0.02);
    provider.set(3, fuel, 0.0);
    engine.tick(&mut provider, &mut events);

    assert!(engine.save());
    assert!(engine.store().record().is_some());
    assert!(engine.delete_saved());
    assert!(engine.store().record().is_none());
    // In-memory curve survives the deletion
    assert_eq!(engine.accumulator().collected_laps(), 1);
}
