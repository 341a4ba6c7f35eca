//! Per-tick fuel engine
//!
//! `FuelEngine` ties the pipeline together. The poll loop calls [`FuelEngine::tick`]
//! at a fixed cadence with the provider it owns; each tick runs the connection
//! check, then lap collection, then the live delta, and reports what happened
//! through an [`EventSink`].

use crate::accumulator::CurveAccumulator;
use crate::adapter::TelemetryProvider;
use crate::collector::{CollectionState, CompletedLap, LapCollector};
use crate::curve::{grid_length, CurveStats, GridPoint, MIN_GRID_LENGTH};
use crate::delta::{DeltaEstimator, DEFAULT_HISTORY_CAPACITY};
use crate::model::{EngineEvent, LiveDelta, SessionIdentity, SessionState, SurfaceClass, TelemetrySnapshot};
use crate::resample::resample;
use crate::store::{CurveStore, StoredCurve};
use crate::units::Liters;
use crate::validator::{LapValidator, LapVerdict, DEFAULT_MIN_LAP_COMPLETION, DEFAULT_MIN_LAP_SAMPLES};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Tunables of the lap pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub min_lap_samples: usize,
    pub min_lap_completion: f64,
    pub rate_history_len: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_lap_samples: DEFAULT_MIN_LAP_SAMPLES,
            min_lap_completion: DEFAULT_MIN_LAP_COMPLETION,
            rate_history_len: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Receives engine events
pub trait EventSink {
    fn emit(&mut self, event: EngineEvent);
}

impl EventSink for Vec<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

/// Point-in-time view of the engine, for status reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub connected: bool,
    pub identity: Option<SessionIdentity>,
    pub session_state: Option<SessionState>,
    pub lap: Option<i32>,
    pub position_fraction: Option<f64>,
    pub surface: Option<SurfaceClass>,
    pub on_track: bool,
    pub fuel_remaining: Option<Liters>,
    pub collection_state: Option<CollectionState>,
    /// Current lap is collecting samples
    pub collecting: bool,
    /// Current lap was disqualified by a pit visit
    pub lap_invalid: bool,
    pub current_lap_samples: usize,
    pub array_length: usize,
    pub collected_laps: u32,
    pub curve_stats: Option<CurveStats>,
}

/// The average curve as exposed to readers outside the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveSnapshot {
    pub identity: Option<SessionIdentity>,
    pub array_length: usize,
    pub collected_laps: u32,
    pub points: Vec<GridPoint>,
}

/// Single-owner fuel curve state machine
pub struct FuelEngine<S: CurveStore> {
    validator: LapValidator,
    store: S,
    connected: bool,
    identity: Option<SessionIdentity>,
    accumulator: CurveAccumulator,
    collector: LapCollector,
    estimator: DeltaEstimator,
    last_snapshot: Option<TelemetrySnapshot>,
}

impl<S: CurveStore> FuelEngine<S> {
    pub fn new(settings: EngineSettings, store: S) -> Self {
        Self {
            validator: LapValidator::new(settings.min_lap_samples, settings.min_lap_completion),
            store,
            connected: false,
            identity: None,
            accumulator: CurveAccumulator::empty(MIN_GRID_LENGTH),
            collector: LapCollector::new(),
            estimator: DeltaEstimator::new(settings.rate_history_len),
            last_snapshot: None,
        }
    }

    /// Run one poll: connection check, lap collection, live delta
    pub fn tick<P, E>(&mut self, provider: &mut P, sink: &mut E)
    where
        P: TelemetryProvider + ?Sized,
        E: EventSink + ?Sized,
    {
        self.check_connection(provider, sink);
        if !self.connected {
            return;
        }

        let snapshot = match provider.refresh().and_then(|_| provider.snapshot()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Telemetry read failed, skipping tick: {:#}", e);
                return;
            }
        };
        self.last_snapshot = Some(snapshot);

        self.collect(&snapshot, sink);
        sink.emit(EngineEvent::LiveDelta(self.live_delta(&snapshot)));
    }

    fn check_connection<P, E>(&mut self, provider: &mut P, sink: &mut E)
    where
        P: TelemetryProvider + ?Sized,
        E: EventSink + ?Sized,
    {
        if self.connected {
            if !(provider.is_initialized() && provider.is_connected()) {
                self.disconnect(provider, sink);
            }
        } else if provider.start().is_ok() && provider.is_initialized() {
            self.connect(provider, sink);
        }
    }

    fn disconnect<P, E>(&mut self, provider: &mut P, sink: &mut E)
    where
        P: TelemetryProvider + ?Sized,
        E: EventSink + ?Sized,
    {
        self.connected = false;
        self.last_snapshot = None;
        sink.emit(EngineEvent::SessionDisconnected);
        if self.accumulator.collected_laps() > 0 {
            self.save();
        }
        if let Err(e) = provider.stop() {
            warn!("Error stopping {}: {}", provider.name(), e);
        }
        self.collector.reset(None);
        self.estimator.reset();
        info!("{} disconnected", provider.name());
    }

    fn connect<P, E>(&mut self, provider: &mut P, sink: &mut E)
    where
        P: TelemetryProvider + ?Sized,
        E: EventSink + ?Sized,
    {
        let grid_len = match provider.track_length() {
            Ok(km) => {
                let len = grid_length(km);
                info!("Track length {:.2} km, grid size {}", km.0, len);
                len
            }
            Err(e) => {
                warn!("Could not read track length, using grid size {}: {}", MIN_GRID_LENGTH, e);
                MIN_GRID_LENGTH
            }
        };

        let identity = match provider.session_identity() {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Could not read session identity, retrying: {}", e);
                if let Err(e) = provider.stop() {
                    debug!("Error stopping {}: {}", provider.name(), e);
                }
                return;
            }
        };

        let resized = self.accumulator.resize(grid_len);
        if !resized && self.identity.is_some_and(|previous| previous != identity) {
            info!("Session changed to {}, discarding average curve", identity);
            self.accumulator.reset();
        }
        self.identity = Some(identity);
        self.connected = true;

        self.collector.reset(provider.lap_number().ok());
        self.estimator.reset();

        if self.accumulator.collected_laps() == 0 && self.load(identity) {
            sink.emit(EngineEvent::CurveUpdated {
                collected_laps: self.accumulator.collected_laps(),
            });
        }

        sink.emit(EngineEvent::SessionConnected {
            identity,
            array_length: grid_len,
        });
        info!("{} connected ({})", provider.name(), identity);
    }

    /// Restore the saved curve if it belongs to this session
    fn load(&mut self, identity: SessionIdentity) -> bool {
        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("No saved fuel data");
                return false;
            }
            Err(e) => {
                warn!("Could not read saved fuel data: {}", e);
                return false;
            }
        };

        let restored = record
            .accept(identity, self.accumulator.grid_len())
            .map_err(|e| e.to_string())
            .and_then(|(curve, laps)| {
                self.accumulator
                    .restore(curve, laps)
                    .map(|_| laps)
                    .map_err(|e| e.to_string())
            });

        match restored {
            Ok(laps) => {
                info!("Loaded fuel data for {} ({} laps)", identity, laps);
                true
            }
            Err(e) => {
                info!("Ignoring saved fuel data: {}", e);
                false
            }
        }
    }

    fn collect<E: EventSink + ?Sized>(&mut self, snapshot: &TelemetrySnapshot, sink: &mut E) {
        let previous_lap = self.collector.current_lap();
        let completed = self.collector.observe(snapshot);
        if self.collector.current_lap() != previous_lap {
            self.estimator.reset();
        }
        if let Some(lap) = completed {
            self.finish_lap(lap, sink);
        }
    }

    fn finish_lap<E: EventSink + ?Sized>(&mut self, lap: CompletedLap, sink: &mut E) {
        if let LapVerdict::Rejected(reason) = self.validator.judge(&lap) {
            info!("Lap {} is invalid: {}", lap.lap, reason);
            return;
        }

        let merged = resample(&lap.segment, self.accumulator.grid_len())
            .and_then(|curve| self.accumulator.merge(curve));
        match merged {
            Ok(collected_laps) => {
                info!(
                    "Lap {} fuel data processed, {} laps collected",
                    lap.lap, collected_laps
                );
                sink.emit(EngineEvent::CurveUpdated { collected_laps });
            }
            Err(e) => warn!("Lap {} could not be merged: {}", lap.lap, e),
        }
    }

    fn live_delta(&mut self, snapshot: &TelemetrySnapshot) -> LiveDelta {
        let active = snapshot.session_state.is_racing()
            && self.collector.is_collecting(snapshot.lap_number)
            && self.accumulator.collected_laps() > 0;

        if active {
            self.estimator.estimate(
                self.accumulator.curve(),
                snapshot,
                self.collector.lap_start_fuel(),
            )
        } else {
            LiveDelta::idle(snapshot.position_fraction, snapshot.surface)
        }
    }

    /// Persist the curve; no-op without collected laps
    pub fn save(&mut self) -> bool {
        let laps = self.accumulator.collected_laps();
        let Some(identity) = self.identity.filter(|_| laps > 0) else {
            debug!("No fuel data to save");
            return false;
        };

        let record = StoredCurve::new(identity, self.accumulator.curve(), laps);
        match self.store.save(&record) {
            Ok(()) => {
                info!("Saved fuel data for {} ({} laps)", identity, laps);
                true
            }
            Err(e) => {
                warn!("Failed to save fuel data: {}", e);
                false
            }
        }
    }

    /// Remove the persisted curve; the in-memory curve is kept
    pub fn delete_saved(&mut self) -> bool {
        match self.store.delete() {
            Ok(()) => {
                info!("Deleted saved fuel data");
                true
            }
            Err(e) => {
                warn!("Failed to delete saved fuel data: {}", e);
                false
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        let snapshot = self.last_snapshot.as_ref();
        let lap = snapshot.map(|s| s.lap_number);
        let laps = self.accumulator.collected_laps();

        EngineStatus {
            connected: self.connected,
            identity: self.identity,
            session_state: snapshot.map(|s| s.session_state),
            lap,
            position_fraction: snapshot.map(|s| s.position_fraction),
            surface: snapshot.map(|s| s.surface),
            on_track: snapshot.is_some_and(|s| s.surface.is_on_track()),
            fuel_remaining: snapshot.map(|s| s.fuel_remaining),
            collection_state: self.connected.then(|| self.collector.state()),
            collecting: lap.is_some_and(|l| self.collector.is_collecting(l)),
            lap_invalid: lap.is_some() && self.collector.invalid_lap() == lap,
            current_lap_samples: self.collector.segment().len(),
            array_length: self.accumulator.grid_len(),
            collected_laps: laps,
            curve_stats: (laps > 0).then(|| self.accumulator.curve().stats()),
        }
    }

    /// The current average curve, if any lap has been folded in
    pub fn curve_snapshot(&self) -> Option<CurveSnapshot> {
        let laps = self.accumulator.collected_laps();
        (laps > 0).then(|| CurveSnapshot {
            identity: self.identity,
            array_length: self.accumulator.grid_len(),
            collected_laps: laps,
            points: self.accumulator.curve().points().to_vec(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.identity
    }

    pub fn accumulator(&self) -> &CurveAccumulator {
        &self.accumulator
    }

    pub fn collector(&self) -> &LapCollector {
        &self.collector
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
