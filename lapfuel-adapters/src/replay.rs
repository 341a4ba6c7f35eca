//! Replay provider that plays back a recorded .ibt file
//!
//! Each `refresh` advances the playback by `stride` records. When the
//! recording runs out the provider reports itself disconnected and refuses
//! to start again until `rewind` is called, so the engine sees one complete
//! session.

use crate::ibt::{IbtFile, IbtSessionInfo, Record, VarHeader, VarValue};
use anyhow::{bail, Context, Result};
use lapfuel_core::{
    adapter::TelemetryProvider,
    model::{SessionState, SurfaceClass},
    units::{Kilometers, Liters},
};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::PathBuf;
use tracing::{debug, info};

/// Variables resolved once per start
struct Layout {
    session_state: VarHeader,
    lap: VarHeader,
    fuel_level: VarHeader,
    lap_dist_pct: VarHeader,
    surface: SurfaceVar,
}

enum SurfaceVar {
    /// Per-car array indexed by the driver's car index
    PerCar(VarHeader),
    /// Player-only scalar, older recordings
    Player(VarHeader),
}

impl Layout {
    fn resolve<R: Read + Seek>(ibt: &IbtFile<R>) -> Result<Self> {
        let required = |name: &str| {
            ibt.var(name)
                .cloned()
                .with_context(|| format!("recording has no {} variable", name))
        };
        let surface = match (ibt.var("CarIdxTrackSurface"), ibt.var("PlayerTrackSurface")) {
            (Some(var), _) => SurfaceVar::PerCar(var.clone()),
            (None, Some(var)) => SurfaceVar::Player(var.clone()),
            (None, None) => bail!("recording has no track surface variable"),
        };
        Ok(Self {
            session_state: required("SessionState")?,
            lap: required("Lap")?,
            fuel_level: required("FuelLevel")?,
            lap_dist_pct: required("LapDistPct")?,
            surface,
        })
    }
}

/// Generic over the reader so recordings can be replayed from memory
pub struct IbtReplayProvider<R = BufReader<File>> {
    source: Box<dyn FnMut() -> Result<IbtFile<R>> + Send>,
    ibt: Option<IbtFile<R>>,
    layout: Option<Layout>,
    record: Option<Record>,
    cursor: usize,
    stride: usize,
    finished: bool,
}

impl IbtReplayProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self::from_source(move || IbtFile::open(&path))
    }
}

impl<R: Read + Seek + Send> IbtReplayProvider<R> {
    /// Build from a closure that yields a fresh reader on each start
    pub fn from_source<F>(source: F) -> Self
    where
        F: FnMut() -> Result<IbtFile<R>> + Send + 'static,
    {
        Self {
            source: Box::new(source),
            ibt: None,
            layout: None,
            record: None,
            cursor: 0,
            stride: 1,
            finished: false,
        }
    }

    /// Records to advance per `refresh`
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride.max(1);
        self
    }

    /// Allow the recording to be played again from the start
    pub fn rewind(&mut self) {
        self.finished = false;
        self.cursor = 0;
    }

    /// Records already played
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn record_count(&self) -> usize {
        self.ibt.as_ref().map_or(0, |ibt| ibt.record_count())
    }

    fn session_info(&self) -> Result<&IbtSessionInfo> {
        Ok(self.ibt.as_ref().context("replay not started")?.session_info())
    }

    fn value(&self, var: impl Fn(&Layout) -> &VarHeader) -> Result<VarValue> {
        let layout = self.layout.as_ref().context("replay not started")?;
        let record = self.record.as_ref().context("no record loaded")?;
        let var = var(layout);
        record
            .get(var)
            .with_context(|| format!("{} missing from record {}", var.name, self.cursor))
    }

    fn int(&self, var: impl Fn(&Layout) -> &VarHeader) -> Result<i32> {
        let value = self.value(var)?;
        value
            .as_i32()
            .with_context(|| format!("expected an integer, got {:?}", value))
    }

    fn float(&self, var: impl Fn(&Layout) -> &VarHeader) -> Result<f64> {
        let value = self.value(var)?;
        value
            .as_f64()
            .with_context(|| format!("expected a number, got {:?}", value))
    }
}

impl<R: Read + Seek + Send> TelemetryProvider for IbtReplayProvider<R> {
    fn name(&self) -> &str {
        "IBT Replay"
    }

    fn start(&mut self) -> Result<()> {
        if self.ibt.is_some() {
            return Ok(());
        }
        if self.finished {
            bail!("replay finished");
        }

        let mut ibt = (self.source)()?;
        let layout = Layout::resolve(&ibt)?;
        if ibt.record_count() == 0 {
            bail!("recording has no records");
        }
        // Latch the first record so the engine can read the lap on connect
        let record = ibt.read_record(0)?;
        info!(
            "Replaying {} records at {} Hz ({})",
            ibt.record_count(),
            ibt.tick_rate(),
            ibt.session_info().track_name
        );

        self.ibt = Some(ibt);
        self.layout = Some(layout);
        self.record = Some(record);
        self.cursor = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(ibt) = self.ibt.take() {
            self.finished = self.cursor >= ibt.record_count();
        }
        self.layout = None;
        self.record = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ibt
            .as_ref()
            .is_some_and(|ibt| self.cursor < ibt.record_count())
    }

    fn is_initialized(&self) -> bool {
        self.layout.is_some()
    }

    fn refresh(&mut self) -> Result<()> {
        let ibt = self.ibt.as_mut().context("replay not started")?;
        if self.cursor >= ibt.record_count() {
            bail!("end of recording");
        }
        self.record = Some(ibt.read_record(self.cursor)?);
        self.cursor += self.stride;
        if self.cursor >= ibt.record_count() {
            debug!("Replay reached the last record");
        }
        Ok(())
    }

    fn session_state(&self) -> Result<SessionState> {
        self.int(|l| &l.session_state).map(SessionState::from_raw)
    }

    fn lap_number(&self) -> Result<i32> {
        self.int(|l| &l.lap)
    }

    fn fuel_remaining(&self) -> Result<Liters> {
        self.float(|l| &l.fuel_level).map(Liters)
    }

    fn position_fraction(&self) -> Result<f64> {
        self.float(|l| &l.lap_dist_pct)
    }

    fn driver_car_index(&self) -> Result<usize> {
        Ok(self.session_info()?.driver_car_idx.unwrap_or(0))
    }

    fn surface_class(&self, driver_index: usize) -> Result<SurfaceClass> {
        let layout = self.layout.as_ref().context("replay not started")?;
        let record = self.record.as_ref().context("no record loaded")?;
        let raw = match &layout.surface {
            SurfaceVar::PerCar(var) => record.get(var).and_then(|v| v.int_at(driver_index)),
            SurfaceVar::Player(var) => record.get(var).and_then(|v| v.as_i32()),
        };
        raw.map(SurfaceClass::from_raw)
            .with_context(|| format!("no track surface for car {}", driver_index))
    }

    fn track_length(&self) -> Result<Kilometers> {
        self.session_info()?
            .track_length
            .context("track length missing from session info")
    }

    fn track_id(&self) -> Result<i64> {
        self.session_info()?
            .track_id
            .context("track id missing from session info")
    }

    fn car_id(&self, driver_index: usize) -> Result<i64> {
        self.session_info()?
            .car_ids
            .get(&driver_index)
            .copied()
            .with_context(|| format!("no driver entry for car {}", driver_index))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibt::fixture::{build, float, int, ints, var};
    use crate::ibt::VarType;
    use lapfuel_core::model::{EngineEvent, SessionIdentity};
    use lapfuel_core::{EngineSettings, FuelEngine, MemoryStore};
    use std::io::Cursor;

    const YAML: &str = "WeekendInfo:
 TrackName: okayama full
 TrackID: 166
 TrackLength: 3.70 km
DriverInfo:
 DriverCarIdx: 1
 Drivers:
 - CarIdx: 0
   CarID: 11
 - CarIdx: 1
   CarID: 67
";

    const SAMPLES_PER_LAP: usize = 60;

    /// Three racing laps at 0.01 L per record, then the first record of lap 4
    fn recording() -> Vec<u8> {
        let vars = [
            var("SessionState", VarType::Int, 1),
            var("Lap", VarType::Int, 1),
            var("FuelLevel", VarType::Float, 1),
            var("LapDistPct", VarType::Float, 1),
            var("CarIdxTrackSurface", VarType::Int, 2),
        ];
        let mut records = Vec::new();
        for lap in 1..=3 {
            for i in 0..SAMPLES_PER_LAP {
                let n = (lap - 1) as usize * SAMPLES_PER_LAP + i;
                records.push(vec![
                    int(4),
                    int(lap),
                    float(50.0 - n as f32 * 0.01),
                    float(i as f32 / SAMPLES_PER_LAP as f32),
                    ints(&[-1, 3]),
                ]);
            }
        }
        records.push(vec![int(4), int(4), float(48.2), float(0.0), ints(&[-1, 3])]);
        build(&vars, YAML, &records, records.len() as i32)
    }

    fn provider() -> IbtReplayProvider<Cursor<Vec<u8>>> {
        let bytes = recording();
        IbtReplayProvider::from_source(move || IbtFile::from_reader(Cursor::new(bytes.clone())))
    }

    #[test]
    fn test_replay_reads_session_and_live_values() {
        let mut replay = provider();
        replay.start().unwrap();
        assert!(replay.is_connected());
        assert_eq!(replay.record_count(), 3 * SAMPLES_PER_LAP + 1);
        assert_eq!(
            replay.session_identity().unwrap(),
            SessionIdentity {
                track_id: 166,
                car_id: 67
            }
        );
        assert_eq!(replay.track_length().unwrap(), Kilometers(3.70));

        replay.refresh().unwrap();
        let snapshot = replay.snapshot().unwrap();
        assert_eq!(snapshot.session_state, SessionState::Racing);
        assert_eq!(snapshot.lap_number, 1);
        assert!((snapshot.fuel_remaining.0 - 50.0).abs() < 1e-6);
        assert_eq!(snapshot.surface, SurfaceClass::OnTrack);
    }

    #[test]
    fn test_replay_finishes_once() {
        let mut replay = provider().with_stride(50);
        replay.start().unwrap();
        while replay.is_connected() {
            replay.refresh().unwrap();
        }
        assert!(replay.refresh().is_err());
        replay.stop().unwrap();
        assert!(replay.start().is_err());

        replay.rewind();
        assert!(replay.start().is_ok());
    }

    #[test]
    fn test_missing_variables_fail_start() {
        let vars = [var("Lap", VarType::Int, 1)];
        let bytes = build(&vars, YAML, &[vec![int(1)]], 1);
        let mut replay =
            IbtReplayProvider::from_source(move || IbtFile::from_reader(Cursor::new(bytes.clone())));
        let err = replay.start().unwrap_err();
        assert!(err.to_string().contains("no track surface"));
        assert!(!replay.is_initialized());
    }

    #[test]
    fn test_engine_over_replay() {
        let mut replay = provider();
        let mut engine = FuelEngine::new(EngineSettings::default(), MemoryStore::new());
        let mut events = Vec::new();

        // Every record plus one tick to notice the end
        for _ in 0..=3 * SAMPLES_PER_LAP + 1 {
            engine.tick(&mut replay, &mut events);
        }

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| e.kind())
            .filter(|k| *k != "live_delta")
            .collect();
        assert_eq!(
            kinds,
            [
                "session_connected",
                "curve_updated",
                "curve_updated",
                "session_disconnected"
            ]
        );
        assert!(matches!(
            events[0],
            EngineEvent::SessionConnected {
                array_length: 1850,
                ..
            }
        ));
        assert!(!engine.is_connected());

        let saved = engine.store().record().unwrap();
        assert_eq!(saved.collected_laps_count, 2);
        assert_eq!(saved.average_curve.len(), 1850);
        // 59 steps of 0.01 L to the last sample of each lap
        let last = saved.average_curve.last().unwrap();
        assert!((last[1] - 0.59).abs() < 1e-4);
    }
}
