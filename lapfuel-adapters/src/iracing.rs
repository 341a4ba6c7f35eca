//! iRacing provider using the iracing.rs library
//!
//! Connects to iRacing via shared memory. Live values come from the newest
//! telemetry sample latched by `refresh`; track and car identifiers come from
//! the session info YAML read at start.
//! Only available on Windows.

/// Polls without a new sample before the sim counts as gone (~2s at 60Hz)
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const MAX_MISSED_SAMPLES: u32 = 120;

#[cfg(target_os = "windows")]
mod windows_impl {
    use super::MAX_MISSED_SAMPLES;
    use anyhow::{anyhow, Context, Result};
    use iracing::telemetry::{Blocking, Connection, Sample, Value};
    use lapfuel_core::{
        adapter::TelemetryProvider,
        model::{SessionState, SurfaceClass},
        units::{Kilometers, Liters},
    };
    use std::convert::TryInto;
    use std::time::Duration;
    use tracing::debug;

    /// Static session values read once per start
    struct SessionStatics {
        track_length: Option<Kilometers>,
        track_id: i64,
        driver_car_index: usize,
        car_ids: Vec<i64>,
    }

    pub struct IRacingProvider {
        connection: Option<Connection>,
        blocking: Option<Blocking>,
        sample: Option<Sample>,
        statics: Option<SessionStatics>,
        missed_samples: u32,
    }

    // SAFETY: iRacing's shared memory is only read, never written. The
    // Connection, Blocking and Sample types hold raw pointers into the mapped
    // file, and the provider is owned by a single poll task at a time.
    unsafe impl Send for IRacingProvider {}

    impl IRacingProvider {
        pub fn new() -> Self {
            Self {
                connection: None,
                blocking: None,
                sample: None,
                statics: None,
                missed_samples: 0,
            }
        }

        fn read_statics(connection: &mut Connection) -> Result<SessionStatics> {
            let session = connection
                .session_info()
                .map_err(|e| anyhow!("session info unavailable: {:?}", e))?;

            Ok(SessionStatics {
                track_length: Kilometers::parse(&session.weekend.track_length),
                track_id: session.weekend.track_id as i64,
                driver_car_index: session.drivers.car_index as usize,
                car_ids: session
                    .drivers
                    .drivers
                    .iter()
                    .map(|d| d.car_id as i64)
                    .collect(),
            })
        }

        fn sample(&self) -> Result<&Sample> {
            self.sample.as_ref().context("no telemetry sample yet")
        }

        fn statics(&self) -> Result<&SessionStatics> {
            self.statics.as_ref().context("session info not loaded")
        }

        fn get_i32(&self, name: &'static str) -> Result<i32> {
            let value = self
                .sample()?
                .get(name)
                .map_err(|e| anyhow!("{} unavailable: {:?}", name, e))?;
            value
                .try_into()
                .map_err(|_| anyhow!("{} is not an integer", name))
        }

        fn get_f32(&self, name: &'static str) -> Result<f32> {
            let value = self
                .sample()?
                .get(name)
                .map_err(|e| anyhow!("{} unavailable: {:?}", name, e))?;
            value
                .try_into()
                .map_err(|_| anyhow!("{} is not a float", name))
        }
    }

    impl Default for IRacingProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TelemetryProvider for IRacingProvider {
        fn name(&self) -> &str {
            "iRacing"
        }

        fn start(&mut self) -> Result<()> {
            let mut connection = Connection::new()?;
            let blocking = connection.blocking()?;
            let statics = Self::read_statics(&mut connection)?;

            self.connection = Some(connection);
            self.blocking = Some(blocking);
            self.statics = Some(statics);
            self.sample = None;
            self.missed_samples = 0;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.sample = None;
            self.blocking = None;
            self.connection = None;
            self.statics = None;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connection.is_some() && self.missed_samples < MAX_MISSED_SAMPLES
        }

        fn is_initialized(&self) -> bool {
            self.statics.is_some()
        }

        fn refresh(&mut self) -> Result<()> {
            let blocking = self.blocking.as_ref().context("not connected")?;

            // Short timeout so the poll loop never stalls
            match blocking.sample(Duration::from_millis(1)) {
                Ok(sample) => {
                    self.sample = Some(sample);
                    self.missed_samples = 0;
                    Ok(())
                }
                Err(e) => {
                    self.missed_samples += 1;
                    debug!("No new iRacing sample: {:?}", e);
                    if self.sample.is_some() {
                        Ok(())
                    } else {
                        Err(anyhow!("no telemetry sample yet"))
                    }
                }
            }
        }

        fn session_state(&self) -> Result<SessionState> {
            self.get_i32("SessionState").map(SessionState::from_raw)
        }

        fn lap_number(&self) -> Result<i32> {
            self.get_i32("Lap")
        }

        fn fuel_remaining(&self) -> Result<Liters> {
            self.get_f32("FuelLevel").map(|l| Liters(l as f64))
        }

        fn position_fraction(&self) -> Result<f64> {
            self.get_f32("LapDistPct").map(|p| p as f64)
        }

        fn driver_car_index(&self) -> Result<usize> {
            Ok(self.statics()?.driver_car_index)
        }

        fn surface_class(&self, driver_index: usize) -> Result<SurfaceClass> {
            let value = self
                .sample()?
                .get("CarIdxTrackSurface")
                .map_err(|e| anyhow!("CarIdxTrackSurface unavailable: {:?}", e))?;
            match value {
                Value::IntVec(surfaces) => surfaces
                    .get(driver_index)
                    .copied()
                    .map(SurfaceClass::from_raw)
                    .with_context(|| format!("no track surface for car {}", driver_index)),
                other => Err(anyhow!("unexpected CarIdxTrackSurface value: {:?}", other)),
            }
        }

        fn track_length(&self) -> Result<Kilometers> {
            self.statics()?
                .track_length
                .context("track length missing from session info")
        }

        fn track_id(&self) -> Result<i64> {
            Ok(self.statics()?.track_id)
        }

        fn car_id(&self, driver_index: usize) -> Result<i64> {
            self.statics()?
                .car_ids
                .get(driver_index)
                .copied()
                .with_context(|| format!("no driver entry for car {}", driver_index))
        }
    }
}

// Re-export for Windows
#[cfg(target_os = "windows")]
pub use windows_impl::IRacingProvider;

// Stub implementation for non-Windows platforms
#[cfg(not(target_os = "windows"))]
#[derive(Default)]
pub struct IRacingProvider;

#[cfg(not(target_os = "windows"))]
impl IRacingProvider {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(target_os = "windows"))]
mod stub_impl {
    use super::IRacingProvider;
    use anyhow::{bail, Result};
    use lapfuel_core::{
        adapter::TelemetryProvider,
        model::{SessionState, SurfaceClass},
        units::{Kilometers, Liters},
    };

    const UNAVAILABLE: &str = "iRacing provider only available on Windows";

    impl TelemetryProvider for IRacingProvider {
        fn name(&self) -> &str {
            "iRacing (Windows only)"
        }

        fn start(&mut self) -> Result<()> {
            bail!(UNAVAILABLE)
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn is_initialized(&self) -> bool {
            false
        }

        fn session_state(&self) -> Result<SessionState> {
            bail!(UNAVAILABLE)
        }

        fn lap_number(&self) -> Result<i32> {
            bail!(UNAVAILABLE)
        }

        fn fuel_remaining(&self) -> Result<Liters> {
            bail!(UNAVAILABLE)
        }

        fn position_fraction(&self) -> Result<f64> {
            bail!(UNAVAILABLE)
        }

        fn driver_car_index(&self) -> Result<usize> {
            bail!(UNAVAILABLE)
        }

        fn surface_class(&self, _driver_index: usize) -> Result<SurfaceClass> {
            bail!(UNAVAILABLE)
        }

        fn track_length(&self) -> Result<Kilometers> {
            bail!(UNAVAILABLE)
        }

        fn track_id(&self) -> Result<i64> {
            bail!(UNAVAILABLE)
        }

        fn car_id(&self, _driver_index: usize) -> Result<i64> {
            bail!(UNAVAILABLE)
        }
    }

}
