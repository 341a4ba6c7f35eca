//! Telemetry provider trait definition

use crate::model::{SessionIdentity, SessionState, SurfaceClass, TelemetrySnapshot};
use crate::units::{Kilometers, Liters};
use anyhow::Result;

/// Trait for sim-specific telemetry providers
///
/// A provider is owned by the poll loop and handed to the engine by
/// reference on every tick. The engine is responsible for:
/// - Calling `start` while disconnected and `stop` after the sim goes away
/// - Calling `refresh` once per tick before reading any live values
/// - Reading the static session getters once per connect
pub trait TelemetryProvider: Send {
    /// Get the name of this provider (e.g., "iRacing", "Demo")
    fn name(&self) -> &str;

    /// Try to attach to the sim
    ///
    /// Called every tick while disconnected, so it must fail fast.
    fn start(&mut self) -> Result<()>;

    /// Release the sim connection
    fn stop(&mut self) -> Result<()>;

    /// Whether the sim is still feeding data
    fn is_connected(&self) -> bool;

    /// Whether session info and the variable layout are available
    fn is_initialized(&self) -> bool;

    /// Latch the newest sample so the live getters below read one consistent frame
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    // === Live values ===

    fn session_state(&self) -> Result<SessionState>;

    fn lap_number(&self) -> Result<i32>;

    fn fuel_remaining(&self) -> Result<Liters>;

    /// Lap completion fraction in `[0, 1]`
    fn position_fraction(&self) -> Result<f64>;

    /// Index of the player's car in per-car arrays
    fn driver_car_index(&self) -> Result<usize>;

    fn surface_class(&self, driver_index: usize) -> Result<SurfaceClass>;

    // === Static session info ===

    fn track_length(&self) -> Result<Kilometers>;

    fn track_id(&self) -> Result<i64>;

    fn car_id(&self, driver_index: usize) -> Result<i64>;

    /// Read the player's live values as one snapshot
    fn snapshot(&self) -> Result<TelemetrySnapshot> {
        let driver = self.driver_car_index()?;
        let snapshot = TelemetrySnapshot {
            session_state: self.session_state()?,
            lap_number: self.lap_number()?,
            fuel_remaining: self.fuel_remaining()?,
            position_fraction: self.position_fraction()?,
            surface: self.surface_class(driver)?,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Read the (track, car) pair for the player's car
    fn session_identity(&self) -> Result<SessionIdentity> {
        let driver = self.driver_car_index()?;
        Ok(SessionIdentity {
            track_id: self.track_id()?,
            car_id: self.car_id(driver)?,
        })
    }
}
