//! LapFuel Core Library
//!
//! This crate provides the lap-telemetry aggregation engine: lap boundary
//! detection, lap validity rules, resampling onto a fixed position grid, the
//! running average fuel curve and the live delta against it. Telemetry comes
//! from any [`TelemetryProvider`].

pub mod accumulator;
pub mod adapter;
pub mod collector;
pub mod curve;
pub mod delta;
pub mod engine;
pub mod model;
pub mod resample;
pub mod store;
pub mod units;
pub mod validator;

pub use adapter::TelemetryProvider;
pub use curve::{AverageCurve, CurveError, CurveStats};
pub use engine::{CurveSnapshot, EngineSettings, EngineStatus, EventSink, FuelEngine};
pub use model::{EngineEvent, LiveDelta, SessionIdentity, SessionState, SurfaceClass, TelemetrySnapshot};
pub use store::{CurveStore, JsonFileStore, MemoryStore, StoreError, StoredCurve};
pub use units::{Kilometers, Liters};
