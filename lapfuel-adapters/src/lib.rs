//! Telemetry providers for LapFuel

pub mod demo;
pub mod ibt;
pub mod iracing;
pub mod replay;

pub use demo::DemoProvider;
pub use iracing::IRacingProvider;
pub use replay::IbtReplayProvider;
