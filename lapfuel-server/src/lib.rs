//! LapFuel Server Library
//!
//! Exposes server components for integration testing.

pub mod api;
pub mod config;
pub mod manager;
pub mod state;
