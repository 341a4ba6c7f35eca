//! Monitor configuration
//!
//! Stored as JSON. Every field has a default, so partial files load and
//! anything unreadable falls back to the defaults with a warning.

use anyhow::{bail, Context, Result};
use lapfuel_core::store::write_atomic;
use lapfuel_core::EngineSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const APP_DIR: &str = "lapfuel";

/// Placement and look of the delta overlay, kept for the display client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub locked: bool,
    pub opacity: f64,
    pub font_size: u32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            w: 400,
            h: 100,
            locked: false,
            opacity: 1.0,
            font_size: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Telemetry poll cadence
    pub poll_interval_ms: u64,
    /// Periodic save of the curve, 0 disables
    pub flush_interval_secs: u64,
    pub status_log_interval_secs: u64,
    pub port: u16,
    /// Where the average curve is persisted
    pub data_file: PathBuf,
    pub engine: EngineSettings,
    pub overlay: OverlaySettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            flush_interval_secs: 300,
            status_log_interval_secs: 5,
            port: 9200,
            data_file: default_data_file(),
            engine: EngineSettings::default(),
            overlay: OverlaySettings::default(),
        }
    }
}

/// `<config_dir>/lapfuel/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.json")
}

/// `<data_local_dir>/lapfuel/last_usage_data.json`
pub fn default_data_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("last_usage_data.json")
}

impl MonitorConfig {
    /// Read the config at `path`; a missing or malformed file yields defaults
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Could not read config {}: {}, using defaults", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&text) {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    warn!("Invalid config {}: {:#}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Malformed config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        write_atomic(path, &json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Reject values the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        if self.status_log_interval_secs == 0 {
            bail!("status_log_interval_secs must be positive");
        }
        let completion = self.engine.min_lap_completion;
        if !(completion > 0.0 && completion <= 1.0) {
            bail!("engine.min_lap_completion must be in (0, 1], got {}", completion);
        }
        if self.engine.rate_history_len < 2 {
            bail!("engine.rate_history_len must be at least 2");
        }
        if !(0.0..=1.0).contains(&self.overlay.opacity) {
            bail!("overlay.opacity must be in [0, 1], got {}", self.overlay.opacity);
        }
        Ok(())
    }
}
