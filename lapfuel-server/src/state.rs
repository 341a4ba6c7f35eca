//! Application state shared between the monitor task and the HTTP handlers

use crate::config::MonitorConfig;
use lapfuel_core::{CurveSnapshot, EngineEvent, EngineStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Requests handed to the monitor task, which owns the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Persist the curve now
    Save,
    /// Remove the persisted curve
    DeleteSaved,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Engine events; every SSE client holds a receiver
    pub events_tx: broadcast::Sender<EngineEvent>,

    /// Latest status published by the monitor
    pub status: Arc<RwLock<EngineStatus>>,

    /// Latest average curve, None until a lap is collected
    pub curve: Arc<RwLock<Option<CurveSnapshot>>>,

    pub commands: mpsc::Sender<EngineCommand>,

    pub config: Arc<RwLock<MonitorConfig>>,

    /// Where `PUT /api/config` persists to; None keeps changes in memory
    pub config_path: Option<PathBuf>,
}

impl AppState {
    /// Returns the state and the command receiver for the monitor task
    pub fn new(
        config: MonitorConfig,
        config_path: Option<PathBuf>,
    ) -> (Self, mpsc::Receiver<EngineCommand>) {
        // Live deltas arrive at the poll rate; slow clients skip ahead
        let (events_tx, _) = broadcast::channel(256);
        let (commands, commands_rx) = mpsc::channel(16);

        let state = Self {
            events_tx,
            status: Arc::new(RwLock::new(EngineStatus::default())),
            curve: Arc::new(RwLock::new(None)),
            commands,
            config: Arc::new(RwLock::new(config)),
            config_path,
        };
        (state, commands_rx)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }
}
