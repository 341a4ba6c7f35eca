//! Monitor loop
//!
//! This task owns the provider and the engine. It:
//! - Ticks the engine at the poll cadence
//! - Broadcasts engine events to subscribers
//! - Publishes status and curve snapshots for the API
//! - Runs save/delete commands and the periodic flush
//! - Saves once more on shutdown

use crate::config::MonitorConfig;
use crate::state::{AppState, EngineCommand};
use lapfuel_core::{
    CurveSnapshot, CurveStore, EngineEvent, EngineStatus, EventSink, FuelEngine, TelemetryProvider,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_millis(500);
/// Stand-in period for a disabled flush; the branch is never polled
const DISABLED_PERIOD: Duration = Duration::from_secs(3600);

/// Forwards engine events to the broadcast channel
pub struct BroadcastSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn emit(&mut self, event: EngineEvent) {
        if !matches!(event, EngineEvent::LiveDelta(_)) {
            debug!("Engine event: {}", event.kind());
        }
        // No receivers is fine; they get the next event
        let _ = self.tx.send(event);
    }
}

/// Timer that first fires one period from now
fn delayed(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Main monitor loop; returns after `cancel` fires and the final save
pub async fn run<S: CurveStore>(
    state: AppState,
    mut provider: Box<dyn TelemetryProvider>,
    mut engine: FuelEngine<S>,
    mut commands: mpsc::Receiver<EngineCommand>,
    cancel: CancellationToken,
) {
    let config: MonitorConfig = state.config.read().await.clone();
    let mut sink = BroadcastSink::new(state.events_tx.clone());

    let mut poll = interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_timer = delayed(STATUS_INTERVAL);
    let mut status_log =
        delayed(Duration::from_secs(config.status_log_interval_secs.max(1)));
    let flush_enabled = config.flush_interval_secs > 0;
    let mut flush = delayed(if flush_enabled {
        Duration::from_secs(config.flush_interval_secs)
    } else {
        DISABLED_PERIOD
    });

    info!(
        "Monitor started with {} provider, polling every {} ms",
        provider.name(),
        config.poll_interval_ms
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            Some(command) = commands.recv() => {
                match command {
                    EngineCommand::Save => {
                        engine.save();
                    }
                    EngineCommand::DeleteSaved => {
                        engine.delete_saved();
                    }
                }
                publish(&state, engine.status(), engine.curve_snapshot()).await;
            }

            _ = poll.tick() => {
                engine.tick(provider.as_mut(), &mut sink);
            }

            _ = status_timer.tick() => {
                publish(&state, engine.status(), engine.curve_snapshot()).await;
            }

            _ = flush.tick(), if flush_enabled => {
                debug!("Periodic flush");
                engine.save();
            }

            _ = status_log.tick() => {
                log_status(&engine);
            }
        }
    }

    info!("Monitor stopping, saving fuel data");
    engine.save();
    if let Err(e) = provider.stop() {
        warn!("Error stopping {}: {}", provider.name(), e);
    }
    publish(&state, engine.status(), engine.curve_snapshot()).await;
}

/// Copy the engine's status and curve into shared state
async fn publish(state: &AppState, status: EngineStatus, curve: Option<CurveSnapshot>) {
    *state.status.write().await = status;
    *state.curve.write().await = curve;
}

fn log_status<S: CurveStore>(engine: &FuelEngine<S>) {
    let status = engine.status();
    if !status.connected {
        debug!("Waiting for sim");
        return;
    }
    match status.curve_stats {
        Some(stats) => debug!(
            "Lap {:?}: {} laps collected, {:.3} L/lap average, {} samples this lap",
            status.lap, status.collected_laps, stats.lap_total, status.current_lap_samples
        ),
        None => debug!(
            "Lap {:?}: no fuel data yet, {} samples this lap",
            status.lap, status.current_lap_samples
        ),
    }
}
