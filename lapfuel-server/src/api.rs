//! REST API and SSE routes

use crate::config::MonitorConfig;
use crate::state::{AppState, EngineCommand};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use lapfuel_core::{CurveSnapshot, EngineStatus};
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/curve", get(get_curve).delete(delete_curve))
        .route("/api/curve/save", post(save_curve))
        .route("/api/events", get(event_stream))
        .route("/api/config", get(get_config).put(put_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Engine Endpoints ===

async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.status.read().await.clone())
}

async fn get_curve(
    State(state): State<AppState>,
) -> Result<Json<CurveSnapshot>, (StatusCode, String)> {
    state
        .curve
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "No fuel data collected".to_string()))
}

async fn save_curve(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    queue(&state, EngineCommand::Save).await
}

async fn delete_curve(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    queue(&state, EngineCommand::DeleteSaved).await
}

/// Hand a command to the monitor task; it runs on the task's next turn
async fn queue(
    state: &AppState,
    command: EngineCommand,
) -> Result<StatusCode, (StatusCode, String)> {
    state.commands.send(command).await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Monitor is not running".to_string(),
        )
    })?;
    Ok(StatusCode::ACCEPTED)
}

// === Event Stream Endpoint ===

#[derive(Deserialize)]
struct EventsQuery {
    /// Comma-separated event kinds, e.g. `live_delta,curve_updated`
    events: Option<String>,
}

fn parse_kinds(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    // An empty list means no filter
    let kinds = query
        .events
        .as_deref()
        .map(parse_kinds)
        .filter(|kinds| !kinds.is_empty());

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let wanted = match (&result, &kinds) {
            (Ok(event), Some(kinds)) => kinds.contains(event.kind()),
            _ => true,
        };
        async move {
            match result {
                Ok(event) if wanted => match Event::default().event(event.kind()).json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        tracing::error!("Failed to serialize event: {}", e);
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => {
                    warn!("Event stream lagged: {}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === Config Endpoints ===

async fn get_config(State(state): State<AppState>) -> Json<MonitorConfig> {
    Json(state.config.read().await.clone())
}

/// Replace the config. Poll and flush timings apply on the next start.
async fn put_config(
    State(state): State<AppState>,
    Json(config): Json<MonitorConfig>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    config
        .validate()
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("{:#}", e)))?;

    if let Some(path) = &state.config_path {
        config
            .save(path)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;
    }

    *state.config.write().await = config.clone();
    info!("Config updated");
    Ok(Json(config))
}
