//! Queue introspection and worker control routes.

use std::collections::HashMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use apteka_common::error::AppError;
use apteka_common::types::QueueStats;
use apteka_queue::KNOWN_QUEUES;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queues/status", get(queues_status))
        .route("/queues/control", post(queues_control))
}

/// GET /queues/status — pending counts and oldest deadlines per queue.
async fn queues_status(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, QueueStats>>, AppError> {
    let mut stats = HashMap::with_capacity(KNOWN_QUEUES.len());
    for queue in KNOWN_QUEUES {
        stats.insert(queue.to_string(), state.store.stats(queue).await?);
    }
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ControlAction {
    Start,
    Stop,
    Clear,
    Restart,
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    action: ControlAction,
}

/// POST /queues/control — pause/resume the delivery worker or drop
/// pending jobs.
async fn queues_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut cleared = 0u64;

    match request.action {
        ControlAction::Start => state.worker.resume(),
        ControlAction::Stop => state.worker.pause(),
        ControlAction::Clear => {
            for queue in KNOWN_QUEUES {
                cleared += state.store.clear(queue).await?;
            }
        }
        ControlAction::Restart => {
            // The worker runs in-process; a restart is a resume with a log
            // marker. Full process restarts are the orchestrator's job.
            state.worker.resume();
            tracing::info!("Worker restart requested via control endpoint");
        }
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "paused": state.worker.is_paused(),
        "ready": state.worker.is_ready(),
        "cleared": cleared,
    })))
}
