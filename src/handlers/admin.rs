use axum::{Json, extract::State};

use crate::{
    error::ApiError,
    extractors::ValidPath,
    state::AppState,
    types::{
        CancelScheduledResponse, EngineStatusResponse, ListScheduledResponse,
        ScheduledReactionView,
    },
};

pub async fn status_handler(State(state): State<AppState>) -> Json<EngineStatusResponse> {
    Json(EngineStatusResponse {
        running: state.engine.is_running(),
        scheduled: i64::try_from(state.engine.timers().len()).unwrap_or(i64::MAX),
    })
}

pub async fn list_scheduled_handler(State(state): State<AppState>) -> Json<ListScheduledResponse> {
    let reactions = state
        .engine
        .scheduled_reactions()
        .into_iter()
        .map(|entry| ScheduledReactionView {
            id: entry.id,
            fire_at: entry.fire_at,
        })
        .collect();

    Json(ListScheduledResponse { reactions })
}

pub async fn cancel_scheduled_handler(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<String>,
) -> Result<Json<CancelScheduledResponse>, ApiError> {
    let id = id.trim().to_string();
    if id.is_empty() {
        return Err(ApiError::validation("id must be non-empty"));
    }

    if !state.engine.cancel_scheduled_reaction(&id) {
        return Err(ApiError::NotFound(format!("no scheduled reaction {id}")));
    }

    Ok(Json(CancelScheduledResponse {
        id,
        cancelled: true,
    }))
}
