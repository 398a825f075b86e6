pub mod admin;

use axum::{
    Router, middleware,
    routing::{delete, get},
};

use crate::{auth::admin_auth, state::AppState};

/// Admin routes for the running engine, all behind the bearer-token guard.
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/internal/engine/status", get(admin::status_handler))
        .route(
            "/internal/engine/scheduled",
            get(admin::list_scheduled_handler),
        )
        .route(
            "/internal/engine/scheduled/:id",
            delete(admin::cancel_scheduled_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth))
        .with_state(state)
}
