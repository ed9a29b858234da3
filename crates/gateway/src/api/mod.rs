pub mod auth;
pub mod bridge;
pub mod conversations;
pub mod error;
pub mod events;
pub mod queries;
pub mod turns;

use axum::middleware;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Three route classes: **public** (health + the bridge surface, where
/// the configuration blob is the authentication), **agent** (bearer =
/// agent token, resolved per handler by the [`auth::AgentIdentity`]
/// extractor), and **admin** (operator bearer token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/bridge/:config/tools", get(bridge::tool_descriptions))
        .route("/v1/bridge/:config/call", post(bridge::call));

    let agent = Router::new()
        .route("/v1/conversations/:id/turns", post(turns::start_turn))
        .route(
            "/v1/conversations/:id/turns/:turn_id/trace",
            post(turns::add_trace_entry),
        )
        .route(
            "/v1/conversations/:id/turns/:turn_id/complete",
            post(turns::complete_turn),
        )
        .route("/v1/conversations/:id/queries", post(queries::create_query))
        .route(
            "/v1/conversations/:id/events",
            get(events::conversation_events),
        );

    let admin = Router::new()
        .route("/v1/conversations", post(conversations::create))
        .route("/v1/conversations/:id", get(conversations::get))
        .route("/v1/conversations/:id", delete(conversations::end))
        .route("/v1/conversations/:id/start", post(conversations::start))
        .route("/v1/turns/:turn_id/cancel", post(turns::cancel_turn))
        .route("/v1/queries/:id", get(queries::get_query))
        .route("/v1/queries/:id/respond", post(queries::respond))
        .route("/v1/events", get(events::all_events))
        .layer(middleware::from_fn_with_state(
            state,
            auth::require_admin_token,
        ));

    public.merge(agent).merge(admin)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
