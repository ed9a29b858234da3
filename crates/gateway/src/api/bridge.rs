//! Bridge surface endpoints (public; the configuration blob is the
//! authentication).
//!
//! - `GET  /v1/bridge/:config/tools` — rendered tool descriptions
//! - `POST /v1/bridge/:config/call`  — `{tool, params}` dispatch

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;

use crate::state::AppState;

use super::error::ApiResult;

pub async fn tool_descriptions(
    State(state): State<AppState>,
    Path(config): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let tools = state.surface.tool_descriptions(&config)?;
    Ok(Json(serde_json::json!({ "tools": tools })))
}

#[derive(Debug, Deserialize)]
pub struct CallBody {
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub async fn call(
    State(state): State<AppState>,
    Path(config): Path<String>,
    Json(body): Json<CallBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = state.surface.call(&config, &body.tool, body.params).await?;
    Ok(Json(serde_json::json!({ "result": result })))
}
