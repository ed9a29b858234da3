//! Conversation lifecycle endpoints (admin).
//!
//! - `POST   /v1/conversations`           — create
//! - `POST   /v1/conversations/:id/start` — start (provision agents)
//! - `GET    /v1/conversations/:id`       — projection with include flags
//! - `DELETE /v1/conversations/:id`       — end

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;

use cq_domain::conversation::{CreateConversationRequest, GetConversationOptions};

use crate::state::AppState;

use super::error::ApiResult;

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = state.orchestrator.create_conversation(request).await?;
    Ok(Json(serde_json::to_value(result).map_err(
        cq_domain::error::Error::from,
    )?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    #[serde(default)]
    pub agent_ids: Option<Vec<String>>,
}

pub async fn start(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    body: Option<Json<StartBody>>,
) -> ApiResult<Json<serde_json::Value>> {
    let agent_ids = body.and_then(|Json(b)| b.agent_ids);
    state
        .orchestrator
        .start_conversation(&conversation_id, agent_ids)
        .await?;
    Ok(Json(serde_json::json!({ "status": "active" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetQuery {
    #[serde(default = "d_true")]
    pub include_turns: bool,
    #[serde(default = "d_true")]
    pub include_trace: bool,
    #[serde(default = "d_true")]
    pub include_attachments: bool,
}

fn d_true() -> bool {
    true
}

impl Default for GetQuery {
    fn default() -> Self {
        Self {
            include_turns: true,
            include_trace: true,
            include_attachments: true,
        }
    }
}

pub async fn get(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<GetQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let snapshot = state.orchestrator.get_conversation(
        &conversation_id,
        GetConversationOptions {
            include_turns: query.include_turns,
            include_trace: query.include_trace,
            include_attachments: query.include_attachments,
        },
    )?;
    Ok(Json(serde_json::to_value(snapshot).map_err(
        cq_domain::error::Error::from,
    )?))
}

pub async fn end(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.end_conversation(&conversation_id).await?;
    Ok(Json(serde_json::json!({ "status": "completed" })))
}
