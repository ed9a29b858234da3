//! Turn endpoints.
//!
//! Agent-token routes:
//! - `POST /v1/conversations/:id/turns`                    — start a turn
//! - `POST /v1/conversations/:id/turns/:turn_id/trace`     — append trace
//! - `POST /v1/conversations/:id/turns/:turn_id/complete`  — seal a turn
//!
//! Admin route:
//! - `POST /v1/turns/:turn_id/cancel` — operator escape hatch

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;

use cq_domain::trace::TraceKind;
use cq_domain::turn::AttachmentPayload;

use crate::orchestrator::CompleteTurn;
use crate::state::AppState;

use super::auth::AgentIdentity;
use super::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTurnBody {
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub async fn start_turn(
    identity: AgentIdentity,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    body: Option<Json<StartTurnBody>>,
) -> ApiResult<Json<serde_json::Value>> {
    identity.check_conversation(&conversation_id)?;
    let metadata = body.and_then(|Json(b)| b.metadata);
    let turn_id = state
        .orchestrator
        .start_turn(&conversation_id, &identity.agent_id, metadata)
        .await?;
    Ok(Json(serde_json::json!({ "turnId": turn_id })))
}

pub async fn add_trace_entry(
    identity: AgentIdentity,
    State(state): State<AppState>,
    Path((conversation_id, turn_id)): Path<(String, String)>,
    Json(kind): Json<TraceKind>,
) -> ApiResult<Json<serde_json::Value>> {
    identity.check_conversation(&conversation_id)?;
    let entry = state
        .orchestrator
        .add_trace_entry(&conversation_id, &turn_id, &identity.agent_id, kind)
        .await?;
    Ok(Json(serde_json::to_value(entry).map_err(
        cq_domain::error::Error::from,
    )?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTurnBody {
    pub content: String,
    #[serde(default)]
    pub is_final_turn: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

pub async fn complete_turn(
    identity: AgentIdentity,
    State(state): State<AppState>,
    Path((conversation_id, turn_id)): Path<(String, String)>,
    Json(body): Json<CompleteTurnBody>,
) -> ApiResult<Json<serde_json::Value>> {
    identity.check_conversation(&conversation_id)?;
    let turn = state
        .orchestrator
        .complete_turn(CompleteTurn {
            conversation_id,
            turn_id,
            agent_id: identity.agent_id,
            content: body.content,
            is_final_turn: body.is_final_turn,
            metadata: body.metadata,
            attachments: body.attachments,
        })
        .await?;
    Ok(Json(serde_json::to_value(turn).map_err(
        cq_domain::error::Error::from,
    )?))
}

pub async fn cancel_turn(
    State(state): State<AppState>,
    Path(turn_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.cancel_turn(&turn_id).await?;
    Ok(Json(serde_json::json!({ "status": "cancelled" })))
}
