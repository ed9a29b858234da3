//! User query endpoints.
//!
//! - `POST /v1/conversations/:id/queries` — agent raises a question
//! - `POST /v1/queries/:id/respond`       — human answers (admin)
//! - `GET  /v1/queries/:id`               — status (admin)

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;

use crate::state::AppState;

use super::auth::AgentIdentity;
use super::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueryBody {
    pub question: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

pub async fn create_query(
    identity: AgentIdentity,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(body): Json<CreateQueryBody>,
) -> ApiResult<Json<serde_json::Value>> {
    identity.check_conversation(&conversation_id)?;
    let (query_id, _receiver) = state
        .orchestrator
        .create_user_query(
            &conversation_id,
            &identity.agent_id,
            &body.question,
            body.context,
        )
        .await?;
    Ok(Json(serde_json::json!({ "queryId": query_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    pub response: String,
}

pub async fn respond(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
    Json(body): Json<RespondBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .orchestrator
        .respond_to_user_query(&query_id, &body.response)
        .await?;
    Ok(Json(serde_json::json!({ "status": "answered" })))
}

pub async fn get_query(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let query = state.orchestrator.get_user_query_status(&query_id)?;
    Ok(Json(serde_json::to_value(query).map_err(
        cq_domain::error::Error::from,
    )?))
}
