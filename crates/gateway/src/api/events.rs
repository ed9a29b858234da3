//! SSE event streams.
//!
//! - `GET /v1/conversations/:id/events` — one conversation (agent token)
//! - `GET /v1/events`                   — wildcard firehose (admin)
//!
//! Query params `event_types` / `agent_ids` are comma-separated filter
//! lists applied per subscription.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use cq_domain::event::{EventEnvelope, EventFilter};

use crate::orchestrator::bus::WILDCARD_TOPIC;
use crate::state::AppState;

use super::auth::AgentIdentity;
use super::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub event_types: Option<String>,
    #[serde(default)]
    pub agent_ids: Option<String>,
}

impl EventsQuery {
    fn filter(&self) -> EventFilter {
        let split = |s: &String| -> Vec<String> {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect()
        };
        EventFilter {
            event_types: self.event_types.as_ref().map(split).filter(|v| !v.is_empty()),
            agent_ids: self.agent_ids.as_ref().map(split).filter(|v| !v.is_empty()),
        }
    }
}

pub async fn conversation_events(
    identity: AgentIdentity,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    identity.check_conversation(&conversation_id)?;
    // Surface NotFound before upgrading to a stream.
    state
        .orchestrator
        .get_conversation(&conversation_id, Default::default())?;

    let (_id, rx) = state.orchestrator.subscribe(&conversation_id, query.filter());
    Ok(sse_response(rx))
}

pub async fn all_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let (_id, rx) = state.orchestrator.subscribe(WILDCARD_TOPIC, query.filter());
    sse_response(rx)
}

fn sse_response(
    mut rx: mpsc::UnboundedReceiver<EventEnvelope>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(envelope) = rx.recv().await {
            let data = serde_json::to_string(&envelope).unwrap_or_default();
            yield Ok(Event::default()
                .event(envelope.event.event_type())
                .data(data));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
