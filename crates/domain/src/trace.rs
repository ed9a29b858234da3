use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synthetic tool-call id used for the trace entry recorded when an
/// attachment is created as part of `complete_turn`.
pub const ATTACHMENT_CREATION_CALL_ID: &str = "attachment_creation";

/// The intra-turn log: an agent's thoughts, tool calls, and tool results.
/// Appended only while the owning turn is `in_progress`; immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub id: String,
    pub turn_id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TraceKind {
    Thought {
        content: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        parameters: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl TraceEntry {
    /// Stamp a new entry with a fresh id and the server clock.
    pub fn stamped(turn_id: &str, agent_id: &str, kind: TraceKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            turn_id: turn_id.to_owned(),
            agent_id: agent_id.to_owned(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

impl TraceKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            TraceKind::Thought { .. } => "thought",
            TraceKind::ToolCall { .. } => "tool_call",
            TraceKind::ToolResult { .. } => "tool_result",
        }
    }
}
