use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, ConversationSnapshot};
use crate::query::UserQuery;
use crate::trace::{TraceEntry, TraceKind};
use crate::turn::ConversationTurn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State changes fanned out on the event bus.
///
/// Serialises adjacently tagged (`type` + `data`) so the flattened
/// envelope below matches the wire contract
/// `{ type, conversationId, timestamp, data }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ConversationEvent {
    ConversationCreated {
        conversation: Conversation,
    },
    ConversationReady {
        conversation: Conversation,
    },
    ConversationEnded {},
    Rehydrated {
        snapshot: ConversationSnapshot,
    },
    TurnStarted {
        turn: ConversationTurn,
    },
    TurnCompleted {
        turn: ConversationTurn,
    },
    TurnCancelled {
        turn_id: String,
        agent_id: String,
    },
    /// Carries the turn *shell* (no trace array) plus the single new entry.
    TraceAdded {
        turn: ConversationTurn,
        trace: TraceEntry,
    },
    AgentThinking {
        agent_id: String,
        thought: String,
    },
    ToolExecuting {
        agent_id: String,
        tool_name: String,
        parameters: serde_json::Value,
    },
    UserQueryCreated {
        query: UserQuery,
    },
    UserQueryAnswered {
        query_id: String,
        response: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
}

impl ConversationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversationCreated { .. } => "conversation_created",
            Self::ConversationReady { .. } => "conversation_ready",
            Self::ConversationEnded {} => "conversation_ended",
            Self::Rehydrated { .. } => "rehydrated",
            Self::TurnStarted { .. } => "turn_started",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::TurnCancelled { .. } => "turn_cancelled",
            Self::TraceAdded { .. } => "trace_added",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::UserQueryCreated { .. } => "user_query_created",
            Self::UserQueryAnswered { .. } => "user_query_answered",
        }
    }

    /// The agent an event is about, for agent-scoped subscription filters.
    /// Conversation-level events have no agent.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::TurnStarted { turn }
            | Self::TurnCompleted { turn } => Some(&turn.agent_id),
            Self::TurnCancelled { agent_id, .. }
            | Self::AgentThinking { agent_id, .. }
            | Self::ToolExecuting { agent_id, .. } => Some(agent_id),
            Self::TraceAdded { trace, .. } => Some(&trace.agent_id),
            Self::UserQueryCreated { query } => Some(&query.agent_id),
            _ => None,
        }
    }

    /// Derived events for `thought` / `tool_call` trace entries.
    pub fn derived_from_trace(entry: &TraceEntry) -> Option<ConversationEvent> {
        match &entry.kind {
            TraceKind::Thought { content } => Some(ConversationEvent::AgentThinking {
                agent_id: entry.agent_id.clone(),
                thought: content.clone(),
            }),
            TraceKind::ToolCall {
                tool_name,
                parameters,
                ..
            } => Some(ConversationEvent::ToolExecuting {
                agent_id: entry.agent_id.clone(),
                tool_name: tool_name.clone(),
                parameters: parameters.clone(),
            }),
            TraceKind::ToolResult { .. } => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope and filters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What transport subscribers receive:
/// `{ type, conversationId, timestamp, data }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ConversationEvent,
}

impl EventEnvelope {
    pub fn now(conversation_id: impl Into<String>, event: ConversationEvent) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Per-subscription filter. Empty lists mean "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_ids: Option<Vec<String>>,
}

impl EventFilter {
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == envelope.event.event_type()) {
                return false;
            }
        }
        if let Some(agents) = &self.agent_ids {
            // Agent-scoped events must match; conversation-level events pass.
            if let Some(agent_id) = envelope.event.agent_id() {
                if !agents.iter().any(|a| a == agent_id) {
                    return false;
                }
            }
        }
        true
    }
}
