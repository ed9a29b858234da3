use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trace::TraceEntry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl TurnStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One agent's contribution to a conversation. Created `in_progress` by
/// `start_turn`; its trace grows until `complete_turn` seals it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: String,
    pub conversation_id: String,
    pub agent_id: String,
    pub status: TurnStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub is_final_turn: bool,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
    /// Attachment ids created with this turn.
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl ConversationTurn {
    pub fn new_in_progress(
        conversation_id: impl Into<String>,
        agent_id: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            agent_id: agent_id.into(),
            status: TurnStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            content: String::new(),
            metadata,
            is_final_turn: false,
            trace: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// The turn without its trace array (the shape `trace_added` events carry).
    pub fn shell(&self) -> Self {
        Self {
            trace: Vec::new(),
            ..self.clone()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Attachments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A document created by an agent's turn. Lifetime = conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub conversation_id: String,
    pub turn_id: String,
    pub doc_id: String,
    pub name: String,
    pub content_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_by_agent_id: String,
    pub created_at: DateTime<Utc>,
}

/// Embedded attachment creation form, supplied to `complete_turn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub name: String,
    pub content_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_turn_is_in_progress_and_empty() {
        let turn = ConversationTurn::new_in_progress("c1", "a1", None);
        assert_eq!(turn.status, TurnStatus::InProgress);
        assert!(turn.content.is_empty());
        assert!(turn.trace.is_empty());
        assert!(!turn.is_final_turn);
    }

    #[test]
    fn shell_drops_trace_only() {
        let mut turn = ConversationTurn::new_in_progress("c1", "a1", None);
        turn.content = "hi".into();
        turn.trace.push(crate::trace::TraceEntry::stamped(
            &turn.id,
            "a1",
            crate::trace::TraceKind::Thought {
                content: "hm".into(),
            },
        ));
        let shell = turn.shell();
        assert!(shell.trace.is_empty());
        assert_eq!(shell.content, "hi");
        assert_eq!(shell.id, turn.id);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TurnStatus::InProgress.is_terminal());
        assert!(TurnStatus::Completed.is_terminal());
        assert!(TurnStatus::Cancelled.is_terminal());
    }
}
