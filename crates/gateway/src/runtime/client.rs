//! The narrow handle an agent uses to act on its conversation.
//!
//! Holds a `Weak` reference to the orchestrator so the ownership chain
//! stays one-directional: the orchestrator owns agents, agents never
//! keep it alive.

use std::sync::Weak;

use cq_domain::conversation::{ConversationSnapshot, GetConversationOptions};
use cq_domain::error::{Error, Result};
use cq_domain::trace::{TraceEntry, TraceKind};
use cq_domain::turn::{AttachmentPayload, ConversationTurn};

use crate::orchestrator::{CompleteTurn, Orchestrator};

#[derive(Clone)]
pub struct AgentClient {
    conversation_id: String,
    agent_id: String,
    orch: Weak<Orchestrator>,
}

impl AgentClient {
    pub fn new(conversation_id: &str, agent_id: &str, orch: Weak<Orchestrator>) -> Self {
        Self {
            conversation_id: conversation_id.to_owned(),
            agent_id: agent_id.to_owned(),
            orch,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn orch(&self) -> Result<std::sync::Arc<Orchestrator>> {
        self.orch
            .upgrade()
            .ok_or_else(|| Error::Internal("orchestrator has shut down".into()))
    }

    pub async fn start_turn(&self) -> Result<String> {
        self.orch()?
            .start_turn(&self.conversation_id, &self.agent_id, None)
            .await
    }

    pub async fn add_thought(&self, turn_id: &str, content: impl Into<String>) -> Result<TraceEntry> {
        self.add_trace(
            turn_id,
            TraceKind::Thought {
                content: content.into(),
            },
        )
        .await
    }

    pub async fn add_tool_call(
        &self,
        turn_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<TraceEntry> {
        self.add_trace(
            turn_id,
            TraceKind::ToolCall {
                tool_call_id: tool_call_id.to_owned(),
                tool_name: tool_name.to_owned(),
                parameters,
            },
        )
        .await
    }

    pub async fn add_tool_result(
        &self,
        turn_id: &str,
        tool_call_id: &str,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<TraceEntry> {
        self.add_trace(
            turn_id,
            TraceKind::ToolResult {
                tool_call_id: tool_call_id.to_owned(),
                result,
                error,
            },
        )
        .await
    }

    async fn add_trace(&self, turn_id: &str, kind: TraceKind) -> Result<TraceEntry> {
        self.orch()?
            .add_trace_entry(&self.conversation_id, turn_id, &self.agent_id, kind)
            .await
    }

    pub async fn complete_turn(
        &self,
        turn_id: &str,
        content: impl Into<String>,
        is_final_turn: bool,
        attachments: Vec<AttachmentPayload>,
    ) -> Result<ConversationTurn> {
        self.orch()?
            .complete_turn(CompleteTurn {
                conversation_id: self.conversation_id.clone(),
                turn_id: turn_id.to_owned(),
                agent_id: self.agent_id.clone(),
                content: content.into(),
                is_final_turn,
                metadata: None,
                attachments,
            })
            .await
    }

    /// Full conversation projection (turns with trace, attachments).
    pub fn snapshot(&self) -> Result<ConversationSnapshot> {
        self.orch()?
            .get_conversation(&self.conversation_id, GetConversationOptions::full())
    }

    /// Trace of the currently-open turn.
    pub fn trace_so_far(&self, turn_id: &str) -> Result<Vec<TraceEntry>> {
        self.orch()?.store().get_trace_entries_for_turn(turn_id)
    }
}
