//! The bridge surface: `begin_chat_thread`, `send_message_to_chat_thread`,
//! `wait_for_reply`.
//!
//! Stateless per request — correlation is by conversation id plus the
//! bound configuration blob. A timed-out or already-busy wait becomes a
//! `StillWorking` value carrying counterparty liveness stats; `Timeout`
//! never escapes this surface as an error.

use std::sync::Arc;
use std::time::Duration;

use cq_domain::bridge::{
    BeginReply, BridgeConfigBlob, CounterpartyStatus, SendMessageParams, StillWorking,
    SurfaceReply, ToolDescription, WaitForReplyParams, BEGIN_CHAT_THREAD,
    SEND_MESSAGE_TO_CHAT_THREAD, WAIT_FOR_REPLY,
};
use cq_domain::conversation::CreateConversationRequest;
use cq_domain::error::{Error, Result};

use crate::orchestrator::Orchestrator;

use super::agent::BridgeAgent;
use super::blob;
use super::BridgeRegistry;

const FOLLOW_UP: &str =
    "No reply yet. Please call wait_for_reply to keep waiting for the counterparty's response.";
const WORKING_MESSAGE: &str = "The counterparty is still working on a reply.";

pub struct BridgeSurface {
    orch: Arc<Orchestrator>,
    registry: BridgeRegistry,
    reply_timeout: Duration,
}

impl BridgeSurface {
    pub fn new(orch: Arc<Orchestrator>) -> Self {
        let reply_timeout = Duration::from_secs(orch.config().bridge.reply_timeout_secs);
        Self {
            orch,
            registry: BridgeRegistry::new(),
            reply_timeout,
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Decode the blob, create the conversation, start the
    /// server-managed side. The external counterparty is the initiator;
    /// no message is sent yet.
    pub async fn begin(&self, blob_str: &str) -> Result<BeginReply> {
        let config = blob::decode(blob_str)?;
        let result = self
            .orch
            .create_conversation(CreateConversationRequest {
                agents: config.agents,
                metadata: config.metadata,
            })
            .await?;
        let conversation_id = result.conversation.id.clone();

        if result.conversation.has_server_managed_agents() {
            self.orch.start_conversation(&conversation_id, None).await?;
        }

        tracing::info!(conversation_id = %conversation_id, "bridge conversation begun");
        Ok(BeginReply { conversation_id })
    }

    pub async fn send_message(
        &self,
        blob_str: &str,
        params: SendMessageParams,
    ) -> Result<SurfaceReply> {
        blob::decode(blob_str)?;
        let bridge = self
            .registry
            .get_or_create(&self.orch, &params.conversation_id)
            .await?;

        let outcome = bridge
            .bridge_external_client_turn(&params.message, params.attachments, self.reply_timeout)
            .await;
        self.park_on_timeout(&bridge, outcome)
    }

    pub async fn wait_for_reply(
        &self,
        blob_str: &str,
        params: WaitForReplyParams,
    ) -> Result<SurfaceReply> {
        blob::decode(blob_str)?;
        let bridge = self
            .registry
            .get_or_create(&self.orch, &params.conversation_id)
            .await?;

        let outcome = bridge.wait_for_pending_reply(self.reply_timeout).await;
        self.park_on_timeout(&bridge, outcome)
    }

    /// Dispatch by wire-visible tool name.
    pub async fn call(&self, blob_str: &str, tool: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        match tool {
            BEGIN_CHAT_THREAD => Ok(serde_json::to_value(self.begin(blob_str).await?)?),
            SEND_MESSAGE_TO_CHAT_THREAD => {
                let params: SendMessageParams = serde_json::from_value(params)
                    .map_err(|e| Error::InvalidRequest(format!("bad parameters: {e}")))?;
                Ok(serde_json::to_value(
                    self.send_message(blob_str, params).await?,
                )?)
            }
            WAIT_FOR_REPLY => {
                let params: WaitForReplyParams = serde_json::from_value(params)
                    .map_err(|e| Error::InvalidRequest(format!("bad parameters: {e}")))?;
                Ok(serde_json::to_value(
                    self.wait_for_reply(blob_str, params).await?,
                )?)
            }
            other => Err(Error::NotFound(format!("tool {other}"))),
        }
    }

    // ── Tool descriptions ────────────────────────────────────────────

    /// Rendered dynamically with the counterparty's name so the external
    /// caller sees scenario-specific guidance.
    pub fn tool_descriptions(&self, blob_str: &str) -> Result<Vec<ToolDescription>> {
        let config = blob::decode(blob_str)?;
        let counterparty = self.counterparty_name(&config);

        Ok(vec![
            ToolDescription {
                name: BEGIN_CHAT_THREAD.into(),
                description: format!(
                    "Start a new conversation thread with {counterparty}. \
                     Returns the conversationId used by the other tools."
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {},
                }),
            },
            ToolDescription {
                name: SEND_MESSAGE_TO_CHAT_THREAD.into(),
                description: format!(
                    "Send a message to {counterparty} and wait briefly for the reply. \
                     If the reply is not ready you receive stillWorking=true; poll with \
                     wait_for_reply."
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "required": ["conversationId", "message"],
                    "properties": {
                        "conversationId": { "type": "string" },
                        "message": { "type": "string" },
                        "attachments": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "contentType", "content"],
                                "properties": {
                                    "name": { "type": "string" },
                                    "contentType": { "type": "string" },
                                    "content": { "type": "string" },
                                },
                            },
                        },
                    },
                }),
            },
            ToolDescription {
                name: WAIT_FOR_REPLY.into(),
                description: format!(
                    "Wait for {counterparty}'s next reply on an existing thread."
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "required": ["conversationId"],
                    "properties": {
                        "conversationId": { "type": "string" },
                    },
                }),
            },
        ])
    }

    /// Counterparty = the server-managed side; prefer the scenario
    /// principal's name over the agent id.
    fn counterparty_name(&self, config: &BridgeConfigBlob) -> String {
        for agent in &config.agents {
            if !agent.strategy_type.is_server_managed() {
                continue;
            }
            if let Some(scenario_id) = &agent.scenario_id {
                if let Some(scenario) = self
                    .orch
                    .scenarios()
                    .get(scenario_id, agent.scenario_version.as_deref())
                {
                    if let Some(profile) = scenario.agent(&agent.id) {
                        if !profile.principal.name.is_empty() {
                            return profile.principal.name.clone();
                        }
                    }
                }
            }
            return agent.id.clone();
        }
        "the counterparty".into()
    }

    // ── Still-working mapping ────────────────────────────────────────

    fn park_on_timeout(
        &self,
        bridge: &BridgeAgent,
        outcome: Result<cq_domain::bridge::BridgeReply>,
    ) -> Result<SurfaceReply> {
        match outcome {
            Ok(reply) => Ok(SurfaceReply::Reply(reply)),
            Err(Error::Timeout(_)) | Err(Error::Conflict(_)) => {
                let stats = bridge.stats();
                Ok(SurfaceReply::StillWorking(StillWorking {
                    still_working: true,
                    follow_up: FOLLOW_UP.into(),
                    status: CounterpartyStatus {
                        message: WORKING_MESSAGE.into(),
                        action_count: stats.action_count,
                        last_action_at: stats.last_action_at,
                        last_action_type: stats.last_action_type,
                    },
                }))
            }
            Err(other) => Err(other),
        }
    }
}
