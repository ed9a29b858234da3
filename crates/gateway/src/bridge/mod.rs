//! Bridging a conversation to an external counterparty.

pub mod agent;
pub mod blob;
pub mod surface;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use cq_domain::conversation::GetConversationOptions;
use cq_domain::error::{Error, Result};

use crate::orchestrator::Orchestrator;

pub use agent::{BridgeAgent, BridgeStats};
pub use surface::BridgeSurface;

/// Live bridge agents, one per conversation, created on demand (the
/// surface is stateless per request).
#[derive(Default)]
pub struct BridgeRegistry {
    bridges: Mutex<HashMap<String, Arc<BridgeAgent>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the conversation's bridge agent, rehydrating the
    /// conversation and creating the agent if needed.
    pub async fn get_or_create(
        &self,
        orch: &Arc<Orchestrator>,
        conversation_id: &str,
    ) -> Result<Arc<BridgeAgent>> {
        if let Some(agent) = self.bridges.lock().get(conversation_id) {
            return Ok(agent.clone());
        }

        orch.ensure_conversation(conversation_id).await?;
        let snapshot =
            orch.get_conversation(conversation_id, GetConversationOptions::default())?;
        let bridged = snapshot.conversation.bridged_agent().ok_or_else(|| {
            Error::InvalidRequest(format!(
                "NoBridgedAgent: conversation {conversation_id} has no bridged agent"
            ))
        })?;

        // Re-check under the lock: a concurrent caller may have created
        // the agent while we rehydrated.
        let mut bridges = self.bridges.lock();
        if let Some(agent) = bridges.get(conversation_id) {
            return Ok(agent.clone());
        }
        let agent = BridgeAgent::new(orch, conversation_id, &bridged.id);
        bridges.insert(conversation_id.to_owned(), agent.clone());
        Ok(agent)
    }

    pub fn remove(&self, conversation_id: &str) {
        self.bridges.lock().remove(conversation_id);
    }

    pub fn len(&self) -> usize {
        self.bridges.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.lock().is_empty()
    }
}
