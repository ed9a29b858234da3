//! The static-replay strategy: replays a recorded transcript verbatim on
//! this agent's turn slots, including recorded thoughts. Once the
//! recording runs out the agent goes silent.

use std::collections::VecDeque;

use parking_lot::Mutex;

use cq_domain::conversation::ScriptEntry;
use cq_domain::error::Result;
use cq_domain::event::EventEnvelope;

use super::{is_reply_trigger, AgentClient, AgentStrategy};

pub struct ReplayAgent {
    client: AgentClient,
    entries: Mutex<VecDeque<ScriptEntry>>,
}

impl ReplayAgent {
    pub fn new(client: AgentClient, entries: Vec<ScriptEntry>) -> Self {
        Self {
            client,
            entries: Mutex::new(entries.into()),
        }
    }

    async fn replay_next(&self) -> Result<()> {
        let Some(entry) = self.entries.lock().pop_front() else {
            tracing::debug!(
                agent_id = self.client.agent_id(),
                "replay exhausted; staying silent"
            );
            return Ok(());
        };
        let turn_id = self.client.start_turn().await?;
        for thought in &entry.thoughts {
            self.client.add_thought(&turn_id, thought.clone()).await?;
        }
        self.client
            .complete_turn(&turn_id, entry.content, entry.is_final, vec![])
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AgentStrategy for ReplayAgent {
    fn agent_id(&self) -> &str {
        self.client.agent_id()
    }

    async fn initialize_conversation(
        &self,
        _additional_instructions: Option<&str>,
    ) -> Result<()> {
        // A replay ignores instructions; the recording is the source.
        self.replay_next().await
    }

    async fn on_conversation_event(&self, envelope: &EventEnvelope) -> Result<()> {
        if is_reply_trigger(envelope, self.client.agent_id()) {
            self.replay_next().await?;
        }
        Ok(())
    }
}
