//! The sequential-script strategy: deterministic replies from a
//! configured playbook. Useful for demos, smoke tests, and the quiet
//! side of bridge conversations.

use std::collections::VecDeque;

use parking_lot::Mutex;

use cq_domain::conversation::ScriptEntry;
use cq_domain::error::Result;
use cq_domain::event::EventEnvelope;

use super::{is_reply_trigger, AgentClient, AgentStrategy};

const EXHAUSTED_MESSAGE: &str = "I have nothing further to add.";

pub struct ScriptAgent {
    client: AgentClient,
    entries: Mutex<VecDeque<ScriptEntry>>,
}

impl ScriptAgent {
    pub fn new(client: AgentClient, entries: Vec<ScriptEntry>) -> Self {
        Self {
            client,
            entries: Mutex::new(entries.into()),
        }
    }

    async fn take_turn(&self) -> Result<()> {
        let entry = self.entries.lock().pop_front();
        let turn_id = self.client.start_turn().await?;
        match entry {
            Some(entry) => {
                self.client
                    .complete_turn(&turn_id, entry.content, entry.is_final, vec![])
                    .await?;
            }
            None => {
                // Script exhausted: close the conversation politely.
                self.client
                    .complete_turn(&turn_id, EXHAUSTED_MESSAGE, true, vec![])
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AgentStrategy for ScriptAgent {
    fn agent_id(&self) -> &str {
        self.client.agent_id()
    }

    async fn initialize_conversation(
        &self,
        additional_instructions: Option<&str>,
    ) -> Result<()> {
        // Explicit instructions override the first scripted line.
        if let Some(text) = additional_instructions.filter(|s| !s.trim().is_empty()) {
            let turn_id = self.client.start_turn().await?;
            self.client
                .complete_turn(&turn_id, text, false, vec![])
                .await?;
            return Ok(());
        }
        self.take_turn().await
    }

    async fn on_conversation_event(&self, envelope: &EventEnvelope) -> Result<()> {
        if is_reply_trigger(envelope, self.client.agent_id()) {
            self.take_turn().await?;
        }
        Ok(())
    }
}
