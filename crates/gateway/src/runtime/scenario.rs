//! The scenario-driven strategy: a bounded step loop per reply.
//!
//! Each inbound `turn_completed` from another agent opens a turn, then
//! loops: prompt the policy, parse scratchpad + tool call, record trace,
//! dispatch. Sending a message or invoking a terminal tool closes the
//! turn; any other tool gets a synthesised result and the loop continues,
//! up to the step budget. Upstream failures are contained: the turn
//! closes with an apology and the conversation goes on.

use std::sync::Arc;

use parking_lot::Mutex;

use cq_domain::error::{Error, Result};
use cq_domain::event::EventEnvelope;
use cq_domain::scenario::{is_terminal_tool, ScenarioAgent, SEND_MESSAGE_TOOL};
use cq_domain::turn::AttachmentPayload;
use cq_policy::parse::parse_policy_reply;
use cq_policy::{CompletionPolicy, SynthesisRequest, ToolSynthesizer};

use super::prompt::{build_final_prompt, build_step_prompt, render_history, PromptContext};
use super::{is_reply_trigger, AgentClient, AgentStrategy};

const APOLOGY_MESSAGE: &str =
    "I'm sorry — I ran into a technical problem on my side. Could you repeat that?";
const MAX_STEPS_MESSAGE: &str =
    "I could not finish working through this within my step budget. \
     Let me pick this up from your next message.";
const FALLBACK_FINAL_MESSAGE: &str = "Thank you, that concludes this conversation.";

pub struct ScenarioDrivenAgent {
    client: AgentClient,
    profile: ScenarioAgent,
    policy: Arc<dyn CompletionPolicy>,
    synthesizer: Arc<dyn ToolSynthesizer>,
    max_steps: usize,
    /// Hysteresis: set when a turn exhausts its budget; the next turn
    /// runs with a one-step budget so the same failure cannot repeat
    /// immediately.
    budget_exhausted: Mutex<bool>,
}

impl ScenarioDrivenAgent {
    pub fn new(
        client: AgentClient,
        profile: ScenarioAgent,
        policy: Arc<dyn CompletionPolicy>,
        synthesizer: Arc<dyn ToolSynthesizer>,
        max_steps: usize,
    ) -> Self {
        Self {
            client,
            profile,
            policy,
            synthesizer,
            max_steps: max_steps.max(1),
            budget_exhausted: Mutex::new(false),
        }
    }

    // ── The step loop ────────────────────────────────────────────────

    async fn run_reply_turn(&self) -> Result<()> {
        let turn_id = self.client.start_turn().await?;

        let hysteresis = std::mem::take(&mut *self.budget_exhausted.lock());
        let budget = if hysteresis { 1 } else { self.max_steps };

        for step in 1..=budget {
            let snapshot = self.client.snapshot()?;
            let current_trace = self.client.trace_so_far(&turn_id)?;
            let prompt = build_step_prompt(&PromptContext {
                profile: &self.profile,
                snapshot: &snapshot,
                own_agent_id: self.client.agent_id(),
                current_trace: &current_trace,
                step,
                total_steps: budget,
            });

            let reply = match self.policy.complete(&prompt).await {
                Ok(reply) => reply,
                Err(e) => return self.close_with_apology(&turn_id, &e).await,
            };

            let parsed = parse_policy_reply(&reply);
            if let Some(scratchpad) = &parsed.scratchpad {
                self.client.add_thought(&turn_id, scratchpad.clone()).await?;
            }

            let Some(action) = parsed.action else {
                // No tool block: the reply itself is the message.
                self.client
                    .complete_turn(&turn_id, parsed.fallback_text(), false, vec![])
                    .await?;
                return Ok(());
            };

            let call_id = uuid::Uuid::new_v4().to_string();
            self.client
                .add_tool_call(&turn_id, &call_id, &action.name, action.args.clone())
                .await?;

            if action.name == SEND_MESSAGE_TOOL {
                let text = action
                    .args
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                let attachments = self.resolve_attachments(&action.args);
                self.client
                    .complete_turn(&turn_id, text, false, attachments)
                    .await?;
                return Ok(());
            }

            if is_terminal_tool(&action.name) {
                let final_text = self.request_final_message(&turn_id, &action.name).await?;
                self.client
                    .complete_turn(&turn_id, final_text, true, vec![])
                    .await?;
                return Ok(());
            }

            // An ordinary tool: synthesise its output and keep going.
            let request = SynthesisRequest {
                tool_name: action.name.clone(),
                parameters: action.args.clone(),
                guidance: self
                    .profile
                    .tools
                    .iter()
                    .find(|t| t.tool_name == action.name)
                    .and_then(|t| t.synthesis_guidance.clone()),
                conversation_context: render_history(&snapshot, self.client.agent_id()),
            };
            match self.synthesizer.synthesize(&request).await {
                Ok(value) => {
                    self.client
                        .add_tool_result(&turn_id, &call_id, Some(value), None)
                        .await?;
                }
                Err(e) => {
                    // Contained: the error becomes a trace entry and the
                    // loop continues within its budget.
                    self.client
                        .add_tool_result(&turn_id, &call_id, None, Some(e.to_string()))
                        .await?;
                }
            }
        }

        // Budget exhausted without sending anything.
        *self.budget_exhausted.lock() = true;
        tracing::warn!(
            conversation_id = self.client.conversation_id(),
            agent_id = self.client.agent_id(),
            budget,
            "step budget exhausted without a message"
        );
        self.client
            .complete_turn(&turn_id, MAX_STEPS_MESSAGE, false, vec![])
            .await?;
        Ok(())
    }

    /// Second policy pass after a terminal tool: produce the closing,
    /// user-visible message.
    async fn request_final_message(&self, turn_id: &str, terminal_tool: &str) -> Result<String> {
        let snapshot = self.client.snapshot()?;
        let current_trace = self.client.trace_so_far(turn_id)?;
        let prompt = build_final_prompt(
            &PromptContext {
                profile: &self.profile,
                snapshot: &snapshot,
                own_agent_id: self.client.agent_id(),
                current_trace: &current_trace,
                step: 1,
                total_steps: 1,
            },
            terminal_tool,
        );

        let reply = match self.policy.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                self.client
                    .add_thought(turn_id, format!("LLM request failed: {e}"))
                    .await?;
                return Ok(FALLBACK_FINAL_MESSAGE.to_owned());
            }
        };

        let parsed = parse_policy_reply(&reply);
        if let Some(scratchpad) = &parsed.scratchpad {
            self.client.add_thought(turn_id, scratchpad.clone()).await?;
        }
        let text = match &parsed.action {
            Some(action) if action.name == SEND_MESSAGE_TOOL => action
                .args
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or(FALLBACK_FINAL_MESSAGE)
                .to_owned(),
            _ => parsed.fallback_text(),
        };
        Ok(if text.trim().is_empty() {
            FALLBACK_FINAL_MESSAGE.to_owned()
        } else {
            text
        })
    }

    /// A policy failure closes the turn politely; the conversation is
    /// not ended.
    async fn close_with_apology(&self, turn_id: &str, error: &Error) -> Result<()> {
        tracing::warn!(
            conversation_id = self.client.conversation_id(),
            agent_id = self.client.agent_id(),
            error = %error,
            "policy call failed; closing turn with apology"
        );
        self.client
            .add_thought(turn_id, format!("LLM request failed: {error}"))
            .await?;
        self.client
            .complete_turn(turn_id, APOLOGY_MESSAGE, false, vec![])
            .await?;
        Ok(())
    }

    /// Map `attachments_to_include` doc ids onto the scenario documents
    /// this agent may attach. Unknown ids are skipped.
    fn resolve_attachments(&self, args: &serde_json::Value) -> Vec<AttachmentPayload> {
        let Some(ids) = args.get("attachments_to_include").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        let mut payloads = Vec::new();
        for id in ids.iter().filter_map(|v| v.as_str()) {
            match self.profile.document(id) {
                Some(doc) => payloads.push(AttachmentPayload {
                    name: doc.name.clone(),
                    content_type: doc.content_type.clone(),
                    content: doc.content.clone(),
                    summary: doc.summary.clone(),
                    doc_id: Some(doc.doc_id.clone()),
                }),
                None => {
                    tracing::warn!(
                        agent_id = self.client.agent_id(),
                        doc_id = id,
                        "unknown attachment doc id"
                    );
                }
            }
        }
        payloads
    }
}

#[async_trait::async_trait]
impl AgentStrategy for ScenarioDrivenAgent {
    fn agent_id(&self) -> &str {
        self.client.agent_id()
    }

    /// The opening turn. Explicit instructions become the literal opening
    /// message; otherwise the policy composes it through the step loop.
    async fn initialize_conversation(
        &self,
        additional_instructions: Option<&str>,
    ) -> Result<()> {
        match additional_instructions.filter(|s| !s.trim().is_empty()) {
            Some(text) => {
                let turn_id = self.client.start_turn().await?;
                self.client
                    .complete_turn(&turn_id, text, false, vec![])
                    .await?;
                Ok(())
            }
            None => self.run_reply_turn().await,
        }
    }

    async fn on_conversation_event(&self, envelope: &EventEnvelope) -> Result<()> {
        if is_reply_trigger(envelope, self.client.agent_id()) {
            self.run_reply_turn().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_domain::scenario::ScenarioDocument;
    use cq_policy::{ScriptedPolicy, StaticSynthesizer};

    fn agent_with_docs() -> ScenarioDrivenAgent {
        let profile = ScenarioAgent {
            agent_id: "patient".into(),
            principal: Default::default(),
            system_prompt: String::new(),
            situation: None,
            goals: vec![],
            tools: vec![],
            documents: vec![ScenarioDocument {
                doc_id: "doc1".into(),
                name: "policy.md".into(),
                content_type: "text/markdown".into(),
                content: "# Policy\n- A\n- B\n".into(),
                summary: Some("coverage policy".into()),
            }],
        };
        ScenarioDrivenAgent::new(
            AgentClient::new("c1", "patient", std::sync::Weak::new()),
            profile,
            Arc::new(ScriptedPolicy::empty()),
            Arc::new(StaticSynthesizer::ok()),
            10,
        )
    }

    #[test]
    fn known_doc_ids_resolve_to_payloads() {
        let agent = agent_with_docs();
        let args = serde_json::json!({
            "text": "see attached",
            "attachments_to_include": ["doc1", "doc-missing"]
        });
        let payloads = agent.resolve_attachments(&args);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].name, "policy.md");
        assert_eq!(payloads[0].doc_id.as_deref(), Some("doc1"));
    }

    #[test]
    fn missing_attachment_list_is_empty() {
        let agent = agent_with_docs();
        assert!(agent
            .resolve_attachments(&serde_json::json!({"text": "hi"}))
            .is_empty());
    }
}
