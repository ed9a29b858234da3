//! Prompt assembly for the scenario-driven strategy.
//!
//! One prompt per step: scenario framing, tool catalog, conversation
//! history (own turns with their trace, other agents' turns as
//! `[ts] [agentId]` blocks), and the current turn's trace so far with a
//! "you are here" marker. Exactly one prompt per turn carries the
//! zero-steps banner.

use cq_domain::conversation::ConversationSnapshot;
use cq_domain::scenario::{ScenarioAgent, SEND_MESSAGE_TOOL};
use cq_domain::trace::{TraceEntry, TraceKind};
use cq_domain::turn::TurnStatus;

pub const ZERO_STEPS_BANNER: &str = "0 STEPS REMAINING — send your final reply now";

pub struct PromptContext<'a> {
    pub profile: &'a ScenarioAgent,
    pub snapshot: &'a ConversationSnapshot,
    pub own_agent_id: &'a str,
    pub current_trace: &'a [TraceEntry],
    /// 1-based step number within this turn.
    pub step: usize,
    /// Effective step budget for this turn.
    pub total_steps: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_step_prompt(ctx: &PromptContext) -> String {
    let mut prompt = String::new();

    render_framing(&mut prompt, ctx.profile);
    render_tool_catalog(&mut prompt, ctx.profile);

    prompt.push_str("\n## Conversation so far\n");
    prompt.push_str(&render_history(ctx.snapshot, ctx.own_agent_id));

    prompt.push_str("\n## Current turn\n");
    prompt.push_str(&render_current_step(ctx));

    prompt.push_str(
        "\nReply with your reasoning in a <scratchpad> block, then exactly one \
         tool invocation as a fenced JSON block: {\"name\": \"<tool>\", \"args\": {...}}.\n",
    );
    prompt.push_str(&format!(
        "Use {SEND_MESSAGE_TOOL} when you are ready to speak to the other party.\n"
    ));

    if ctx.step >= ctx.total_steps {
        prompt.push('\n');
        prompt.push_str(ZERO_STEPS_BANNER);
        prompt.push('\n');
    }

    prompt
}

/// The pass after a terminal tool call: ask for the user-visible closing
/// message. The scratchpad may announce "final".
pub fn build_final_prompt(ctx: &PromptContext, terminal_tool: &str) -> String {
    let mut prompt = String::new();

    render_framing(&mut prompt, ctx.profile);

    prompt.push_str("\n## Conversation so far\n");
    prompt.push_str(&render_history(ctx.snapshot, ctx.own_agent_id));

    prompt.push_str("\n## Current turn\n");
    prompt.push_str(&render_trace(ctx.current_trace));

    prompt.push_str(&format!(
        "\nYou invoked {terminal_tool}, which concludes this conversation. \
         Send your final message to the other party now: a <scratchpad> block \
         (it may simply say \"final\"), then a fenced JSON \
         {{\"name\": \"{SEND_MESSAGE_TOOL}\", \"args\": {{\"text\": \"...\"}}}} block.\n"
    ));

    prompt
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn render_framing(out: &mut String, profile: &ScenarioAgent) {
    if !profile.system_prompt.is_empty() {
        out.push_str(&profile.system_prompt);
        out.push('\n');
    }
    if !profile.principal.name.is_empty() {
        out.push_str(&format!(
            "You speak for {}. {}\n",
            profile.principal.name, profile.principal.description
        ));
    }
    if let Some(situation) = &profile.situation {
        out.push_str(&format!("Situation: {situation}\n"));
    }
    if !profile.goals.is_empty() {
        out.push_str("Goals:\n");
        for goal in &profile.goals {
            out.push_str(&format!("- {goal}\n"));
        }
    }
}

fn render_tool_catalog(out: &mut String, profile: &ScenarioAgent) {
    out.push_str("\n## Tools\n");
    out.push_str(&format!(
        "- {SEND_MESSAGE_TOOL}: send a message to the other party. \
         args: {{\"text\": string, \"attachments_to_include\": [docId]?}}\n"
    ));
    for tool in &profile.tools {
        out.push_str(&format!("- {}: {}", tool.tool_name, tool.description));
        if let Some(schema) = &tool.input_schema {
            out.push_str(&format!(" args schema: {schema}"));
        }
        out.push('\n');
    }
}

/// Completed turns, oldest first. Own turns include their trace; other
/// agents' turns render as `[ts] [agentId]` followed by the content.
pub fn render_history(snapshot: &ConversationSnapshot, own_agent_id: &str) -> String {
    let mut out = String::new();
    for turn in &snapshot.turns {
        if turn.status != TurnStatus::Completed {
            continue;
        }
        let ts = turn
            .completed_at
            .unwrap_or(turn.started_at)
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        if turn.agent_id == own_agent_id {
            out.push_str(&format!("[{ts}] [{}] (you)\n", turn.agent_id));
            out.push_str(&render_trace(&turn.trace));
            out.push_str(&format!("{}\n\n", turn.content));
        } else {
            out.push_str(&format!("[{ts}] [{}]\n{}\n\n", turn.agent_id, turn.content));
        }
    }
    if out.is_empty() {
        out.push_str("(no messages yet)\n");
    }
    out
}

fn render_current_step(ctx: &PromptContext) -> String {
    let mut out = render_trace(ctx.current_trace);
    out.push_str(&format!(
        "<- you are here (step {} of {})\n",
        ctx.step, ctx.total_steps
    ));
    out
}

fn render_trace(entries: &[TraceEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match &entry.kind {
            TraceKind::Thought { content } => {
                out.push_str(&format!("  thought: {content}\n"));
            }
            TraceKind::ToolCall {
                tool_name,
                parameters,
                ..
            } => {
                out.push_str(&format!("  tool_call: {tool_name} {parameters}\n"));
            }
            TraceKind::ToolResult { result, error, .. } => match error {
                Some(e) => out.push_str(&format!("  tool_result: error: {e}\n")),
                None => out.push_str(&format!(
                    "  tool_result: {}\n",
                    result.clone().unwrap_or(serde_json::Value::Null)
                )),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cq_domain::conversation::{Conversation, ConversationStatus};
    use cq_domain::scenario::Principal;
    use cq_domain::turn::ConversationTurn;

    fn profile() -> ScenarioAgent {
        ScenarioAgent {
            agent_id: "patient".into(),
            principal: Principal {
                name: "Pat Smith".into(),
                description: "a patient".into(),
            },
            system_prompt: "You are calling about an MRI authorization.".into(),
            situation: None,
            goals: vec!["Get the MRI approved".into()],
            tools: vec![],
            documents: vec![],
        }
    }

    fn snapshot() -> ConversationSnapshot {
        let mut own = ConversationTurn::new_in_progress("c1", "patient", None);
        own.status = TurnStatus::Completed;
        own.completed_at = Some(Utc::now());
        own.content = "Hello".into();
        let mut other = ConversationTurn::new_in_progress("c1", "supplier", None);
        other.status = TurnStatus::Completed;
        other.completed_at = Some(Utc::now());
        other.content = "Hi, processing.".into();
        ConversationSnapshot {
            conversation: Conversation {
                id: "c1".into(),
                created_at: Utc::now(),
                status: ConversationStatus::Active,
                agents: vec![],
                metadata: serde_json::Value::Null,
            },
            turns: vec![own, other],
            attachments: vec![],
        }
    }

    fn ctx<'a>(
        profile: &'a ScenarioAgent,
        snapshot: &'a ConversationSnapshot,
        step: usize,
    ) -> PromptContext<'a> {
        PromptContext {
            profile,
            snapshot,
            own_agent_id: "patient",
            current_trace: &[],
            step,
            total_steps: 10,
        }
    }

    #[test]
    fn banner_only_on_the_last_step() {
        let profile = profile();
        let snapshot = snapshot();
        for step in 1..=9 {
            let prompt = build_step_prompt(&ctx(&profile, &snapshot, step));
            assert!(
                !prompt.contains(ZERO_STEPS_BANNER),
                "step {step} must not carry the banner"
            );
        }
        let prompt = build_step_prompt(&ctx(&profile, &snapshot, 10));
        assert!(prompt.contains(ZERO_STEPS_BANNER));
    }

    #[test]
    fn history_renders_other_agents_as_headers() {
        let prompt = build_step_prompt(&ctx(&profile(), &snapshot(), 1));
        assert!(prompt.contains("[supplier]\nHi, processing."));
        assert!(prompt.contains("(you)"));
        assert!(prompt.contains("Hello"));
    }

    #[test]
    fn you_are_here_marker_present() {
        let prompt = build_step_prompt(&ctx(&profile(), &snapshot(), 3));
        assert!(prompt.contains("<- you are here (step 3 of 10)"));
    }

    #[test]
    fn final_prompt_names_the_terminal_tool() {
        let profile = profile();
        let snapshot = snapshot();
        let prompt = build_final_prompt(&ctx(&profile, &snapshot, 1), "mri_authorization_Success");
        assert!(prompt.contains("mri_authorization_Success"));
        assert!(prompt.contains(SEND_MESSAGE_TOOL));
        assert!(!prompt.contains(ZERO_STEPS_BANNER));
    }
}
