use serde::{Deserialize, Serialize};

/// Tool name that turns a step-loop iteration into the user-visible reply.
pub const SEND_MESSAGE_TOOL: &str = "send_message_to_agent_conversation";

/// Tool-name suffixes that end the conversation when invoked.
pub const TERMINAL_TOOL_SUFFIXES: [&str; 5] =
    ["Success", "Approval", "Failure", "Denial", "NoSlots"];

/// Whether invoking this tool produces a final turn.
pub fn is_terminal_tool(name: &str) -> bool {
    TERMINAL_TOOL_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario records (read-only to the core)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub agents: Vec<ScenarioAgent>,
}

impl Scenario {
    pub fn agent(&self, agent_id: &str) -> Option<&ScenarioAgent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }
}

/// The party an agent speaks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioAgent {
    pub agent_id: String,
    #[serde(default)]
    pub principal: Principal,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub tools: Vec<ScenarioTool>,
    /// Documents this agent may attach via `attachments_to_include`.
    #[serde(default)]
    pub documents: Vec<ScenarioDocument>,
}

impl ScenarioAgent {
    pub fn document(&self, doc_id: &str) -> Option<&ScenarioDocument> {
        self.documents.iter().find(|d| d.doc_id == doc_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioTool {
    pub tool_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    /// Guidance handed to the tool-result synthesiser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis_guidance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDocument {
    pub doc_id: String,
    pub name: String,
    pub content_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
