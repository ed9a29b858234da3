use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::turn::{Attachment, ConversationTurn};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Created,
    Active,
    Completed,
}

impl ConversationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Status transitions are monotonic: `created → active → completed`.
    pub fn can_transition_to(self, next: ConversationStatus) -> bool {
        use ConversationStatus::*;
        matches!(
            (self, next),
            (Created, Active) | (Created, Completed) | (Active, Completed)
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent strategy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How an agent's turns are produced.
///
/// The first three strategies are server-managed: the orchestrator
/// instantiates and drives them in-process. The bridge strategies are
/// externally managed; the orchestrator still tracks their turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ScenarioDriven,
    SequentialScript,
    StaticReplay,
    BridgeToExternalCounterpartyAsServer,
    BridgeToExternalCounterpartyAsClient,
}

impl StrategyKind {
    pub fn is_server_managed(self) -> bool {
        matches!(
            self,
            Self::ScenarioDriven | Self::SequentialScript | Self::StaticReplay
        )
    }

    pub fn is_bridge(self) -> bool {
        !self.is_server_managed()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of a scripted strategy's playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEntry {
    pub content: String,
    #[serde(default)]
    pub is_final: bool,
    /// Thoughts replayed as trace entries before the message (static replay).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thoughts: Vec<String>,
}

/// Per-conversation agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub id: String,
    pub strategy_type: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_version: Option<String>,
    #[serde(default)]
    pub should_initiate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    /// Playbook for `sequential_script` / `static_replay` strategies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub script: Vec<ScriptEntry>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, strategy_type: StrategyKind) -> Self {
        Self {
            id: id.into(),
            strategy_type,
            scenario_id: None,
            scenario_version: None,
            should_initiate: false,
            additional_instructions: None,
            script: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: ConversationStatus,
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Conversation {
    pub fn agent(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    /// The agent marked `should_initiate`, if any.
    pub fn initiator(&self) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.should_initiate)
    }

    pub fn has_server_managed_agents(&self) -> bool {
        self.agents.iter().any(|a| a.strategy_type.is_server_managed())
    }

    /// First agent with a bridge strategy, if any.
    pub fn bridged_agent(&self) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.strategy_type.is_bridge())
    }
}

/// Validate an agent set for a new conversation: at least one agent,
/// unique ids, at most one initiator.
pub fn validate_agents(agents: &[AgentConfig]) -> Result<()> {
    if agents.is_empty() {
        return Err(Error::InvalidRequest(
            "a conversation needs at least one agent".into(),
        ));
    }
    let mut seen = HashSet::new();
    for agent in agents {
        if agent.id.trim().is_empty() {
            return Err(Error::InvalidRequest("agent id must not be empty".into()));
        }
        if !seen.insert(agent.id.as_str()) {
            return Err(Error::InvalidRequest(format!(
                "duplicate agent id: {}",
                agent.id
            )));
        }
    }
    let initiators = agents.iter().filter(|a| a.should_initiate).count();
    if initiators > 1 {
        return Err(Error::InvalidRequest(format!(
            "at most one agent may initiate, found {initiators}"
        )));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests and projections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// What to include when projecting a conversation out of the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetConversationOptions {
    pub include_turns: bool,
    pub include_trace: bool,
    pub include_attachments: bool,
}

impl GetConversationOptions {
    pub fn full() -> Self {
        Self {
            include_turns: true,
            include_trace: true,
            include_attachments: true,
        }
    }
}

/// A conversation projection: the record plus (optionally) its turns,
/// their traces, and attachment payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub conversation: Conversation,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> AgentConfig {
        AgentConfig::new(id, StrategyKind::ScenarioDriven)
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use ConversationStatus::*;
        assert!(Created.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Created.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Created));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Created));
    }

    #[test]
    fn validate_rejects_empty_agent_set() {
        assert!(validate_agents(&[]).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let err = validate_agents(&[agent("a"), agent("a")]).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[test]
    fn validate_rejects_two_initiators() {
        let mut a = agent("a");
        a.should_initiate = true;
        let mut b = agent("b");
        b.should_initiate = true;
        assert!(validate_agents(&[a, b]).is_err());
    }

    #[test]
    fn bridge_strategies_are_external() {
        assert!(StrategyKind::ScenarioDriven.is_server_managed());
        assert!(StrategyKind::SequentialScript.is_server_managed());
        assert!(StrategyKind::StaticReplay.is_server_managed());
        assert!(!StrategyKind::BridgeToExternalCounterpartyAsServer.is_server_managed());
        assert!(!StrategyKind::BridgeToExternalCounterpartyAsClient.is_server_managed());
    }

    #[test]
    fn strategy_kind_wire_names() {
        let json = serde_json::to_string(&StrategyKind::BridgeToExternalCounterpartyAsServer)
            .unwrap();
        assert_eq!(json, "\"bridge_to_external_counterparty_as_server\"");
    }
}
