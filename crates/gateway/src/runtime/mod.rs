//! Server-managed agent runtime.
//!
//! Each provisioned agent is a tokio task draining its bus subscription;
//! strategies react to `turn_completed` events from other agents and
//! produce turns through the narrow [`AgentClient`] handle.

pub mod client;
pub mod prompt;
pub mod replay;
pub mod scenario;
pub mod script;

use std::sync::Arc;

use cq_domain::conversation::{AgentConfig, Conversation, StrategyKind};
use cq_domain::error::{Error, Result};
use cq_domain::event::{ConversationEvent, EventEnvelope, EventFilter};

use crate::orchestrator::Orchestrator;

pub use client::AgentClient;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The narrow interface every server-managed strategy exposes to the
/// orchestrator.
#[async_trait::async_trait]
pub trait AgentStrategy: Send + Sync {
    fn agent_id(&self) -> &str;

    /// Called only on the agent marked `should_initiate`, after
    /// provisioning.
    async fn initialize_conversation(
        &self,
        additional_instructions: Option<&str>,
    ) -> Result<()>;

    /// Reactive entry point; invoked sequentially per agent.
    async fn on_conversation_event(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// A provisioned agent: the strategy instance plus its strategy kind.
/// The driving task is detached; it exits when the conversation ends.
pub struct AgentHandle {
    pub instance: Arc<dyn AgentStrategy>,
    pub kind: StrategyKind,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provisioning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Instantiate one server-managed agent, subscribe it to its
/// conversation, and spawn its event loop.
pub fn provision_agent(
    orch: &Arc<Orchestrator>,
    conversation: &Conversation,
    cfg: &AgentConfig,
) -> Result<AgentHandle> {
    let client = AgentClient::new(&conversation.id, &cfg.id, Arc::downgrade(orch));

    let instance: Arc<dyn AgentStrategy> = match cfg.strategy_type {
        StrategyKind::ScenarioDriven => {
            let scenario_id = cfg.scenario_id.as_deref().ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "agent {} is scenario-driven but has no scenario id",
                    cfg.id
                ))
            })?;
            let scenario = orch
                .scenarios()
                .get(scenario_id, cfg.scenario_version.as_deref())
                .ok_or_else(|| Error::NotFound(format!("scenario {scenario_id}")))?;
            let profile = scenario.agent(&cfg.id).ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "agent {} is not defined by scenario {scenario_id}",
                    cfg.id
                ))
            })?;
            Arc::new(scenario::ScenarioDrivenAgent::new(
                client,
                profile.clone(),
                orch.policy(),
                orch.synthesizer(),
                orch.config().runtime.max_steps_per_turn,
            ))
        }
        StrategyKind::SequentialScript => {
            Arc::new(script::ScriptAgent::new(client, cfg.script.clone()))
        }
        StrategyKind::StaticReplay => {
            Arc::new(replay::ReplayAgent::new(client, cfg.script.clone()))
        }
        other => {
            return Err(Error::InvalidRequest(format!(
                "strategy {other:?} is externally managed"
            )))
        }
    };

    spawn_agent_loop(orch, &conversation.id, instance.clone());

    tracing::debug!(
        conversation_id = %conversation.id,
        agent_id = %cfg.id,
        strategy = ?cfg.strategy_type,
        "agent provisioned"
    );

    Ok(AgentHandle {
        instance,
        kind: cfg.strategy_type,
    })
}

/// The agent's event loop: drain the subscription until the conversation
/// ends. Strategy errors are contained and logged.
fn spawn_agent_loop(
    orch: &Arc<Orchestrator>,
    conversation_id: &str,
    instance: Arc<dyn AgentStrategy>,
) {
    let (_sub, mut rx) = orch.subscribe(conversation_id, EventFilter::default());
    let conversation_id = conversation_id.to_owned();
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let ended = matches!(envelope.event, ConversationEvent::ConversationEnded {});
            if let Err(e) = instance.on_conversation_event(&envelope).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    agent_id = %instance.agent_id(),
                    event = envelope.event.event_type(),
                    error = %e,
                    "agent failed to handle event"
                );
            }
            if ended {
                break;
            }
        }
        tracing::debug!(
            conversation_id = %conversation_id,
            agent_id = %instance.agent_id(),
            "agent loop exited"
        );
    });
}

/// Whether a completed turn from another agent calls for a reply.
pub(crate) fn is_reply_trigger(envelope: &EventEnvelope, own_agent_id: &str) -> bool {
    match &envelope.event {
        ConversationEvent::TurnCompleted { turn } => {
            turn.agent_id != own_agent_id && !turn.is_final_turn
        }
        _ => false,
    }
}
