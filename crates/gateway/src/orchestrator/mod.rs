//! The conversation orchestrator.
//!
//! Owns the turn state machine, the durable log, the event bus, the token
//! registry, and the in-memory projection of live conversations. Agents
//! and the bridge reach it through narrow handles; the orchestrator is
//! the only process-wide singleton, with an explicit `start`/`close`
//! lifecycle.

pub mod bus;
pub mod locks;
pub mod queries;
pub mod tokens;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use cq_domain::config::Config;
use cq_domain::conversation::{
    Conversation, ConversationSnapshot, ConversationStatus, CreateConversationRequest,
    GetConversationOptions,
};
use cq_domain::error::{Error, Result};
use cq_domain::event::{ConversationEvent, EventEnvelope, EventFilter};
use cq_domain::query::{UserQuery, UserQueryStatus};
use cq_domain::trace::{TraceEntry, TraceKind, ATTACHMENT_CREATION_CALL_ID};
use cq_domain::turn::{Attachment, AttachmentPayload, ConversationTurn};
use cq_policy::{CompletionPolicy, ToolSynthesizer};
use cq_store::{ConversationStore, ScenarioStore};

use crate::runtime::{provision_agent, AgentHandle, AgentStrategy};

use bus::{EventBus, SubscriptionId};
use locks::ConversationLockMap;
use queries::UserQueryBroker;
use tokens::TokenRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResult {
    pub conversation: Conversation,
    /// agent id → bearer token. Returned once; never re-readable.
    pub agent_tokens: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CompleteTurn {
    pub conversation_id: String,
    pub turn_id: String,
    pub agent_id: String,
    pub content: String,
    pub is_final_turn: bool,
    pub metadata: Option<serde_json::Value>,
    pub attachments: Vec<AttachmentPayload>,
}

/// Live in-memory state for one conversation.
struct LiveConversation {
    agents: HashMap<String, AgentHandle>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    /// Self-handle minted by `Arc::new_cyclic`; agents and background
    /// tasks hold downgraded copies so ownership stays one-directional.
    weak_self: Weak<Orchestrator>,
    config: Arc<Config>,
    store: Arc<ConversationStore>,
    scenarios: Arc<ScenarioStore>,
    policy: Arc<dyn CompletionPolicy>,
    synthesizer: Arc<dyn ToolSynthesizer>,
    bus: EventBus,
    tokens: TokenRegistry,
    query_broker: UserQueryBroker,
    locks: ConversationLockMap,
    live: RwLock<HashMap<String, LiveConversation>>,
    /// (conversation id, agent id) → open turn id. Double-completion guard.
    in_progress: RwLock<HashMap<(String, String), String>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<ConversationStore>,
        scenarios: Arc<ScenarioStore>,
        policy: Arc<dyn CompletionPolicy>,
        synthesizer: Arc<dyn ToolSynthesizer>,
    ) -> Arc<Self> {
        let tokens = TokenRegistry::new(store.clone(), config.lifecycle.token_ttl_hours);
        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            config,
            store,
            scenarios,
            policy,
            synthesizer,
            bus: EventBus::new(),
            tokens,
            query_broker: UserQueryBroker::new(),
            locks: ConversationLockMap::new(),
            live: RwLock::new(HashMap::new()),
            in_progress: RwLock::new(HashMap::new()),
        })
    }

    /// A strong self-handle. Valid while any caller holds the
    /// orchestrator, which is always the case inside a method.
    fn strong(&self) -> Arc<Orchestrator> {
        self.weak_self.upgrade().expect("orchestrator alive")
    }

    /// Downgraded self-handle for agents and background tasks.
    pub(crate) fn weak(&self) -> Weak<Orchestrator> {
        self.weak_self.clone()
    }

    // ── Accessors used by the runtime and bridge ─────────────────────

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn scenarios(&self) -> &Arc<ScenarioStore> {
        &self.scenarios
    }

    pub fn policy(&self) -> Arc<dyn CompletionPolicy> {
        self.policy.clone()
    }

    pub fn synthesizer(&self) -> Arc<dyn ToolSynthesizer> {
        self.synthesizer.clone()
    }

    pub fn validate_token(&self, token: &str) -> Option<(String, String)> {
        self.tokens.validate(token)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Resurrect recently-active conversations and start the periodic
    /// token sweep. Call once after construction.
    pub async fn start(&self) -> Result<()> {
        let lookback = self.config.lifecycle.lookback_hours;
        let closed = self.store.mark_stale_conversations_inactive(lookback)?;
        if !closed.is_empty() {
            tracing::info!(count = closed.len(), "closed stale conversations at startup");
        }

        let recent = self
            .store
            .get_active_conversations_with_recent_activity(lookback);
        for conversation_id in &recent {
            if let Err(e) = self.ensure_conversation(conversation_id).await {
                tracing::warn!(
                    conversation_id,
                    error = %e,
                    "failed to resurrect conversation"
                );
            }
        }
        tracing::info!(resurrected = recent.len(), "orchestrator started");

        let weak = self.weak();
        let interval = Duration::from_secs(self.config.lifecycle.token_sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(orch) = weak.upgrade() else { break };
                match orch.tokens.sweep_expired() {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(removed = n, "swept expired tokens"),
                    Err(e) => tracing::warn!(error = %e, "token sweep failed"),
                }
                orch.locks.prune_idle();
            }
        });

        Ok(())
    }

    /// Broadcast `conversation_ended` to every live conversation and drop
    /// in-memory state. The durable log is untouched, so a restart
    /// resurrects what was active.
    pub async fn close(&self) {
        let ids: Vec<String> = self.live.read().keys().cloned().collect();
        for conversation_id in ids {
            self.bus
                .publish(&conversation_id, ConversationEvent::ConversationEnded {});
        }
        self.live.write().clear();
        self.in_progress.write().clear();
        tracing::info!("orchestrator closed");
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(
        &self,
        topic: &str,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<EventEnvelope>) {
        self.bus.subscribe(topic, filter)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.bus.unsubscribe(id)
    }

    // ── Conversations ────────────────────────────────────────────────

    /// Validate, persist in `created`, mint one token per agent, and
    /// initialise in-memory state without starting any agent.
    pub async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> Result<CreateConversationResult> {
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            status: ConversationStatus::Created,
            agents: request.agents,
            metadata: request.metadata,
        };
        self.store.create_conversation(conversation.clone())?;

        let mut agent_tokens = HashMap::new();
        for agent in &conversation.agents {
            let token = self.tokens.issue(&conversation.id, &agent.id)?;
            agent_tokens.insert(agent.id.clone(), token);
        }

        self.live.write().insert(
            conversation.id.clone(),
            LiveConversation {
                agents: HashMap::new(),
            },
        );

        tracing::info!(
            conversation_id = %conversation.id,
            agents = conversation.agents.len(),
            "conversation created"
        );
        self.bus.publish(
            &conversation.id,
            ConversationEvent::ConversationCreated {
                conversation: conversation.clone(),
            },
        );

        Ok(CreateConversationResult {
            conversation,
            agent_tokens,
        })
    }

    /// `created → active`; provision server-managed agents; kick the
    /// initiator. Requires a server-managed agent unless `agent_ids` is
    /// explicit.
    pub async fn start_conversation(
        &self,
        conversation_id: &str,
        agent_ids: Option<Vec<String>>,
    ) -> Result<()> {
        let initiator = {
            let _permit = self.locks.acquire(conversation_id).await;

            let snapshot = self
                .store
                .get_conversation(conversation_id, GetConversationOptions::default())?;
            let conversation = snapshot.conversation;

            match conversation.status {
                ConversationStatus::Created => {}
                ConversationStatus::Active => {
                    return Err(Error::Conflict(format!(
                        "conversation {conversation_id} already started"
                    )))
                }
                ConversationStatus::Completed => {
                    return Err(Error::Conflict(format!(
                        "conversation {conversation_id} already completed"
                    )))
                }
            }

            if !conversation.has_server_managed_agents() && agent_ids.is_none() {
                return Err(Error::InvalidRequest(
                    "conversation has no server-managed agents; it activates on its first turn"
                        .into(),
                ));
            }
            if let Some(ids) = &agent_ids {
                for id in ids {
                    if conversation.agent(id).is_none() {
                        return Err(Error::NotFound(format!(
                            "agent {id} in conversation {conversation_id}"
                        )));
                    }
                }
            }

            let conversation = self
                .store
                .update_conversation_status(conversation_id, ConversationStatus::Active)?;

            self.provision_server_managed(&conversation)?;

            self.bus.publish(
                conversation_id,
                ConversationEvent::ConversationReady {
                    conversation: conversation.clone(),
                },
            );
            tracing::info!(conversation_id, "conversation ready");

            conversation.initiator().cloned()
        };

        // Outside the conversation lock: the initiator opens a turn.
        if let Some(initiator) = initiator {
            if initiator.strategy_type.is_server_managed() {
                let instance = self
                    .get_agent_instance(conversation_id, &initiator.id)
                    .ok_or_else(|| {
                        Error::Internal(format!("initiator {} not provisioned", initiator.id))
                    })?;
                instance
                    .initialize_conversation(initiator.additional_instructions.as_deref())
                    .await?;
            }
        }

        Ok(())
    }

    pub fn get_conversation(
        &self,
        conversation_id: &str,
        opts: GetConversationOptions,
    ) -> Result<ConversationSnapshot> {
        self.store.get_conversation(conversation_id, opts)
    }

    /// `completed` is terminal: emit `conversation_ended`, drop in-memory
    /// state, revoke tokens.
    pub async fn end_conversation(&self, conversation_id: &str) -> Result<()> {
        {
            let _permit = self.locks.acquire(conversation_id).await;
            let snapshot = self
                .store
                .get_conversation(conversation_id, GetConversationOptions::default())?;
            if snapshot.conversation.status == ConversationStatus::Completed {
                return Ok(());
            }
            self.store
                .update_conversation_status(conversation_id, ConversationStatus::Completed)?;
            self.in_progress
                .write()
                .retain(|(conv, _), _| conv != conversation_id);
            self.bus
                .publish(conversation_id, ConversationEvent::ConversationEnded {});
        }
        self.live.write().remove(conversation_id);
        self.tokens.revoke_conversation(conversation_id)?;
        tracing::info!(conversation_id, "conversation ended");
        Ok(())
    }

    // ── Turn state machine ───────────────────────────────────────────

    /// Open an in-progress turn. On an all-external conversation the
    /// first turn activates it (exactly one `created → active` transition
    /// under the conversation lock).
    pub async fn start_turn(
        &self,
        conversation_id: &str,
        agent_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<String> {
        let _permit = self.locks.acquire(conversation_id).await;

        let snapshot = self
            .store
            .get_conversation(conversation_id, GetConversationOptions::default())?;
        let conversation = snapshot.conversation;
        if conversation.agent(agent_id).is_none() {
            return Err(Error::NotFound(format!(
                "agent {agent_id} in conversation {conversation_id}"
            )));
        }

        match conversation.status {
            ConversationStatus::Completed => {
                return Err(Error::Conflict(format!(
                    "conversation {conversation_id} is completed"
                )))
            }
            ConversationStatus::Created => {
                if conversation.has_server_managed_agents() {
                    return Err(Error::Conflict(format!(
                        "conversation {conversation_id} has not been started"
                    )));
                }
                // First-turn activation for all-external conversations.
                let conversation = self
                    .store
                    .update_conversation_status(conversation_id, ConversationStatus::Active)?;
                self.bus.publish(
                    conversation_id,
                    ConversationEvent::ConversationReady { conversation },
                );
            }
            ConversationStatus::Active => {}
        }

        // One in-progress turn per conversation at a time.
        {
            let index = self.in_progress.read();
            if let Some(((_, open_agent), _)) = index
                .iter()
                .find(|((conv, _), _)| conv == conversation_id)
                .map(|(k, v)| (k.clone(), v.clone()))
            {
                return Err(Error::Conflict(format!(
                    "agent {open_agent} already has an in-progress turn in {conversation_id}"
                )));
            }
        }

        let turn = ConversationTurn::new_in_progress(conversation_id, agent_id, metadata);
        let turn_id = turn.id.clone();
        self.store.start_turn(turn.clone())?;
        self.in_progress.write().insert(
            (conversation_id.to_owned(), agent_id.to_owned()),
            turn_id.clone(),
        );

        tracing::debug!(conversation_id, agent_id, turn_id = %turn_id, "turn started");
        self.bus
            .publish(conversation_id, ConversationEvent::TurnStarted { turn });

        Ok(turn_id)
    }

    /// Stamp and persist a trace entry, then emit `trace_added` with the
    /// turn shell plus the derived `agent_thinking` / `tool_executing`
    /// events.
    pub async fn add_trace_entry(
        &self,
        conversation_id: &str,
        turn_id: &str,
        agent_id: &str,
        kind: TraceKind,
    ) -> Result<TraceEntry> {
        let _permit = self.locks.acquire(conversation_id).await;

        let turn = self.store.get_turn(turn_id)?;
        if turn.conversation_id != conversation_id {
            return Err(Error::TurnNotFound(format!(
                "turn {turn_id} does not belong to conversation {conversation_id}"
            )));
        }
        if turn.agent_id != agent_id {
            return Err(Error::PermissionDenied(format!(
                "turn {turn_id} belongs to agent {}",
                turn.agent_id
            )));
        }

        let entry = TraceEntry::stamped(turn_id, agent_id, kind);
        self.store.add_trace_entry(entry.clone())?;
        self.publish_trace_added(conversation_id, turn_id, entry.clone());
        Ok(entry)
    }

    fn publish_trace_added(&self, conversation_id: &str, turn_id: &str, entry: TraceEntry) {
        // The event carries the turn shell, never the accumulated trace.
        let shell = match self.store.get_turn(turn_id) {
            Ok(turn) => turn.shell(),
            Err(_) => return,
        };
        let derived = ConversationEvent::derived_from_trace(&entry);
        self.bus.publish(
            conversation_id,
            ConversationEvent::TraceAdded {
                turn: shell,
                trace: entry,
            },
        );
        if let Some(event) = derived {
            self.bus.publish(conversation_id, event);
        }
    }

    /// Seal a turn. Embedded attachment payloads are persisted in the
    /// same atomic store mutation; each one leaves an
    /// `attachment_creation` tool-result in the trace. A final turn ends
    /// the conversation.
    pub async fn complete_turn(&self, args: CompleteTurn) -> Result<ConversationTurn> {
        let sealed = {
            let _permit = self.locks.acquire(&args.conversation_id).await;

            let key = (args.conversation_id.clone(), args.agent_id.clone());
            match self.in_progress.read().get(&key) {
                Some(open) if *open == args.turn_id => {}
                _ => {
                    return Err(Error::TurnNotFound(format!(
                        "turn {} is not open for agent {}",
                        args.turn_id, args.agent_id
                    )))
                }
            }

            let mut attachments = Vec::with_capacity(args.attachments.len());
            for payload in &args.attachments {
                let attachment = Attachment {
                    id: uuid::Uuid::new_v4().to_string(),
                    conversation_id: args.conversation_id.clone(),
                    turn_id: args.turn_id.clone(),
                    doc_id: payload
                        .doc_id
                        .clone()
                        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                    name: payload.name.clone(),
                    content_type: payload.content_type.clone(),
                    content: payload.content.clone(),
                    summary: payload.summary.clone(),
                    created_by_agent_id: args.agent_id.clone(),
                    created_at: Utc::now(),
                };
                let entry = TraceEntry::stamped(
                    &args.turn_id,
                    &args.agent_id,
                    TraceKind::ToolResult {
                        tool_call_id: ATTACHMENT_CREATION_CALL_ID.into(),
                        result: Some(serde_json::json!({
                            "attachmentId": attachment.id,
                            "name": attachment.name,
                        })),
                        error: None,
                    },
                );
                self.store.add_trace_entry(entry.clone())?;
                self.publish_trace_added(&args.conversation_id, &args.turn_id, entry);
                attachments.push(attachment);
            }

            let sealed = self.store.complete_turn(
                &args.turn_id,
                args.content,
                args.is_final_turn,
                args.metadata,
                attachments,
            )?;
            self.in_progress.write().remove(&key);

            tracing::debug!(
                conversation_id = %args.conversation_id,
                agent_id = %args.agent_id,
                turn_id = %args.turn_id,
                is_final = args.is_final_turn,
                "turn completed"
            );
            self.bus.publish(
                &args.conversation_id,
                ConversationEvent::TurnCompleted {
                    turn: sealed.clone(),
                },
            );
            sealed
        };

        if sealed.is_final_turn {
            self.end_conversation(&args.conversation_id).await?;
        }
        Ok(sealed)
    }

    /// Operator escape hatch: mark a turn cancelled and release its slot.
    pub async fn cancel_turn(&self, turn_id: &str) -> Result<()> {
        let turn = self.store.get_turn(turn_id)?;
        let conversation_id = turn.conversation_id.clone();
        let _permit = self.locks.acquire(&conversation_id).await;

        let cancelled = self.store.cancel_turn(turn_id)?;
        self.in_progress
            .write()
            .remove(&(conversation_id.clone(), cancelled.agent_id.clone()));

        tracing::info!(conversation_id = %conversation_id, turn_id, "turn cancelled");
        self.bus.publish(
            &conversation_id,
            ConversationEvent::TurnCancelled {
                turn_id: turn_id.to_owned(),
                agent_id: cancelled.agent_id,
            },
        );
        Ok(())
    }

    // ── User queries ─────────────────────────────────────────────────

    /// Raise a question to a human. Returns the query id and a receiver
    /// that resolves with the response (or errors on expiry).
    pub async fn create_user_query(
        &self,
        conversation_id: &str,
        agent_id: &str,
        question: &str,
        context: Option<serde_json::Value>,
    ) -> Result<(String, oneshot::Receiver<String>)> {
        let query = UserQuery::new(conversation_id, agent_id, question, context);
        let query_id = query.id.clone();
        self.store.insert_user_query(query.clone())?;
        let receiver = self.query_broker.register(&query_id);

        self.bus.publish(
            conversation_id,
            ConversationEvent::UserQueryCreated { query },
        );

        let weak = self.weak();
        let timeout = Duration::from_secs(self.config.runtime.user_query_timeout_secs);
        let expire_id = query_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(orch) = weak.upgrade() else { return };
            if orch.query_broker.expire(&expire_id) {
                if let Err(e) = orch.store.set_user_query_expired(&expire_id) {
                    tracing::warn!(query_id = %expire_id, error = %e, "failed to expire query");
                } else {
                    tracing::info!(query_id = %expire_id, "user query expired");
                }
            }
        });

        Ok((query_id, receiver))
    }

    /// Deliver a response; a pending query is consumed at most once.
    pub async fn respond_to_user_query(&self, query_id: &str, response: &str) -> Result<()> {
        let query = self.store.get_user_query(query_id)?;
        if query.status != UserQueryStatus::Pending {
            return Err(Error::Conflict(format!(
                "query {query_id} is not pending"
            )));
        }
        self.query_broker.resolve(query_id, response);
        let updated = self.store.set_user_query_answered(query_id, response)?;
        self.bus.publish(
            &updated.conversation_id,
            ConversationEvent::UserQueryAnswered {
                query_id: query_id.to_owned(),
                response: response.to_owned(),
                context: updated.context.clone(),
            },
        );
        Ok(())
    }

    pub fn get_user_query_status(&self, query_id: &str) -> Result<UserQuery> {
        self.store.get_user_query(query_id)
    }

    // ── Agent instances & rehydration ────────────────────────────────

    /// A live server-managed agent, if the conversation is resident.
    pub fn get_agent_instance(
        &self,
        conversation_id: &str,
        agent_id: &str,
    ) -> Option<Arc<dyn AgentStrategy>> {
        self.live
            .read()
            .get(conversation_id)?
            .agents
            .get(agent_id)
            .map(|h| h.instance.clone())
    }

    /// Like `get_agent_instance`, but rehydrates the conversation on a
    /// cache miss. Fails for externally-managed agents.
    pub async fn ensure_agent_instance(
        &self,
        conversation_id: &str,
        agent_id: &str,
    ) -> Result<Arc<dyn AgentStrategy>> {
        self.ensure_conversation(conversation_id).await?;
        if let Some(instance) = self.get_agent_instance(conversation_id, agent_id) {
            return Ok(instance);
        }
        let snapshot = self
            .store
            .get_conversation(conversation_id, GetConversationOptions::default())?;
        match snapshot.conversation.agent(agent_id) {
            Some(cfg) if cfg.strategy_type.is_bridge() => Err(Error::InvalidRequest(format!(
                "agent {agent_id} is externally managed"
            ))),
            Some(_) => Err(Error::Internal(format!(
                "agent {agent_id} failed to provision"
            ))),
            None => Err(Error::NotFound(format!(
                "agent {agent_id} in conversation {conversation_id}"
            ))),
        }
    }

    /// Rebuild the in-memory projection from the store on a cache miss:
    /// re-instantiate server-managed agents and emit `rehydrated` with
    /// the full snapshot.
    pub async fn ensure_conversation(&self, conversation_id: &str) -> Result<()> {
        if self.live.read().contains_key(conversation_id) {
            return Ok(());
        }

        let _permit = self.locks.acquire(conversation_id).await;
        if self.live.read().contains_key(conversation_id) {
            return Ok(());
        }

        let snapshot = self
            .store
            .get_conversation(conversation_id, GetConversationOptions::full())?;

        let agents = if snapshot.conversation.status == ConversationStatus::Active {
            self.build_server_managed(&snapshot.conversation)
        } else {
            HashMap::new()
        };

        // Restore the open-turn index from the durable log.
        {
            let mut index = self.in_progress.write();
            for turn in self.store.get_in_progress_turns(conversation_id) {
                index.insert(
                    (conversation_id.to_owned(), turn.agent_id.clone()),
                    turn.id.clone(),
                );
            }
        }

        self.live
            .write()
            .insert(conversation_id.to_owned(), LiveConversation { agents });

        tracing::info!(
            conversation_id,
            turns = snapshot.turns.len(),
            "conversation rehydrated"
        );
        self.bus.publish(
            conversation_id,
            ConversationEvent::Rehydrated { snapshot },
        );
        Ok(())
    }

    /// Provision server-managed agents into the live map, failing the
    /// call on the first broken agent config.
    fn provision_server_managed(&self, conversation: &Conversation) -> Result<()> {
        let mut agents = HashMap::new();
        for cfg in &conversation.agents {
            if !cfg.strategy_type.is_server_managed() {
                continue;
            }
            let handle = provision_agent(&self.strong(), conversation, cfg)?;
            agents.insert(cfg.id.clone(), handle);
        }
        let mut live = self.live.write();
        let entry = live
            .entry(conversation.id.clone())
            .or_insert_with(|| LiveConversation {
                agents: HashMap::new(),
            });
        entry.agents = agents;
        Ok(())
    }

    /// Best-effort variant used by rehydration: a broken agent is logged
    /// and skipped rather than failing the whole conversation.
    fn build_server_managed(
        &self,
        conversation: &Conversation,
    ) -> HashMap<String, AgentHandle> {
        let mut agents = HashMap::new();
        for cfg in &conversation.agents {
            if !cfg.strategy_type.is_server_managed() {
                continue;
            }
            match provision_agent(&self.strong(), conversation, cfg) {
                Ok(handle) => {
                    agents.insert(cfg.id.clone(), handle);
                }
                Err(e) => {
                    tracing::warn!(
                        conversation_id = %conversation.id,
                        agent_id = %cfg.id,
                        error = %e,
                        "failed to rehydrate agent"
                    );
                }
            }
        }
        agents
    }
}
