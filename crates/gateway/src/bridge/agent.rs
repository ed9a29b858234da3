//! The bridge agent: an external counterparty's voice inside a
//! conversation.
//!
//! No policy. Two rendezvous with at-most-one-in-flight semantics:
//! speak-then-wait (`bridge_external_client_turn`) and wait-only
//! (`wait_for_pending_reply`). Replies that arrive after a timeout are
//! buffered, so the next wait returns them — nothing is dropped. A
//! watcher task follows the conversation to keep counterparty liveness
//! stats current.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore, TryAcquireError};

use cq_domain::bridge::{BridgeReply, ReplyAttachment, ReplyStatus};
use cq_domain::error::{Error, Result};
use cq_domain::event::{ConversationEvent, EventFilter};
use cq_domain::turn::AttachmentPayload;

use crate::orchestrator::{CompleteTurn, Orchestrator};

#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    pub action_count: u64,
    pub last_action_at: Option<DateTime<Utc>>,
    pub last_action_type: Option<String>,
}

pub struct BridgeAgent {
    conversation_id: String,
    agent_id: String,
    orch: Weak<Orchestrator>,
    /// One outstanding rendezvous at a time.
    gate: Arc<Semaphore>,
    /// Buffered counterparty replies, oldest first.
    replies: tokio::sync::Mutex<mpsc::UnboundedReceiver<BridgeReply>>,
    stats: Arc<Mutex<BridgeStats>>,
}

impl BridgeAgent {
    /// Create the agent and spawn its conversation watcher.
    pub fn new(orch: &Arc<Orchestrator>, conversation_id: &str, agent_id: &str) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(BridgeStats::default()));

        let agent = Arc::new(Self {
            conversation_id: conversation_id.to_owned(),
            agent_id: agent_id.to_owned(),
            orch: Arc::downgrade(orch),
            gate: Arc::new(Semaphore::new(1)),
            replies: tokio::sync::Mutex::new(rx),
            stats: stats.clone(),
        });

        spawn_watcher(
            orch,
            conversation_id.to_owned(),
            agent_id.to_owned(),
            tx,
            stats,
        );
        agent
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats.lock().clone()
    }

    /// The external counterparty speaks: open and complete a turn with
    /// the incoming content, then wait for the next reply from any other
    /// agent.
    pub async fn bridge_external_client_turn(
        &self,
        text: &str,
        attachments: Vec<AttachmentPayload>,
        timeout: Duration,
    ) -> Result<BridgeReply> {
        let _permit = self.try_enter()?;
        let orch = self.orch()?;

        let turn_id = orch
            .start_turn(&self.conversation_id, &self.agent_id, None)
            .await?;
        orch.complete_turn(CompleteTurn {
            conversation_id: self.conversation_id.clone(),
            turn_id,
            agent_id: self.agent_id.clone(),
            content: text.to_owned(),
            is_final_turn: false,
            metadata: None,
            attachments,
        })
        .await?;

        self.wait_reply(timeout).await
    }

    /// Poll for a pending reply without speaking.
    pub async fn wait_for_pending_reply(&self, timeout: Duration) -> Result<BridgeReply> {
        let _permit = self.try_enter()?;
        self.wait_reply(timeout).await
    }

    fn try_enter(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        match self.gate.clone().try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => Err(Error::Conflict(
                "a bridge request is already in flight".into(),
            )),
            Err(TryAcquireError::Closed) => {
                Err(Error::Internal("bridge gate closed".into()))
            }
        }
    }

    async fn wait_reply(&self, timeout: Duration) -> Result<BridgeReply> {
        let mut replies = self.replies.lock().await;
        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(Error::Internal("bridge watcher stopped".into())),
            Err(_) => Err(Error::Timeout(format!(
                "no reply within {}s",
                timeout.as_secs()
            ))),
        }
    }

    fn orch(&self) -> Result<Arc<Orchestrator>> {
        self.orch
            .upgrade()
            .ok_or_else(|| Error::Internal("orchestrator has shut down".into()))
    }
}

/// Follow the conversation: buffer counterparty replies and keep the
/// liveness stats current. Exits when the conversation ends.
fn spawn_watcher(
    orch: &Arc<Orchestrator>,
    conversation_id: String,
    bridge_agent_id: String,
    tx: mpsc::UnboundedSender<BridgeReply>,
    stats: Arc<Mutex<BridgeStats>>,
) {
    let (_sub, mut rx) = orch.subscribe(&conversation_id, EventFilter::default());
    let weak = Arc::downgrade(orch);
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match &envelope.event {
                ConversationEvent::TurnStarted { turn } if turn.agent_id != bridge_agent_id => {
                    record_action(&stats, "turn_started");
                }
                ConversationEvent::TraceAdded { trace, .. }
                    if trace.agent_id != bridge_agent_id =>
                {
                    record_action(&stats, trace.kind.type_name());
                }
                ConversationEvent::TurnCompleted { turn } if turn.agent_id != bridge_agent_id => {
                    let attachments = match weak.upgrade() {
                        Some(orch) => resolve_attachments(&orch, &turn.attachments),
                        None => Vec::new(),
                    };
                    let reply = BridgeReply {
                        message_from_agent: turn.content.clone(),
                        attachments,
                        status: if turn.is_final_turn {
                            ReplyStatus::Completed
                        } else {
                            ReplyStatus::InputRequired
                        },
                    };
                    if tx.send(reply).is_err() {
                        break;
                    }
                }
                ConversationEvent::ConversationEnded {} => break,
                _ => {}
            }
        }
        tracing::debug!(conversation_id, "bridge watcher exited");
    });
}

fn record_action(stats: &Mutex<BridgeStats>, action_type: &str) {
    let mut stats = stats.lock();
    stats.action_count += 1;
    stats.last_action_at = Some(Utc::now());
    stats.last_action_type = Some(action_type.to_owned());
}

fn resolve_attachments(orch: &Arc<Orchestrator>, ids: &[String]) -> Vec<ReplyAttachment> {
    ids.iter()
        .filter_map(|id| orch.store().get_attachment(id).ok())
        .map(|a| ReplyAttachment {
            name: a.name,
            content_type: a.content_type,
            summary: a.summary,
            content: Some(a.content),
        })
        .collect()
}
