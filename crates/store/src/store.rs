//! Durable conversation log.
//!
//! One JSON snapshot file per conversation under
//! `<state>/conversations/<id>.json`, plus `tokens.json` for the token
//! table. The in-memory index is rebuilt from disk at construction, so a
//! cold start sees exactly what the last flush persisted. Every mutation
//! is validated and applied under one write lock before it is flushed,
//! which is what makes `complete_turn` + attachment inserts atomic as far
//! as any caller can observe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use cq_domain::conversation::{
    validate_agents, Conversation, ConversationSnapshot, ConversationStatus,
    GetConversationOptions,
};
use cq_domain::error::{Error, Result};
use cq_domain::query::{UserQuery, UserQueryStatus};
use cq_domain::token::AgentTokenRecord;
use cq_domain::trace::TraceEntry;
use cq_domain::turn::{Attachment, ConversationTurn, TurnStatus};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// On-disk snapshot of a single conversation (turns carry their trace
/// inline so a file is self-contained for rehydration).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationRecord {
    conversation: Conversation,
    turns: Vec<ConversationTurn>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    queries: Vec<UserQuery>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    /// turn id → turn (trace held separately in `traces`).
    turns: HashMap<String, ConversationTurn>,
    /// conversation id → turn ids in start order.
    turn_order: HashMap<String, Vec<String>>,
    traces: HashMap<String, Vec<TraceEntry>>,
    attachments: HashMap<String, Attachment>,
    queries: HashMap<String, UserQuery>,
    /// token string → record. O(1) lookup.
    tokens: HashMap<String, AgentTokenRecord>,
}

impl Inner {
    fn turn_with_trace(&self, turn_id: &str) -> Option<ConversationTurn> {
        let mut turn = self.turns.get(turn_id)?.clone();
        turn.trace = self.traces.get(turn_id).cloned().unwrap_or_default();
        Some(turn)
    }

    fn ordered_turns(&self, conversation_id: &str, include_trace: bool) -> Vec<ConversationTurn> {
        self.turn_order
            .get(conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| {
                if include_trace {
                    self.turn_with_trace(id)
                } else {
                    self.turns.get(id).cloned()
                }
            })
            .collect()
    }

    /// Most recent activity: the latest turn boundary, else creation time.
    fn last_activity_at(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        let conversation = self.conversations.get(conversation_id)?;
        let mut latest = conversation.created_at;
        for turn_id in self.turn_order.get(conversation_id).into_iter().flatten() {
            if let Some(turn) = self.turns.get(turn_id) {
                latest = latest.max(turn.completed_at.unwrap_or(turn.started_at));
            }
        }
        Some(latest)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConversationStore {
    conversations_dir: PathBuf,
    tokens_path: PathBuf,
    inner: RwLock<Inner>,
}

impl ConversationStore {
    /// Open (or create) the store under `state_path`, reloading every
    /// conversation snapshot and the token table from disk.
    pub fn new(state_path: &Path) -> Result<Self> {
        let conversations_dir = state_path.join("conversations");
        std::fs::create_dir_all(&conversations_dir)?;
        let tokens_path = state_path.join("tokens.json");

        let mut inner = Inner::default();

        for entry in std::fs::read_dir(&conversations_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ConversationRecord>(&raw) {
                Ok(record) => load_record(&mut inner, record),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping malformed conversation snapshot"
                    );
                }
            }
        }

        if tokens_path.exists() {
            let raw = std::fs::read_to_string(&tokens_path)?;
            match serde_json::from_str::<Vec<AgentTokenRecord>>(&raw) {
                Ok(records) => {
                    for record in records {
                        inner.tokens.insert(record.token.clone(), record);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed token table");
                }
            }
        }

        tracing::info!(
            conversations = inner.conversations.len(),
            tokens = inner.tokens.len(),
            path = %state_path.display(),
            "conversation store loaded"
        );

        Ok(Self {
            conversations_dir,
            tokens_path,
            inner: RwLock::new(inner),
        })
    }

    // ── Conversations ────────────────────────────────────────────────

    pub fn create_conversation(&self, conversation: Conversation) -> Result<()> {
        validate_agents(&conversation.agents)?;
        let mut inner = self.inner.write();
        if inner.conversations.contains_key(&conversation.id) {
            return Err(Error::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        let id = conversation.id.clone();
        inner.conversations.insert(id.clone(), conversation);
        inner.turn_order.insert(id.clone(), Vec::new());
        self.persist_conversation(&inner, &id)
    }

    /// Apply a monotonic status transition. Returns the updated record.
    pub fn update_conversation_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<Conversation> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        if conversation.status == status {
            return Ok(conversation.clone());
        }
        if !conversation.status.can_transition_to(status) {
            return Err(Error::Conflict(format!(
                "conversation {conversation_id} cannot move {:?} → {:?}",
                conversation.status, status
            )));
        }
        conversation.status = status;
        let updated = conversation.clone();
        self.persist_conversation(&inner, conversation_id)?;
        Ok(updated)
    }

    pub fn get_conversation(
        &self,
        conversation_id: &str,
        opts: GetConversationOptions,
    ) -> Result<ConversationSnapshot> {
        let inner = self.inner.read();
        let conversation = inner
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;

        let turns = if opts.include_turns {
            inner.ordered_turns(conversation_id, opts.include_trace)
        } else {
            Vec::new()
        };

        let attachments = if opts.include_attachments {
            inner
                .attachments
                .values()
                .filter(|a| a.conversation_id == conversation_id)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Ok(ConversationSnapshot {
            conversation,
            turns,
            attachments,
        })
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.inner.read().conversations.keys().cloned().collect()
    }

    // ── Turns ────────────────────────────────────────────────────────

    pub fn start_turn(&self, turn: ConversationTurn) -> Result<()> {
        let mut inner = self.inner.write();
        let conversation = inner
            .conversations
            .get(&turn.conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {}", turn.conversation_id)))?;
        if conversation.agent(&turn.agent_id).is_none() {
            return Err(Error::InvalidRequest(format!(
                "agent {} is not part of conversation {}",
                turn.agent_id, turn.conversation_id
            )));
        }
        let already_open = inner
            .turn_order
            .get(&turn.conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.turns.get(id))
            .any(|t| t.agent_id == turn.agent_id && t.status == TurnStatus::InProgress);
        if already_open {
            return Err(Error::Conflict(format!(
                "agent {} already has an in-progress turn",
                turn.agent_id
            )));
        }

        let conversation_id = turn.conversation_id.clone();
        let turn_id = turn.id.clone();
        inner.traces.insert(turn_id.clone(), Vec::new());
        inner
            .turn_order
            .entry(conversation_id.clone())
            .or_default()
            .push(turn_id.clone());
        inner.turns.insert(turn_id, turn);
        self.persist_conversation(&inner, &conversation_id)
    }

    /// Seal a turn: insert every attachment, link them, record the final
    /// content, and mark the turn completed — all in one mutation. If any
    /// validation fails the turn stays in progress and nothing is stored.
    pub fn complete_turn(
        &self,
        turn_id: &str,
        content: String,
        is_final_turn: bool,
        metadata: Option<serde_json::Value>,
        attachments: Vec<Attachment>,
    ) -> Result<ConversationTurn> {
        let mut inner = self.inner.write();
        let status = inner
            .turns
            .get(turn_id)
            .map(|t| t.status)
            .ok_or_else(|| Error::TurnNotFound(turn_id.to_owned()))?;
        if status != TurnStatus::InProgress {
            return Err(Error::TurnNotFound(format!("{turn_id} is not in progress")));
        }
        for attachment in &attachments {
            if attachment.turn_id != turn_id {
                return Err(Error::InvalidRequest(format!(
                    "attachment {} does not belong to turn {turn_id}",
                    attachment.id
                )));
            }
        }

        // Point of no return: apply the whole mutation.
        let attachment_ids: Vec<String> = attachments.iter().map(|a| a.id.clone()).collect();
        for attachment in attachments {
            inner.attachments.insert(attachment.id.clone(), attachment);
        }
        let turn = inner.turns.get_mut(turn_id).expect("checked above");
        turn.status = TurnStatus::Completed;
        turn.completed_at = Some(Utc::now());
        turn.content = content;
        turn.is_final_turn = is_final_turn;
        if metadata.is_some() {
            turn.metadata = metadata;
        }
        turn.attachments = attachment_ids;
        let conversation_id = turn.conversation_id.clone();

        let sealed = inner
            .turn_with_trace(turn_id)
            .expect("turn present");
        self.persist_conversation(&inner, &conversation_id)?;
        Ok(sealed)
    }

    pub fn cancel_turn(&self, turn_id: &str) -> Result<ConversationTurn> {
        let mut inner = self.inner.write();
        let turn = inner
            .turns
            .get_mut(turn_id)
            .ok_or_else(|| Error::TurnNotFound(turn_id.to_owned()))?;
        if turn.status != TurnStatus::InProgress {
            return Err(Error::TurnNotFound(format!("{turn_id} is not in progress")));
        }
        turn.status = TurnStatus::Cancelled;
        turn.completed_at = Some(Utc::now());
        let conversation_id = turn.conversation_id.clone();
        let cancelled = turn.clone();
        self.persist_conversation(&inner, &conversation_id)?;
        Ok(cancelled)
    }

    pub fn get_turn(&self, turn_id: &str) -> Result<ConversationTurn> {
        self.inner
            .read()
            .turn_with_trace(turn_id)
            .ok_or_else(|| Error::TurnNotFound(turn_id.to_owned()))
    }

    pub fn get_in_progress_turns(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        let inner = self.inner.read();
        inner
            .ordered_turns(conversation_id, false)
            .into_iter()
            .filter(|t| t.status == TurnStatus::InProgress)
            .collect()
    }

    // ── Trace ────────────────────────────────────────────────────────

    /// Append a trace entry. Rejected unless the owning turn is in
    /// progress — a sealed trace is immutable.
    pub fn add_trace_entry(&self, entry: TraceEntry) -> Result<()> {
        let mut inner = self.inner.write();
        let turn = inner
            .turns
            .get(&entry.turn_id)
            .ok_or_else(|| Error::TurnNotFound(entry.turn_id.clone()))?;
        if turn.status != TurnStatus::InProgress {
            return Err(Error::TurnNotFound(format!(
                "{} is not in progress",
                entry.turn_id
            )));
        }
        let conversation_id = turn.conversation_id.clone();
        inner
            .traces
            .entry(entry.turn_id.clone())
            .or_default()
            .push(entry);
        self.persist_conversation(&inner, &conversation_id)
    }

    pub fn get_trace_entries_for_turn(&self, turn_id: &str) -> Result<Vec<TraceEntry>> {
        let inner = self.inner.read();
        if !inner.turns.contains_key(turn_id) {
            return Err(Error::TurnNotFound(turn_id.to_owned()));
        }
        Ok(inner.traces.get(turn_id).cloned().unwrap_or_default())
    }

    // ── Attachments ──────────────────────────────────────────────────

    pub fn get_attachment(&self, attachment_id: &str) -> Result<Attachment> {
        self.inner
            .read()
            .attachments
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attachment {attachment_id}")))
    }

    // ── User queries ─────────────────────────────────────────────────

    pub fn insert_user_query(&self, query: UserQuery) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.conversations.contains_key(&query.conversation_id) {
            return Err(Error::NotFound(format!(
                "conversation {}",
                query.conversation_id
            )));
        }
        let conversation_id = query.conversation_id.clone();
        inner.queries.insert(query.id.clone(), query);
        self.persist_conversation(&inner, &conversation_id)
    }

    pub fn get_user_query(&self, query_id: &str) -> Result<UserQuery> {
        self.inner
            .read()
            .queries
            .get(query_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("query {query_id}")))
    }

    pub fn set_user_query_answered(&self, query_id: &str, response: &str) -> Result<UserQuery> {
        self.update_user_query(query_id, |q| {
            q.status = UserQueryStatus::Answered;
            q.response = Some(response.to_owned());
        })
    }

    pub fn set_user_query_expired(&self, query_id: &str) -> Result<UserQuery> {
        self.update_user_query(query_id, |q| {
            q.status = UserQueryStatus::Expired;
        })
    }

    fn update_user_query<F>(&self, query_id: &str, f: F) -> Result<UserQuery>
    where
        F: FnOnce(&mut UserQuery),
    {
        let mut inner = self.inner.write();
        let query = inner
            .queries
            .get_mut(query_id)
            .ok_or_else(|| Error::NotFound(format!("query {query_id}")))?;
        f(query);
        let conversation_id = query.conversation_id.clone();
        let updated = query.clone();
        self.persist_conversation(&inner, &conversation_id)?;
        Ok(updated)
    }

    // ── Tokens ───────────────────────────────────────────────────────

    pub fn create_agent_token(&self, record: AgentTokenRecord) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.tokens.contains_key(&record.token) {
            return Err(Error::Conflict("token collision".into()));
        }
        inner.tokens.insert(record.token.clone(), record);
        self.persist_tokens(&inner)
    }

    pub fn validate_token(&self, token: &str) -> Option<(String, String)> {
        let inner = self.inner.read();
        let record = inner.tokens.get(token)?;
        if record.is_expired(Utc::now()) {
            return None;
        }
        Some((record.conversation_id.clone(), record.agent_id.clone()))
    }

    pub fn get_tokens_for_conversation(&self, conversation_id: &str) -> Vec<AgentTokenRecord> {
        self.inner
            .read()
            .tokens
            .values()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn revoke_tokens_for_conversation(&self, conversation_id: &str) -> Result<usize> {
        let mut inner = self.inner.write();
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|_, record| record.conversation_id != conversation_id);
        let removed = before - inner.tokens.len();
        if removed > 0 {
            self.persist_tokens(&inner)?;
        }
        Ok(removed)
    }

    pub fn cleanup_expired_tokens(&self) -> Result<usize> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let before = inner.tokens.len();
        inner.tokens.retain(|_, record| !record.is_expired(now));
        let removed = before - inner.tokens.len();
        if removed > 0 {
            self.persist_tokens(&inner)?;
        }
        Ok(removed)
    }

    // ── Lifecycle scans ──────────────────────────────────────────────

    /// Close out non-terminal conversations whose last activity is older
    /// than the lookback window. Returns the ids that were closed.
    pub fn mark_stale_conversations_inactive(&self, lookback_hours: u32) -> Result<Vec<String>> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours as i64);
        let stale: Vec<String> = {
            let inner = self.inner.read();
            inner
                .conversations
                .values()
                .filter(|c| !c.status.is_terminal())
                .filter(|c| {
                    inner
                        .last_activity_at(&c.id)
                        .map(|at| at < cutoff)
                        .unwrap_or(true)
                })
                .map(|c| c.id.clone())
                .collect()
        };
        for id in &stale {
            self.update_conversation_status(id, ConversationStatus::Completed)?;
        }
        Ok(stale)
    }

    /// Non-terminal conversations with activity inside the lookback window.
    pub fn get_active_conversations_with_recent_activity(
        &self,
        lookback_hours: u32,
    ) -> Vec<String> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours as i64);
        let inner = self.inner.read();
        inner
            .conversations
            .values()
            .filter(|c| !c.status.is_terminal())
            .filter(|c| {
                inner
                    .last_activity_at(&c.id)
                    .map(|at| at >= cutoff)
                    .unwrap_or(false)
            })
            .map(|c| c.id.clone())
            .collect()
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist_conversation(&self, inner: &Inner, conversation_id: &str) -> Result<()> {
        let Some(conversation) = inner.conversations.get(conversation_id) else {
            return Ok(());
        };
        let record = ConversationRecord {
            conversation: conversation.clone(),
            turns: inner.ordered_turns(conversation_id, true),
            attachments: inner
                .attachments
                .values()
                .filter(|a| a.conversation_id == conversation_id)
                .cloned()
                .collect(),
            queries: inner
                .queries
                .values()
                .filter(|q| q.conversation_id == conversation_id)
                .cloned()
                .collect(),
        };
        let path = self.conversations_dir.join(format!("{conversation_id}.json"));
        write_atomic(&path, &serde_json::to_vec_pretty(&record)?)
    }

    fn persist_tokens(&self, inner: &Inner) -> Result<()> {
        let records: Vec<&AgentTokenRecord> = inner.tokens.values().collect();
        write_atomic(&self.tokens_path, &serde_json::to_vec_pretty(&records)?)
    }
}

fn load_record(inner: &mut Inner, record: ConversationRecord) {
    let conversation_id = record.conversation.id.clone();
    let mut order = Vec::with_capacity(record.turns.len());
    for mut turn in record.turns {
        let trace = std::mem::take(&mut turn.trace);
        order.push(turn.id.clone());
        inner.traces.insert(turn.id.clone(), trace);
        inner.turns.insert(turn.id.clone(), turn);
    }
    inner.turn_order.insert(conversation_id.clone(), order);
    for attachment in record.attachments {
        inner.attachments.insert(attachment.id.clone(), attachment);
    }
    for query in record.queries {
        inner.queries.insert(query.id.clone(), query);
    }
    inner
        .conversations
        .insert(conversation_id, record.conversation);
}

/// Write via a temp file + rename so readers never see a torn snapshot.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use cq_domain::conversation::{AgentConfig, StrategyKind};
    use cq_domain::trace::TraceKind;

    fn conversation(id: &str) -> Conversation {
        Conversation {
            id: id.into(),
            created_at: Utc::now(),
            status: ConversationStatus::Created,
            agents: vec![
                AgentConfig::new("patient", StrategyKind::ScenarioDriven),
                AgentConfig::new("supplier", StrategyKind::ScenarioDriven),
            ],
            metadata: serde_json::Value::Null,
        }
    }

    fn open_store(dir: &Path) -> ConversationStore {
        ConversationStore::new(dir).unwrap()
    }

    fn start_turn(store: &ConversationStore, conv: &str, agent: &str) -> ConversationTurn {
        let turn = ConversationTurn::new_in_progress(conv, agent, None);
        store.start_turn(turn.clone()).unwrap();
        turn
    }

    #[test]
    fn create_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();

        let snapshot = store
            .get_conversation("c1", GetConversationOptions::full())
            .unwrap();
        assert_eq!(snapshot.conversation.status, ConversationStatus::Created);
        assert_eq!(snapshot.conversation.agents.len(), 2);
        assert!(snapshot.turns.is_empty());
    }

    #[test]
    fn duplicate_conversation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();
        let err = store.create_conversation(conversation("c1")).unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn status_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();

        store
            .update_conversation_status("c1", ConversationStatus::Active)
            .unwrap();
        store
            .update_conversation_status("c1", ConversationStatus::Completed)
            .unwrap();
        let err = store
            .update_conversation_status("c1", ConversationStatus::Active)
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");
    }

    #[test]
    fn second_open_turn_for_same_agent_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();

        start_turn(&store, "c1", "patient");
        let err = store
            .start_turn(ConversationTurn::new_in_progress("c1", "patient", None))
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");

        // A different agent may open a turn.
        start_turn(&store, "c1", "supplier");
    }

    #[test]
    fn trace_rejected_after_seal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();
        let turn = start_turn(&store, "c1", "patient");

        store
            .add_trace_entry(TraceEntry::stamped(
                &turn.id,
                "patient",
                TraceKind::Thought {
                    content: "ok".into(),
                },
            ))
            .unwrap();
        store
            .complete_turn(&turn.id, "done".into(), false, None, vec![])
            .unwrap();

        let err = store
            .add_trace_entry(TraceEntry::stamped(
                &turn.id,
                "patient",
                TraceKind::Thought {
                    content: "late".into(),
                },
            ))
            .unwrap_err();
        assert_eq!(err.kind(), "TurnNotFound");

        let trace = store.get_trace_entries_for_turn(&turn.id).unwrap();
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn complete_turn_inserts_attachments_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();
        let turn = start_turn(&store, "c1", "patient");

        let attachment = Attachment {
            id: "att1".into(),
            conversation_id: "c1".into(),
            turn_id: turn.id.clone(),
            doc_id: "doc1".into(),
            name: "policy.md".into(),
            content_type: "text/markdown".into(),
            content: "# Policy\n- A\n- B\n".into(),
            summary: None,
            created_by_agent_id: "patient".into(),
            created_at: Utc::now(),
        };
        let sealed = store
            .complete_turn(&turn.id, "see attached".into(), false, None, vec![attachment])
            .unwrap();
        assert_eq!(sealed.attachments, vec!["att1".to_string()]);

        let stored = store.get_attachment("att1").unwrap();
        assert_eq!(stored.content, "# Policy\n- A\n- B\n");
    }

    #[test]
    fn complete_with_mismatched_attachment_leaves_turn_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();
        let turn = start_turn(&store, "c1", "patient");

        let bogus = Attachment {
            id: "att1".into(),
            conversation_id: "c1".into(),
            turn_id: "some-other-turn".into(),
            doc_id: "doc1".into(),
            name: "x".into(),
            content_type: "text/plain".into(),
            content: "x".into(),
            summary: None,
            created_by_agent_id: "patient".into(),
            created_at: Utc::now(),
        };
        assert!(store
            .complete_turn(&turn.id, "oops".into(), false, None, vec![bogus])
            .is_err());

        // Neither the seal nor the attachment happened.
        let reread = store.get_turn(&turn.id).unwrap();
        assert_eq!(reread.status, TurnStatus::InProgress);
        assert!(store.get_attachment("att1").is_err());
    }

    #[test]
    fn double_complete_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();
        let turn = start_turn(&store, "c1", "patient");

        store
            .complete_turn(&turn.id, "first".into(), false, None, vec![])
            .unwrap();
        let err = store
            .complete_turn(&turn.id, "second".into(), false, None, vec![])
            .unwrap_err();
        assert_eq!(err.kind(), "TurnNotFound");
    }

    #[test]
    fn reload_after_restart_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let sealed = {
            let store = open_store(dir.path());
            store.create_conversation(conversation("c1")).unwrap();
            let turn = start_turn(&store, "c1", "patient");
            store
                .add_trace_entry(TraceEntry::stamped(
                    &turn.id,
                    "patient",
                    TraceKind::Thought {
                        content: "persisted".into(),
                    },
                ))
                .unwrap();
            store
                .complete_turn(&turn.id, "hello".into(), false, None, vec![])
                .unwrap()
        };

        let store = open_store(dir.path());
        let snapshot = store
            .get_conversation("c1", GetConversationOptions::full())
            .unwrap();
        assert_eq!(snapshot.turns.len(), 1);
        assert_eq!(snapshot.turns[0].id, sealed.id);
        assert_eq!(snapshot.turns[0].content, "hello");
        assert_eq!(snapshot.turns[0].trace.len(), 1);
    }

    #[test]
    fn token_roundtrip_and_revocation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();

        store
            .create_agent_token(AgentTokenRecord {
                token: "tok-abc".into(),
                conversation_id: "c1".into(),
                agent_id: "patient".into(),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .unwrap();

        assert_eq!(
            store.validate_token("tok-abc"),
            Some(("c1".to_string(), "patient".to_string()))
        );
        assert_eq!(store.validate_token("tok-missing"), None);

        assert_eq!(store.revoke_tokens_for_conversation("c1").unwrap(), 1);
        assert_eq!(store.validate_token("tok-abc"), None);
    }

    #[test]
    fn expired_tokens_do_not_validate_and_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.create_conversation(conversation("c1")).unwrap();

        store
            .create_agent_token(AgentTokenRecord {
                token: "tok-old".into(),
                conversation_id: "c1".into(),
                agent_id: "patient".into(),
                expires_at: Utc::now() - Duration::hours(1),
            })
            .unwrap();

        assert_eq!(store.validate_token("tok-old"), None);
        assert_eq!(store.cleanup_expired_tokens().unwrap(), 1);
        assert!(store.get_tokens_for_conversation("c1").is_empty());
    }

    #[test]
    fn stale_conversations_are_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let mut old = conversation("c-old");
        old.created_at = Utc::now() - Duration::hours(48);
        old.status = ConversationStatus::Active;
        store.create_conversation(old).unwrap();
        store.create_conversation(conversation("c-new")).unwrap();

        let closed = store.mark_stale_conversations_inactive(24).unwrap();
        assert_eq!(closed, vec!["c-old".to_string()]);

        let recent = store.get_active_conversations_with_recent_activity(24);
        assert_eq!(recent, vec!["c-new".to_string()]);

        let snapshot = store
            .get_conversation("c-old", GetConversationOptions::default())
            .unwrap();
        assert_eq!(snapshot.conversation.status, ConversationStatus::Completed);
    }
}
