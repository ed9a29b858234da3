//! Agent token registry.
//!
//! Mints one opaque bearer token per `(conversation, agent)` at
//! conversation creation: 256 bits from the OS CSPRNG, base64url without
//! padding. Validation is an O(1) map lookup in the store; revocation is
//! bulk per conversation; a periodic sweep drops expired rows.

use std::sync::Arc;

use base64::Engine;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use cq_domain::error::Result;
use cq_domain::token::AgentTokenRecord;
use cq_store::ConversationStore;

pub struct TokenRegistry {
    store: Arc<ConversationStore>,
    ttl_hours: u32,
}

impl TokenRegistry {
    pub fn new(store: Arc<ConversationStore>, ttl_hours: u32) -> Self {
        Self { store, ttl_hours }
    }

    /// Mint and persist a token for one agent slot.
    pub fn issue(&self, conversation_id: &str, agent_id: &str) -> Result<String> {
        let token = generate_token();
        self.store.create_agent_token(AgentTokenRecord {
            token: token.clone(),
            conversation_id: conversation_id.to_owned(),
            agent_id: agent_id.to_owned(),
            expires_at: Utc::now() + Duration::hours(self.ttl_hours as i64),
        })?;
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> Option<(String, String)> {
        self.store.validate_token(token)
    }

    pub fn revoke_conversation(&self, conversation_id: &str) -> Result<usize> {
        self.store.revoke_tokens_for_conversation(conversation_id)
    }

    pub fn sweep_expired(&self) -> Result<usize> {
        self.store.cleanup_expired_tokens()
    }
}

/// 32 bytes of OS randomness, base64url-encoded (43 chars, no padding).
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cq_domain::conversation::{AgentConfig, Conversation, ConversationStatus, StrategyKind};

    fn store_with_conversation(dir: &std::path::Path) -> Arc<ConversationStore> {
        let store = Arc::new(ConversationStore::new(dir).unwrap());
        store
            .create_conversation(Conversation {
                id: "c1".into(),
                created_at: Utc::now(),
                status: ConversationStatus::Created,
                agents: vec![AgentConfig::new("a1", StrategyKind::ScenarioDriven)],
                metadata: serde_json::Value::Null,
            })
            .unwrap();
        store
    }

    #[test]
    fn token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn issue_validate_revoke_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_conversation(dir.path());
        let registry = TokenRegistry::new(store, 72);

        let token = registry.issue("c1", "a1").unwrap();
        assert_eq!(
            registry.validate(&token),
            Some(("c1".to_string(), "a1".to_string()))
        );

        registry.revoke_conversation("c1").unwrap();
        assert_eq!(registry.validate(&token), None);
    }
}
