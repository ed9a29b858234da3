use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque bearer token binding a caller to one `(conversation, agent)`.
///
/// Tokens are immutable after creation, revoked in bulk when the
/// conversation ends, and swept after `expires_at`. The token string never
/// appears in event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTokenRecord {
    pub token: String,
    pub conversation_id: String,
    pub agent_id: String,
    pub expires_at: DateTime<Utc>,
}

impl AgentTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
