use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserQueryStatus {
    Pending,
    Answered,
    Expired,
}

/// A question an agent raised to a human; answered at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub id: String,
    pub conversation_id: String,
    pub agent_id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub status: UserQueryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserQuery {
    pub fn new(
        conversation_id: impl Into<String>,
        agent_id: impl Into<String>,
        question: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            agent_id: agent_id.into(),
            question: question.into(),
            context,
            status: UserQueryStatus::Pending,
            response: None,
            created_at: Utc::now(),
        }
    }
}
