//! API authentication.
//!
//! Two classes of caller:
//! - **Admin**: `Authorization: Bearer <admin token>`, checked against a
//!   SHA-256 digest read once at startup and compared in constant time.
//!   No token configured = dev mode (open).
//! - **Agent**: a bearer token minted by the token registry; the
//!   extractor resolves it to `(conversation, agent)` and handlers check
//!   it against the path.

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use cq_domain::error::Error;

use crate::state::AppState;

use super::error::ApiError;

fn bearer(parts_headers: &axum::http::HeaderMap) -> &str {
    parts_headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin middleware
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Enforce the admin bearer token on operator routes. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // `admin_token_hash` is `None` in dev mode (no token configured).
    let expected = match &state.admin_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = Sha256::digest(bearer(req.headers()).as_bytes());
    if !bool::from(provided.ct_eq(expected.as_slice())) {
        return ApiError(Error::PermissionDenied(
            "invalid or missing admin token".into(),
        ))
        .into_response();
    }

    next.run(req).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent identity extractor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `(conversation, agent)` a valid agent token binds the caller to.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub conversation_id: String,
    pub agent_id: String,
}

impl AgentIdentity {
    /// Handlers call this to pin the token to the conversation in the
    /// request path.
    pub fn check_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        if self.conversation_id != conversation_id {
            return Err(ApiError(Error::PermissionDenied(
                "token is bound to a different conversation".into(),
            )));
        }
        Ok(())
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AgentIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(&parts.headers);
        if token.is_empty() {
            return Err(ApiError(Error::PermissionDenied(
                "missing agent token".into(),
            )));
        }
        match state.orchestrator.validate_token(token) {
            Some((conversation_id, agent_id)) => Ok(Self {
                conversation_id,
                agent_id,
            }),
            None => Err(ApiError(Error::PermissionDenied(
                "invalid or expired agent token".into(),
            ))),
        }
    }
}
