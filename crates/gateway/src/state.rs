use std::sync::Arc;

use sha2::{Digest, Sha256};

use cq_domain::config::Config;

use crate::bridge::BridgeSurface;
use crate::orchestrator::Orchestrator;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub surface: Arc<BridgeSurface>,
    /// SHA-256 of the admin bearer token, read once at startup.
    /// `None` = dev mode (admin routes open).
    pub admin_token_hash: Option<Vec<u8>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        orchestrator: Arc<Orchestrator>,
        surface: Arc<BridgeSurface>,
    ) -> Self {
        let admin_token_hash = read_admin_token_hash(&config.server.admin_token_env);
        Self {
            config,
            orchestrator,
            surface,
            admin_token_hash,
        }
    }
}

fn read_admin_token_hash(env_name: &str) -> Option<Vec<u8>> {
    match std::env::var(env_name) {
        Ok(token) if !token.is_empty() => Some(Sha256::digest(token.as_bytes()).to_vec()),
        _ => {
            tracing::warn!(
                env = env_name,
                "no admin token configured; admin routes are open (dev mode)"
            );
            None
        }
    }
}
