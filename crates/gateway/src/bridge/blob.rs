//! Bridge configuration blobs.
//!
//! Each bridge endpoint is bound to an opaque, URL-safe byte string that
//! decodes to `{metadata, agents[]}`. Decoding is the only
//! authentication the bridge surface has, so rejection kinds are part of
//! the contract: `InvalidConfig`, `NoBridgedAgent`,
//! `InvalidBridgeStrategy`.

use base64::Engine;

use cq_domain::bridge::BridgeConfigBlob;
use cq_domain::conversation::{validate_agents, StrategyKind};
use cq_domain::error::{Error, Result};

/// Decode and validate a configuration blob.
pub fn decode(blob: &str) -> Result<BridgeConfigBlob> {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let padded = base64::engine::general_purpose::URL_SAFE;
    let bytes = engine
        .decode(blob)
        .or_else(|_| padded.decode(blob))
        .map_err(|e| Error::InvalidRequest(format!("InvalidConfig: not base64url: {e}")))?;

    let config: BridgeConfigBlob = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidRequest(format!("InvalidConfig: {e}")))?;

    validate_agents(&config.agents)
        .map_err(|e| Error::InvalidRequest(format!("InvalidConfig: {e}")))?;

    let bridged: Vec<_> = config
        .agents
        .iter()
        .filter(|a| a.strategy_type.is_bridge())
        .collect();
    match bridged.as_slice() {
        [] => {
            return Err(Error::InvalidRequest(
                "NoBridgedAgent: configuration has no bridge-strategy agent".into(),
            ))
        }
        [agent] => {
            // This endpoint hosts the conversation, so the counterparty
            // must be bridged in as-server.
            if agent.strategy_type != StrategyKind::BridgeToExternalCounterpartyAsServer {
                return Err(Error::InvalidRequest(format!(
                    "InvalidBridgeStrategy: agent {} uses {:?}",
                    agent.id, agent.strategy_type
                )));
            }
        }
        _ => {
            return Err(Error::InvalidRequest(
                "InvalidBridgeStrategy: more than one bridged agent".into(),
            ))
        }
    }

    Ok(config)
}

/// Encode a blob (demos, tests, registration tooling).
pub fn encode(config: &BridgeConfigBlob) -> Result<String> {
    let bytes = serde_json::to_vec(config)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
