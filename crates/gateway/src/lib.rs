//! Colloquy gateway: the conversation orchestrator, the server-managed
//! agent runtime, the bridge to external counterparties, and the HTTP
//! transport adapter.

pub mod api;
pub mod bridge;
pub mod cli;
pub mod orchestrator;
pub mod runtime;
pub mod state;
