//! Durable log for Colloquy.
//!
//! [`ConversationStore`] persists conversations, turns, traces,
//! attachments, user queries, and agent tokens. [`ScenarioStore`] loads
//! the read-only scenario registry.

mod scenarios;
mod store;

pub use scenarios::ScenarioStore;
pub use store::ConversationStore;
