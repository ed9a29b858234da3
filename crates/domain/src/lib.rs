//! Shared domain model for Colloquy.
//!
//! Plain-record entities (conversations, turns, traces, attachments, user
//! queries, tokens, scenarios), the event envelope published on the bus,
//! the wire-visible bridge shapes, the shared error type, and the
//! configuration tree. Everything here is serde-serialisable; field names
//! follow the wire contract (camelCase) while Rust code uses snake_case.

pub mod bridge;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod query;
pub mod scenario;
pub mod token;
pub mod trace;
pub mod turn;

pub use error::{Error, Result};
