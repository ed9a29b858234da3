//! Language-model capabilities consumed by the orchestrator.
//!
//! The core consumes exactly two capabilities: `complete(prompt) → text`
//! ([`CompletionPolicy`]) and tool-result synthesis
//! ([`ToolSynthesizer`]). This crate holds the traits, the permissive
//! recovery parser for policy output, the OpenAI-compatible HTTP adapter,
//! and the scripted in-process implementations used by demos and tests.

pub mod openai_compat;
pub mod parse;
pub mod scripted;
pub mod synth;
mod traits;

pub use openai_compat::OpenAiCompatPolicy;
pub use scripted::{ScriptedPolicy, StaticSynthesizer};
pub use synth::{LlmToolSynthesizer, SynthesisRequest};
pub use traits::{CompletionPolicy, ToolSynthesizer};
