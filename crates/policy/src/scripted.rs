//! In-process policy doubles.
//!
//! [`ScriptedPolicy`] pops canned completions in order; demos and the
//! gateway integration tests drive whole conversations with it.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use cq_domain::error::{Error, Result};

use crate::synth::SynthesisRequest;
use crate::traits::{CompletionPolicy, ToolSynthesizer};

pub struct ScriptedPolicy {
    replies: Mutex<VecDeque<String>>,
    /// Prompts seen, in order — lets tests assert on prompt content.
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPolicy {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(reply.into());
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait::async_trait]
impl CompletionPolicy for ScriptedPolicy {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_owned());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::UpstreamUnavailable("scripted policy exhausted".into()))
    }
}

/// Returns the same JSON value for every synthesis request.
pub struct StaticSynthesizer {
    result: Value,
}

impl StaticSynthesizer {
    pub fn new(result: Value) -> Self {
        Self { result }
    }

    pub fn ok() -> Self {
        Self::new(serde_json::json!({ "status": "ok" }))
    }
}

#[async_trait::async_trait]
impl ToolSynthesizer for StaticSynthesizer {
    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Value> {
        Ok(self.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_replies_in_order() {
        let policy = ScriptedPolicy::new(vec!["one".into(), "two".into()]);
        assert_eq!(policy.complete("p1").await.unwrap(), "one");
        assert_eq!(policy.complete("p2").await.unwrap(), "two");
        let err = policy.complete("p3").await.unwrap_err();
        assert_eq!(err.kind(), "UpstreamUnavailable");
        assert_eq!(policy.prompts(), vec!["p1", "p2", "p3"]);
    }
}
