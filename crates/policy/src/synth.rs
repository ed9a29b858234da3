use std::sync::Arc;

use cq_domain::error::Result;
use serde_json::Value;

use crate::traits::{CompletionPolicy, ToolSynthesizer};

/// Everything the synthesiser needs to fabricate one tool output.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub tool_name: String,
    pub parameters: Value,
    /// Scenario-authored guidance for this tool, when present.
    pub guidance: Option<String>,
    /// Rendered conversation context for grounding the fabrication.
    pub conversation_context: String,
}

/// Synthesises tool results by prompting the completion policy — the
/// second use of the single LLM capability.
pub struct LlmToolSynthesizer {
    policy: Arc<dyn CompletionPolicy>,
}

impl LlmToolSynthesizer {
    pub fn new(policy: Arc<dyn CompletionPolicy>) -> Self {
        Self { policy }
    }

    fn build_prompt(request: &SynthesisRequest) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "You simulate the backend of a tool in a role-play conversation. \
             Reply with the tool's JSON output only — no prose, no code fence.\n\n",
        );
        prompt.push_str(&format!("Tool: {}\n", request.tool_name));
        prompt.push_str(&format!("Arguments: {}\n", request.parameters));
        if let Some(guidance) = &request.guidance {
            prompt.push_str(&format!("Guidance: {guidance}\n"));
        }
        if !request.conversation_context.is_empty() {
            prompt.push_str(&format!(
                "\nConversation so far:\n{}\n",
                request.conversation_context
            ));
        }
        prompt
    }
}

#[async_trait::async_trait]
impl ToolSynthesizer for LlmToolSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Value> {
        let prompt = Self::build_prompt(request);
        let reply = self.policy.complete(&prompt).await?;
        let trimmed = reply.trim();
        // Models sometimes fence the output anyway.
        let trimmed = trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        serde_json::from_str(trimmed).or_else(|_| {
            // Non-JSON output still counts as a result; wrap it.
            Ok(Value::String(trimmed.to_owned()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedPolicy;

    #[tokio::test]
    async fn synthesizes_json_output() {
        let policy = Arc::new(ScriptedPolicy::new(vec![r#"{"approved": true}"#.into()]));
        let synth = LlmToolSynthesizer::new(policy);
        let result = synth
            .synthesize(&SynthesisRequest {
                tool_name: "check_eligibility".into(),
                parameters: serde_json::json!({"member": "m1"}),
                guidance: Some("Always approve.".into()),
                conversation_context: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(result["approved"], true);
    }

    #[tokio::test]
    async fn fenced_output_is_unwrapped() {
        let policy = Arc::new(ScriptedPolicy::new(vec![
            "```json\n{\"ok\": 1}\n```".into(),
        ]));
        let synth = LlmToolSynthesizer::new(policy);
        let result = synth
            .synthesize(&SynthesisRequest {
                tool_name: "t".into(),
                parameters: Value::Null,
                guidance: None,
                conversation_context: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(result["ok"], 1);
    }

    #[tokio::test]
    async fn plain_text_output_is_wrapped_as_string() {
        let policy = Arc::new(ScriptedPolicy::new(vec!["no slots tomorrow".into()]));
        let synth = LlmToolSynthesizer::new(policy);
        let result = synth
            .synthesize(&SynthesisRequest {
                tool_name: "t".into(),
                parameters: Value::Null,
                guidance: None,
                conversation_context: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(result, Value::String("no slots tomorrow".into()));
    }
}
