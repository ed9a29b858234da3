//! Permissive recovery parser for policy output.
//!
//! The policy is asked to reply with a `<scratchpad>` block followed by a
//! fenced JSON tool call `{"name": ..., "args": {...}}`. Models drift, so
//! parsing is tolerant: the fence may be unlabelled or unterminated, one
//! missing closing brace is repaired, and when no tool block is present
//! the scratchpad (or the whole reply) becomes the message text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolAction {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub scratchpad: Option<String>,
    pub action: Option<ToolAction>,
    raw: String,
}

impl ParsedReply {
    /// Message content to use when no tool block was produced.
    pub fn fallback_text(&self) -> String {
        match &self.scratchpad {
            Some(s) if !s.trim().is_empty() => s.trim().to_owned(),
            _ => strip_fences(&self.raw).trim().to_owned(),
        }
    }
}

fn scratchpad_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<scratchpad>\s*(.*?)\s*</scratchpad>").unwrap())
}

fn fenced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap())
}

fn open_fence_re() -> &'static Regex {
    // A fence that was opened but never closed.
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*)$").unwrap())
}

/// Parse one policy reply into scratchpad + optional tool action.
pub fn parse_policy_reply(text: &str) -> ParsedReply {
    let scratchpad = scratchpad_re()
        .captures(text)
        .map(|c| c[1].to_owned())
        .filter(|s| !s.is_empty());

    let block = fenced_re()
        .captures(text)
        .map(|c| c[1].to_owned())
        .or_else(|| open_fence_re().captures(text).map(|c| c[1].to_owned()));

    let action = block.as_deref().and_then(parse_tool_block);

    ParsedReply {
        scratchpad,
        action,
        raw: text.to_owned(),
    }
}

/// Parse the fenced block as `{"name": ..., "args": {...}}`, repairing a
/// single missing closing brace.
fn parse_tool_block(block: &str) -> Option<ToolAction> {
    let value = serde_json::from_str::<Value>(block)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&format!("{block}}}")).ok())?;
    let name = value.get("name")?.as_str()?.to_owned();
    let args = value.get("args").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    Some(ToolAction { name, args })
}

/// Remove scratchpad tags and code fences from a reply so the fallback
/// text reads as plain prose.
fn strip_fences(text: &str) -> String {
    let without_pad = scratchpad_re().replace_all(text, "$1");
    let without_fence = fenced_re().replace_all(&without_pad, "");
    without_fence.replace("```", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scratchpad_and_tool_block() {
        let reply = r#"<scratchpad>The request looks routine.</scratchpad>
```json
{"name": "send_message_to_agent_conversation", "args": {"text": "Hi, processing."}}
```"#;
        let parsed = parse_policy_reply(reply);
        assert_eq!(
            parsed.scratchpad.as_deref(),
            Some("The request looks routine.")
        );
        let action = parsed.action.unwrap();
        assert_eq!(action.name, "send_message_to_agent_conversation");
        assert_eq!(action.args["text"], "Hi, processing.");
    }

    #[test]
    fn repairs_one_missing_closing_brace() {
        let reply = "```json\n{\"name\": \"lookup\", \"args\": {\"q\": 1}\n```";
        let parsed = parse_policy_reply(reply);
        let action = parsed.action.unwrap();
        assert_eq!(action.name, "lookup");
        assert_eq!(action.args["q"], 1);
    }

    #[test]
    fn unterminated_fence_is_recovered() {
        let reply = "<scratchpad>done</scratchpad>\n```json\n{\"name\": \"x_Success\", \"args\": {}}";
        let parsed = parse_policy_reply(reply);
        assert_eq!(parsed.action.unwrap().name, "x_Success");
    }

    #[test]
    fn unlabelled_fence_is_accepted() {
        let reply = "```\n{\"name\": \"lookup\", \"args\": {}}\n```";
        assert!(parse_policy_reply(reply).action.is_some());
    }

    #[test]
    fn missing_args_defaults_to_empty_object() {
        let reply = "```json\n{\"name\": \"ping\"}\n```";
        let action = parse_policy_reply(reply).action.unwrap();
        assert_eq!(action.args, serde_json::json!({}));
    }

    #[test]
    fn no_tool_block_falls_back_to_scratchpad() {
        let reply = "<scratchpad>I should just answer directly.</scratchpad>";
        let parsed = parse_policy_reply(reply);
        assert!(parsed.action.is_none());
        assert_eq!(parsed.fallback_text(), "I should just answer directly.");
    }

    #[test]
    fn plain_text_falls_back_to_itself() {
        let parsed = parse_policy_reply("Just a plain answer.");
        assert!(parsed.action.is_none());
        assert!(parsed.scratchpad.is_none());
        assert_eq!(parsed.fallback_text(), "Just a plain answer.");
    }

    #[test]
    fn garbage_json_yields_no_action() {
        let parsed = parse_policy_reply("```json\nnot json at all\n```");
        assert!(parsed.action.is_none());
    }
}
