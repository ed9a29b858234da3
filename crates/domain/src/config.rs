use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Env var holding the admin bearer token. Unset/empty = dev mode.
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            admin_token_env: d_admin_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Root directory for the durable log and scenario files.
    #[serde(default = "d_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: d_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Step budget for one scenario-driven reply turn.
    #[serde(default = "d_max_steps")]
    pub max_steps_per_turn: usize,
    #[serde(default = "d_query_timeout")]
    pub user_query_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps_per_turn: d_max_steps(),
            user_query_timeout_secs: d_query_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long `send_message` / `wait_for_reply` wait before parking the
    /// caller with a still-working response.
    #[serde(default = "d_reply_timeout")]
    pub reply_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: d_reply_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Conversations with no activity inside this window are marked
    /// inactive at startup; the rest are resurrected.
    #[serde(default = "d_lookback")]
    pub lookback_hours: u32,
    #[serde(default = "d_token_ttl")]
    pub token_ttl_hours: u32,
    #[serde(default = "d_sweep_interval")]
    pub token_sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            lookback_hours: d_lookback(),
            token_ttl_hours: d_token_ttl(),
            token_sweep_interval_secs: d_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyProvider {
    /// OpenAI-compatible `/chat/completions` endpoint.
    OpenaiCompat,
    /// Canned in-process responses (demos, tests).
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "d_provider")]
    pub provider: PolicyProvider,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Env var holding the API key for the HTTP provider.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    3710
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_admin_token_env() -> String {
    "CQ_ADMIN_TOKEN".into()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_max_steps() -> usize {
    10
}
fn d_query_timeout() -> u64 {
    300
}
fn d_reply_timeout() -> u64 {
    60
}
fn d_lookback() -> u32 {
    24
}
fn d_token_ttl() -> u32 {
    72
}
fn d_sweep_interval() -> u64 {
    300
}
fn d_provider() -> PolicyProvider {
    PolicyProvider::OpenaiCompat
}
fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_api_key_env() -> String {
    "CQ_POLICY_API_KEY".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.runtime.max_steps_per_turn == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "runtime.max_steps_per_turn must be at least 1".into(),
            });
        }
        if self.bridge.reply_timeout_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "bridge.reply_timeout_secs must be at least 1".into(),
            });
        }
        if self.lifecycle.lookback_hours == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "lifecycle.lookback_hours is 0; nothing will be resurrected".into(),
            });
        }
        if self.policy.provider == PolicyProvider::OpenaiCompat
            && self.policy.base_url.trim().is_empty()
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "policy.base_url must be set for the openai_compat provider".into(),
            });
        }

        issues
    }
}
