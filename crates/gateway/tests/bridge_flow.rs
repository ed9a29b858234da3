//! Bridge surface flows: begin, send, park, poll.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cq_domain::bridge::{
    BridgeConfigBlob, ReplyStatus, SendMessageParams, SurfaceReply, WaitForReplyParams,
};
use cq_domain::config::Config;
use cq_domain::conversation::{
    AgentConfig, ConversationStatus, GetConversationOptions, ScriptEntry, StrategyKind,
};
use cq_domain::error::Result;
use cq_domain::scenario::{Principal, Scenario, ScenarioAgent};
use cq_gateway::bridge::{blob, BridgeSurface};
use cq_gateway::orchestrator::Orchestrator;
use cq_policy::{CompletionPolicy, ScriptedPolicy, StaticSynthesizer};
use cq_store::{ConversationStore, ScenarioStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A policy that takes its time before answering — for driving the
/// still-working path.
struct SlowPolicy {
    delay: Duration,
    inner: ScriptedPolicy,
}

#[async_trait::async_trait]
impl CompletionPolicy for SlowPolicy {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        self.inner.complete(prompt).await
    }
}

fn support_scenario() -> Scenario {
    Scenario {
        id: "support".into(),
        version: "1".into(),
        metadata: serde_json::Value::Null,
        agents: vec![ScenarioAgent {
            agent_id: "supplier".into(),
            principal: Principal {
                name: "Acme Support".into(),
                description: "the support desk".into(),
            },
            system_prompt: "You answer support questions.".into(),
            situation: None,
            goals: vec![],
            tools: vec![],
            documents: vec![],
        }],
    }
}

fn build_surface(
    dir: &Path,
    policy: Arc<dyn CompletionPolicy>,
    reply_timeout_secs: u64,
) -> (Arc<Orchestrator>, BridgeSurface) {
    let mut config = Config::default();
    config.bridge.reply_timeout_secs = reply_timeout_secs;
    let store = Arc::new(ConversationStore::new(dir).unwrap());
    let mut scenarios = ScenarioStore::empty();
    scenarios.insert(support_scenario());
    let orch = Orchestrator::new(
        Arc::new(config),
        store,
        Arc::new(scenarios),
        policy,
        Arc::new(StaticSynthesizer::ok()),
    );
    let surface = BridgeSurface::new(orch.clone());
    (orch, surface)
}

fn external_agent() -> AgentConfig {
    let mut cfg = AgentConfig::new(
        "external",
        StrategyKind::BridgeToExternalCounterpartyAsServer,
    );
    cfg.should_initiate = true;
    cfg
}

fn script_supplier(entries: Vec<ScriptEntry>) -> AgentConfig {
    let mut cfg = AgentConfig::new("supplier", StrategyKind::SequentialScript);
    cfg.script = entries;
    cfg
}

fn scenario_supplier() -> AgentConfig {
    let mut cfg = AgentConfig::new("supplier", StrategyKind::ScenarioDriven);
    cfg.scenario_id = Some("support".into());
    cfg
}

fn make_blob(agents: Vec<AgentConfig>) -> String {
    blob::encode(&BridgeConfigBlob {
        metadata: serde_json::json!({"endpoint": "test"}),
        agents,
    })
    .unwrap()
}

fn send_reply(text: &str) -> String {
    format!(
        "<scratchpad>Replying.</scratchpad>\n```json\n{}\n```",
        serde_json::json!({
            "name": "send_message_to_agent_conversation",
            "args": { "text": text }
        })
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn begin_then_send_message_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let (orch, surface) = build_surface(dir.path(), Arc::new(ScriptedPolicy::empty()), 30);

    let blob_str = make_blob(vec![
        external_agent(),
        script_supplier(vec![ScriptEntry {
            content: "Hi! How can I help?".into(),
            is_final: false,
            thoughts: vec![],
        }]),
    ]);

    let begun = surface.begin(&blob_str).await.unwrap();
    let conv_id = begun.conversation_id.clone();

    // begin() activates the server-managed side but sends no message.
    let snapshot = orch
        .get_conversation(&conv_id, GetConversationOptions::full())
        .unwrap();
    assert_eq!(snapshot.conversation.status, ConversationStatus::Active);
    assert!(snapshot.turns.is_empty());

    let reply = surface
        .send_message(
            &blob_str,
            SendMessageParams {
                conversation_id: conv_id.clone(),
                message: "Hi".into(),
                attachments: vec![],
            },
        )
        .await
        .unwrap();

    match reply {
        SurfaceReply::Reply(reply) => {
            assert_eq!(reply.message_from_agent, "Hi! How can I help?");
            assert_ne!(reply.status, ReplyStatus::Working);
        }
        SurfaceReply::StillWorking(_) => panic!("expected a direct reply"),
    }

    let snapshot = orch
        .get_conversation(&conv_id, GetConversationOptions::full())
        .unwrap();
    assert_eq!(snapshot.turns.len(), 2);
    assert_eq!(snapshot.turns[0].agent_id, "external");
    assert_eq!(snapshot.turns[1].agent_id, "supplier");
}

#[tokio::test]
async fn slow_counterparty_parks_then_delivers() {
    let dir = tempfile::tempdir().unwrap();
    let policy = Arc::new(SlowPolicy {
        delay: Duration::from_millis(2500),
        inner: ScriptedPolicy::new(vec![send_reply("Sorry for the wait.")]),
    });
    let (_orch, surface) = build_surface(dir.path(), policy, 1);

    let blob_str = make_blob(vec![external_agent(), scenario_supplier()]);
    let conv_id = surface.begin(&blob_str).await.unwrap().conversation_id;

    let parked = surface
        .send_message(
            &blob_str,
            SendMessageParams {
                conversation_id: conv_id.clone(),
                message: "Hi".into(),
                attachments: vec![],
            },
        )
        .await
        .unwrap();

    let still_working = match parked {
        SurfaceReply::StillWorking(sw) => sw,
        SurfaceReply::Reply(r) => panic!("expected still-working, got {r:?}"),
    };
    assert!(still_working.still_working);
    assert!(still_working.follow_up.contains("wait_for_reply"));
    // The counterparty at least opened its turn before the timeout.
    assert!(still_working.status.action_count >= 1);

    // The reply arrives after the timeout; polling returns it — nothing
    // is dropped.
    let mut delivered = None;
    for _ in 0..5 {
        let outcome = surface
            .wait_for_reply(
                &blob_str,
                WaitForReplyParams {
                    conversation_id: conv_id.clone(),
                },
            )
            .await
            .unwrap();
        match outcome {
            SurfaceReply::Reply(reply) => {
                delivered = Some(reply);
                break;
            }
            SurfaceReply::StillWorking(_) => continue,
        }
    }
    let reply = delivered.expect("reply eventually delivered");
    assert_eq!(reply.message_from_agent, "Sorry for the wait.");
    assert_eq!(reply.status, ReplyStatus::InputRequired);
}

#[tokio::test]
async fn concurrent_waits_observe_still_working() {
    let dir = tempfile::tempdir().unwrap();
    let (_orch, surface) = build_surface(dir.path(), Arc::new(ScriptedPolicy::empty()), 1);

    let blob_str = make_blob(vec![
        external_agent(),
        script_supplier(vec![ScriptEntry {
            content: "later".into(),
            is_final: false,
            thoughts: vec![],
        }]),
    ]);
    let conv_id = surface.begin(&blob_str).await.unwrap().conversation_id;

    // No reply pending: the first wait holds the rendezvous until its
    // timeout, the second observes the in-flight request. Both park.
    let first_wait = surface.wait_for_reply(
        &blob_str,
        WaitForReplyParams {
            conversation_id: conv_id.clone(),
        },
    );
    let second_wait = surface.wait_for_reply(
        &blob_str,
        WaitForReplyParams {
            conversation_id: conv_id.clone(),
        },
    );
    let (first, second) = tokio::join!(first_wait, second_wait);
    assert!(matches!(first.unwrap(), SurfaceReply::StillWorking(_)));
    assert!(matches!(second.unwrap(), SurfaceReply::StillWorking(_)));
}

#[tokio::test]
async fn final_counterparty_turn_completes_the_thread() {
    let dir = tempfile::tempdir().unwrap();
    let (orch, surface) = build_surface(dir.path(), Arc::new(ScriptedPolicy::empty()), 30);

    let blob_str = make_blob(vec![
        external_agent(),
        script_supplier(vec![ScriptEntry {
            content: "All done, goodbye.".into(),
            is_final: true,
            thoughts: vec![],
        }]),
    ]);
    let conv_id = surface.begin(&blob_str).await.unwrap().conversation_id;

    let reply = surface
        .send_message(
            &blob_str,
            SendMessageParams {
                conversation_id: conv_id.clone(),
                message: "Wrap it up".into(),
                attachments: vec![],
            },
        )
        .await
        .unwrap();

    match reply {
        SurfaceReply::Reply(reply) => {
            assert_eq!(reply.status, ReplyStatus::Completed);
        }
        SurfaceReply::StillWorking(_) => panic!("expected a reply"),
    }

    let snapshot = orch
        .get_conversation(&conv_id, GetConversationOptions::default())
        .unwrap();
    assert_eq!(snapshot.conversation.status, ConversationStatus::Completed);
}

#[tokio::test]
async fn tool_descriptions_are_scenario_specific() {
    let dir = tempfile::tempdir().unwrap();
    let (_orch, surface) = build_surface(dir.path(), Arc::new(ScriptedPolicy::empty()), 30);

    let blob_str = make_blob(vec![external_agent(), scenario_supplier()]);
    let tools = surface.tool_descriptions(&blob_str).unwrap();

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "begin_chat_thread",
            "send_message_to_chat_thread",
            "wait_for_reply"
        ]
    );
    // Rendered with the counterparty principal's name.
    assert!(tools.iter().all(|t| t.description.contains("Acme Support")));
}

#[tokio::test]
async fn call_dispatches_by_wire_name() {
    let dir = tempfile::tempdir().unwrap();
    let (_orch, surface) = build_surface(dir.path(), Arc::new(ScriptedPolicy::empty()), 30);

    let blob_str = make_blob(vec![
        external_agent(),
        script_supplier(vec![ScriptEntry {
            content: "Hello from the desk.".into(),
            is_final: false,
            thoughts: vec![],
        }]),
    ]);

    let begun = surface
        .call(&blob_str, "begin_chat_thread", serde_json::Value::Null)
        .await
        .unwrap();
    let conv_id = begun["conversationId"].as_str().unwrap().to_owned();

    let result = surface
        .call(
            &blob_str,
            "send_message_to_chat_thread",
            serde_json::json!({ "conversationId": conv_id, "message": "Hi" }),
        )
        .await
        .unwrap();
    assert_eq!(result["messageFromAgent"], "Hello from the desk.");
    assert_eq!(result["status"], "input-required");

    let err = surface
        .call(&blob_str, "no_such_tool", serde_json::Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}
