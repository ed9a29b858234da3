use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cq_domain::config::{Config, ConfigSeverity, PolicyProvider};
use cq_gateway::api;
use cq_gateway::bridge::BridgeSurface;
use cq_gateway::cli::{Cli, Command, ConfigCommand};
use cq_gateway::orchestrator::Orchestrator;
use cq_gateway::state::AppState;
use cq_policy::{
    CompletionPolicy, LlmToolSynthesizer, OpenAiCompatPolicy, ScriptedPolicy, ToolSynthesizer,
};
use cq_store::{ConversationStore, ScenarioStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = cq_gateway::cli::load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config { command }) => {
            let config = cq_gateway::cli::load_config(&cli.config)?;
            match command {
                ConfigCommand::Validate => {
                    let issues = config.validate();
                    for issue in &issues {
                        eprintln!("{:?}: {issue}", issue.severity);
                    }
                    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                        std::process::exit(1);
                    }
                    println!("config ok");
                    Ok(())
                }
                ConfigCommand::Show => {
                    println!("{}", toml::to_string_pretty(&config)?);
                    Ok(())
                }
            }
        }
        Some(Command::Version) => {
            println!("colloquy {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cq_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("colloquy starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Durable log + scenario registry ──────────────────────────────
    let store = Arc::new(
        ConversationStore::new(&config.state.path).context("opening conversation store")?,
    );
    let scenarios = Arc::new(
        ScenarioStore::load(&config.state.path.join("scenarios"))
            .context("loading scenario registry")?,
    );

    // ── Policy capabilities ──────────────────────────────────────────
    let policy: Arc<dyn CompletionPolicy> = match config.policy.provider {
        PolicyProvider::OpenaiCompat => Arc::new(
            OpenAiCompatPolicy::from_config(&config.policy).context("building policy adapter")?,
        ),
        PolicyProvider::Scripted => {
            tracing::warn!("scripted policy configured; agents will run out of replies");
            Arc::new(ScriptedPolicy::empty())
        }
    };
    let synthesizer: Arc<dyn ToolSynthesizer> =
        Arc::new(LlmToolSynthesizer::new(policy.clone()));

    // ── Orchestrator (resurrection + sweeps) ─────────────────────────
    let orchestrator = Orchestrator::new(
        config.clone(),
        store,
        scenarios,
        policy,
        synthesizer,
    );
    orchestrator.start().await.context("starting orchestrator")?;

    // ── Bridge surface + HTTP adapter ────────────────────────────────
    let surface = Arc::new(BridgeSurface::new(orchestrator.clone()));
    let state = AppState::new(config.clone(), orchestrator.clone(), surface);

    let app = api::router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator))
        .await
        .context("server error")?;

    Ok(())
}

/// Wait for ctrl-c, then broadcast `conversation_ended` to every active
/// conversation so in-flight agent loops abort cleanly.
async fn shutdown_signal(orchestrator: Arc<Orchestrator>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
    orchestrator.close().await;
}
